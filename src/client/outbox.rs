// ABOUTME: FIFO send queue that runs each outbound message through write, commit, session, and drain
// ABOUTME: Each job and each ring-triggered download holds the modem lease from start to finish

use crate::client::config::ModemConfig;
use crate::client::error::{SbdError, SbdResult, SendFailure, SendStatus};
use crate::client::queue::{CommandLease, CommandQueue};
use crate::client::session::{MailboxDrainer, SessionEngine};
use crate::client::traits::AtCommander;
use crate::client::types::{InboundMessage, SendReceipt, SessionOutcome, validate_message};
use crate::command::{AtCommand, SessionKind};
use crate::datatypes::{JobId, JobIds, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SendReply = Result<SendReceipt, SendFailure>;

/// A message waiting to go out, owned by the send queue until it completes
pub(crate) struct SendJob {
    id: JobId,
    message: String,
    retries: u32,
    timeout: Duration,
    enqueued_at: Instant,
    reply: oneshot::Sender<SendReply>,
}

/// Handle for putting messages on the send queue
#[derive(Clone, Debug)]
pub(crate) struct SendQueue {
    tx: mpsc::UnboundedSender<SendJob>,
    ids: Arc<JobIds>,
}

impl SendQueue {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SendJob>, ids: Arc<JobIds>) -> Self {
        Self { tx, ids }
    }

    /// Queue `message` and wait for its send job to finish.
    pub(crate) async fn send(&self, message: &str, retries: u32, timeout: Duration) -> SendReply {
        let id = self.ids.next();
        validate_message(message).map_err(|e| SendFailure::rejected(id, e))?;

        let (reply, rx) = oneshot::channel();
        debug!(%id, retries, ?timeout, "queueing send job");

        self.tx
            .send(SendJob {
                id,
                message: message.to_string(),
                retries,
                timeout,
                enqueued_at: Instant::now(),
                reply,
            })
            .map_err(|_| SendFailure::rejected(id, SbdError::NotRunning))?;

        rx.await
            .unwrap_or_else(|_| Err(SendFailure::rejected(id, SbdError::NotRunning)))
    }
}

/// Task that runs send jobs one at a time
///
/// A job leases the command queue before its first command and keeps the
/// lease through write, commit, session, and drain, so no other command can
/// reach the modem while it is in text entry or mid-session.
pub(crate) struct SendWorker {
    commands: CommandQueue,
    messages: broadcast::Sender<InboundMessage>,
    config: Arc<ModemConfig>,
    jobs: mpsc::UnboundedReceiver<SendJob>,
    rings: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
}

impl SendWorker {
    pub(crate) fn new(
        commands: CommandQueue,
        messages: broadcast::Sender<InboundMessage>,
        config: Arc<ModemConfig>,
        jobs: mpsc::UnboundedReceiver<SendJob>,
        rings: mpsc::UnboundedReceiver<()>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            commands,
            messages,
            config,
            jobs,
            rings,
            shutdown,
        }
    }

    /// Run until shutdown or until every send handle is dropped.
    ///
    /// A waiting ring alert is answered before the next send job starts.
    pub(crate) async fn run(mut self) {
        let mut rings_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                ring = self.rings.recv(), if rings_open => match ring {
                    Some(()) => self.answer_ring().await,
                    None => rings_open = false,
                },

                job = self.jobs.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => break,
                },
            }
        }

        // Anything still queued is rejected when the receiver drops.
        debug!("send worker stopped");
    }

    fn engine(&self, lease: &CommandLease) -> SessionEngine<CommandLease> {
        SessionEngine::new(lease.clone(), self.config.session_retry_delay)
    }

    fn drainer(&self, lease: &CommandLease) -> MailboxDrainer<CommandLease> {
        MailboxDrainer::new(
            self.engine(lease),
            self.messages.clone(),
            self.config.mailbox_timeout,
            self.config.ring_session_retries,
        )
    }

    async fn process(&self, job: SendJob) {
        let SendJob {
            id,
            message,
            retries,
            timeout,
            enqueued_at,
            reply,
        } = job;

        if reply.is_closed() {
            debug!(%id, "dropping send job, caller went away");
            return;
        }

        info!(
            %id,
            retries,
            bytes = message.len(),
            queued_ms = enqueued_at.elapsed().as_millis() as u64,
            "sending SBD message"
        );

        let result = self.run_job(id, &message, retries, timeout).await;

        if reply.send(result).is_err() {
            debug!(%id, "caller went away before send completed");
        }
    }

    async fn run_job(
        &self,
        id: JobId,
        message: &str,
        retries: u32,
        timeout: Duration,
    ) -> SendReply {
        let deadline = Instant::now() + timeout;
        let cancel = self.shutdown.child_token();

        let lease = match timeout_at(deadline, self.commands.lease()).await {
            Ok(lease) => lease.map_err(|e| SendFailure::rejected(id, e))?,
            Err(_) => {
                warn!(%id, ?timeout, "send timed out waiting for the modem");
                return Err(SendFailure::timed_out(id, timeout, None));
            }
        };

        let engine = self.engine(&lease);
        let sending = transmit(&lease, &engine, message, retries, &cancel);
        let outcome = match timeout_at(deadline, sending).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(%id, error = %e, "send rejected");
                return Err(SendFailure::rejected(id, e));
            }
            Err(_) => {
                cancel.cancel();
                warn!(%id, ?timeout, "send timed out");
                return Err(SendFailure::timed_out(id, timeout, engine.last_status()));
            }
        };

        let messages_received = self.drain(&lease, outcome.status, deadline, &cancel).await;
        info!(%id, attempts = outcome.attempts, messages_received, "SBD message sent");

        Ok(SendReceipt {
            id,
            status: SendStatus::Sent,
            session: outcome.status,
            attempts: outcome.attempts,
            messages_received,
        })
    }

    /// Drain whatever the session announced, within what is left of the
    /// job's deadline. Failures here do not undo the send.
    async fn drain(
        &self,
        lease: &CommandLease,
        status: SessionStatus,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> usize {
        let drainer = self.drainer(lease);
        match timeout_at(deadline, drainer.drain(status, cancel)).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                warn!(error = %e, "mailbox drain after send failed");
                0
            }
            Err(_) => {
                cancel.cancel();
                warn!("mailbox drain after send ran past the send deadline");
                0
            }
        }
    }

    async fn answer_ring(&mut self) {
        // Rings that piled up meanwhile are served by this one download.
        while self.rings.try_recv().is_ok() {}

        info!("answering ring alert");
        let lease = match self.commands.lease().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "cannot answer ring alert");
                return;
            }
        };

        let cancel = self.shutdown.child_token();
        match self.drainer(&lease).download_message(&cancel).await {
            Ok(fetched) => info!(fetched, "ring-triggered download finished"),
            Err(e) => warn!(error = %e, "ring-triggered download failed"),
        }
    }
}

async fn transmit(
    lease: &CommandLease,
    engine: &SessionEngine<CommandLease>,
    message: &str,
    retries: u32,
    cancel: &CancellationToken,
) -> SbdResult<SessionOutcome> {
    lease.command(AtCommand::write_text()).await?;
    lease.command(AtCommand::commit_text(message)).await?;
    engine
        .execute(retries, SessionKind::Standard, cancel)
        .await
}
