// ABOUTME: FIFO AT command queue with a single task that owns the serial link
// ABOUTME: Dispatches one command at a time, routes inbound lines to it, and hands out exclusive leases

use crate::client::error::{SbdError, SbdResult};
use crate::client::traits::AtCommander;
use crate::client::types::CommandResponse;
use crate::command::AtCommand;
use crate::connection::Connection;
use crate::datatypes::{JobId, JobIds};
use crate::router::{LineEvent, LineRouter};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// A command waiting in the queue, owned by the queue until it completes
pub(crate) struct CommandJob {
    id: JobId,
    command: AtCommand,
    lease: Option<JobId>,
    enqueued_at: Instant,
    reply: oneshot::Sender<SbdResult<CommandResponse>>,
}

/// Everything the worker accepts from its handles
pub(crate) enum Request {
    Command(CommandJob),
    Acquire {
        lease: JobId,
        granted: oneshot::Sender<()>,
    },
    Release(JobId),
}

/// Handle for putting commands on the AT command queue
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Clone, Debug)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Request>,
    ids: Arc<JobIds>,
}

impl CommandQueue {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Request>, ids: Arc<JobIds>) -> Self {
        Self { tx, ids }
    }

    /// Append a command to the tail of the queue.
    ///
    /// The command is queued by the time this returns; the returned future
    /// resolves when the command completes. Dropping the future before the
    /// command is dispatched removes it from the line-up.
    pub fn enqueue(&self, command: AtCommand) -> SbdResult<PendingCommand> {
        self.submit(command, None)
    }

    /// Wait for exclusive use of the modem.
    ///
    /// The lease is granted once every command queued ahead of it has
    /// completed. Until it is dropped, only commands issued through the
    /// lease are written; everything else waits in the queue.
    pub async fn lease(&self) -> SbdResult<CommandLease> {
        let id = self.ids.next();
        let (granted, rx) = oneshot::channel();

        self.tx
            .send(Request::Acquire { lease: id, granted })
            .map_err(|_| SbdError::NotRunning)?;

        // Built before waiting so an abandoned request still releases.
        let lease = CommandLease {
            guard: Arc::new(LeaseGuard {
                id,
                tx: self.tx.clone(),
                ids: self.ids.clone(),
            }),
        };
        rx.await.map_err(|_| SbdError::NotRunning)?;

        debug!(lease = %id, "modem lease granted");
        Ok(lease)
    }

    fn submit(&self, command: AtCommand, lease: Option<JobId>) -> SbdResult<PendingCommand> {
        let (reply, rx) = oneshot::channel();
        let id = self.ids.next();

        debug!(%id, %command, "queueing AT command");

        self.tx
            .send(Request::Command(CommandJob {
                id,
                command,
                lease,
                enqueued_at: Instant::now(),
                reply,
            }))
            .map_err(|_| SbdError::NotRunning)?;

        Ok(PendingCommand { id, rx })
    }
}

impl AtCommander for CommandQueue {
    async fn command(&self, command: AtCommand) -> SbdResult<CommandResponse> {
        self.enqueue(command)?.await
    }
}

/// Exclusive use of the modem, held by a multi-step exchange
///
/// Clones share one lease; it is released when the last clone drops.
#[derive(Clone, Debug)]
pub struct CommandLease {
    guard: Arc<LeaseGuard>,
}

#[derive(Debug)]
struct LeaseGuard {
    id: JobId,
    tx: mpsc::UnboundedSender<Request>,
    ids: Arc<JobIds>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        debug!(lease = %self.id, "releasing modem lease");
        let _ = self.tx.send(Request::Release(self.id));
    }
}

impl CommandLease {
    pub fn id(&self) -> JobId {
        self.guard.id
    }

    /// Queue a command that runs inside this lease.
    pub fn enqueue(&self, command: AtCommand) -> SbdResult<PendingCommand> {
        let queue = CommandQueue::new(self.guard.tx.clone(), self.guard.ids.clone());
        queue.submit(command, Some(self.guard.id))
    }
}

impl AtCommander for CommandLease {
    async fn command(&self, command: AtCommand) -> SbdResult<CommandResponse> {
        self.enqueue(command)?.await
    }
}

/// Completion of a queued command
#[derive(Debug)]
pub struct PendingCommand {
    id: JobId,
    rx: oneshot::Receiver<SbdResult<CommandResponse>>,
}

impl PendingCommand {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Future for PendingCommand {
    type Output = SbdResult<CommandResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(SbdError::NotRunning)))
    }
}

struct InFlight {
    job: CommandJob,
    deadline: Instant,
}

/// Task that owns the modem link
///
/// It is the only writer to the connection and the only owner of the
/// line router, so at most one command is on the wire at any time. A
/// command is not written while the previous one's final result code is
/// still outstanding.
pub(crate) struct CommandWorker<S> {
    connection: Connection<S>,
    requests: mpsc::UnboundedReceiver<Request>,
    pending: VecDeque<Request>,
    in_flight: Option<InFlight>,
    settle_deadline: Option<Instant>,
    holder: Option<JobId>,
    router: LineRouter,
    rings: mpsc::UnboundedSender<()>,
    command_timeout: Duration,
    shutdown: CancellationToken,
}

impl<S> CommandWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        connection: Connection<S>,
        requests: mpsc::UnboundedReceiver<Request>,
        rings: mpsc::UnboundedSender<()>,
        command_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connection,
            requests,
            pending: VecDeque::new(),
            in_flight: None,
            settle_deadline: None,
            holder: None,
            router: LineRouter::new(),
            rings,
            command_timeout,
            shutdown,
        }
    }

    /// Run until shutdown, link loss, or every queue handle is dropped and
    /// the remaining commands have completed.
    pub(crate) async fn run(mut self) {
        let mut accepting = true;

        loop {
            if self.in_flight.is_none() && self.settle_deadline.is_none() {
                self.dispatch_next().await;
            }

            if !accepting && self.in_flight.is_none() && self.pending.is_empty() {
                break;
            }

            let deadline = self
                .in_flight
                .as_ref()
                .map(|in_flight| in_flight.deadline)
                .or(self.settle_deadline);

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.fail_all(|| SbdError::NotRunning);
                    break;
                }

                line = self.connection.read_line() => match line {
                    Ok(Some(line)) => self.route(&line),
                    Ok(None) => {
                        warn!("modem link closed");
                        self.fail_all(|| SbdError::ConnectionClosed);
                        break;
                    }
                    Err(SbdError::InvalidData(reason)) => {
                        warn!(%reason, "discarding inbound data");
                    }
                    Err(e) => {
                        warn!(error = %e, "modem link failed");
                        self.fail_all(|| SbdError::ConnectionClosed);
                        break;
                    }
                },

                _ = wait_until(deadline) => self.time_out(),

                request = self.requests.recv(), if accepting => match request {
                    Some(Request::Release(lease)) => self.release(lease),
                    Some(request) => self.pending.push_back(request),
                    None => accepting = false,
                },
            }
        }

        debug!("AT command worker stopped");
    }

    /// Index of the next request allowed to run. While a lease is held only
    /// that lease's commands qualify; otherwise it is the head of the queue.
    fn next_ready(&self) -> Option<usize> {
        match self.holder {
            Some(holder) => self.pending.iter().position(|request| {
                matches!(request, Request::Command(job) if job.lease == Some(holder))
            }),
            None if self.pending.is_empty() => None,
            None => Some(0),
        }
    }

    /// Write the next eligible command and arm the router for it.
    ///
    /// Commands whose caller has gone away are dropped unsent. A failed
    /// write rejects that command and moves on to the next one. A lease
    /// request at the head is granted in place.
    async fn dispatch_next(&mut self) {
        while let Some(index) = self.next_ready() {
            let Some(request) = self.pending.remove(index) else {
                return;
            };

            let job = match request {
                Request::Command(job) => job,
                Request::Acquire { lease, granted } => {
                    if granted.send(()).is_ok() {
                        debug!(%lease, "modem leased");
                        self.holder = Some(lease);
                    }
                    continue;
                }
                Request::Release(lease) => {
                    self.release(lease);
                    continue;
                }
            };

            if job.reply.is_closed() {
                debug!(id = %job.id, command = %job.command, "dropping AT command, caller went away");
                continue;
            }

            let deadline = Instant::now() + self.command_timeout;
            debug!(
                id = %job.id,
                command = %job.command,
                queued_ms = job.enqueued_at.elapsed().as_millis() as u64,
                "dispatching AT command"
            );

            let written = match timeout_at(deadline, self.connection.write_command(&job.command)).await {
                Ok(result) => result,
                Err(_) => Err(SbdError::CommandTimeout(self.command_timeout)),
            };

            match written {
                Ok(()) => {
                    self.router.arm(job.id, &job.command);
                    self.in_flight = Some(InFlight { job, deadline });
                    return;
                }
                Err(e) => {
                    warn!(id = %job.id, error = %e, "failed to write AT command");
                    let _ = job.reply.send(Err(e));
                }
            }
        }
    }

    fn release(&mut self, lease: JobId) {
        if self.holder == Some(lease) {
            debug!(%lease, "modem lease released");
            self.holder = None;
        }
    }

    fn route(&mut self, line: &str) {
        trace!(line, "<-");

        match self.router.route(line) {
            LineEvent::Ring => {
                info!("ring alert received");
                if self.rings.send(()).is_err() {
                    debug!("no one is listening for ring alerts");
                }
            }
            LineEvent::Error { id, line } => {
                warn!(%id, %line, "modem rejected AT command");
                self.complete(Err(SbdError::Modem(line)));
            }
            LineEvent::Matched { line, .. } => {
                let deadline = self.in_flight.as_ref().map(|in_flight| in_flight.deadline);
                self.complete(Ok(line));
                if self.router.settling().is_some() {
                    self.settle_deadline = deadline;
                }
            }
            LineEvent::Settled { id } => {
                trace!(%id, "final result code consumed");
                self.settle_deadline = None;
            }
            LineEvent::Pending => {}
            LineEvent::Unsolicited => {
                debug!(line, "ignoring line, no AT command in flight");
            }
        }
    }

    fn time_out(&mut self) {
        let Some(in_flight) = &self.in_flight else {
            if let Some(id) = self.router.abandon_settling() {
                debug!(%id, "no final result code before the deadline");
            }
            self.settle_deadline = None;
            return;
        };

        warn!(
            id = %in_flight.job.id,
            command = %in_flight.job.command,
            "AT command timed out"
        );
        self.complete(Err(SbdError::CommandTimeout(self.command_timeout)));
    }

    /// Resolve or reject the in-flight command exactly once.
    fn complete(&mut self, result: SbdResult<String>) {
        self.router.disarm();

        let Some(InFlight { job, .. }) = self.in_flight.take() else {
            return;
        };

        let id = job.id;
        match &result {
            Ok(data) => debug!(%id, %data, "AT command completed"),
            Err(e) => debug!(%id, error = %e, "AT command failed"),
        }

        let response = result.map(|data| CommandResponse { id, data });
        if job.reply.send(response).is_err() {
            debug!(%id, "caller went away before completion");
        }
    }

    fn fail_all(&mut self, error: impl Fn() -> SbdError) {
        self.router.disarm();
        self.router.abandon_settling();
        self.settle_deadline = None;
        self.holder = None;

        if let Some(InFlight { job, .. }) = self.in_flight.take() {
            let _ = job.reply.send(Err(error()));
        }
        for request in self.pending.drain(..) {
            if let Request::Command(job) = request {
                let _ = job.reply.send(Err(error()));
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::io::ReadBuf;
    use tokio::time::timeout;

    /// Stream whose reads never complete and whose writes always fail
    struct BrokenLink;

    impl AsyncRead for BrokenLink {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenLink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn spawn_worker<S>(stream: S) -> (CommandQueue, CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (rings, _) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker = CommandWorker::new(
            Connection::new(stream),
            rx,
            rings,
            Duration::from_secs(10),
            shutdown.clone(),
        );
        tokio::spawn(worker.run());
        (CommandQueue::new(tx, Arc::new(JobIds::new())), shutdown)
    }

    #[tokio::test]
    async fn write_failure_rejects_and_queue_moves_on() {
        let (queue, _shutdown) = spawn_worker(BrokenLink);

        let first = queue.enqueue(AtCommand::signal_quality()).unwrap();
        let second = queue.enqueue(AtCommand::write_text()).unwrap();

        assert!(matches!(first.await, Err(SbdError::Transport(_))));
        assert!(matches!(second.await, Err(SbdError::Transport(_))));
    }

    #[tokio::test]
    async fn shutdown_rejects_in_flight_command() {
        let (ours, _theirs) = tokio::io::duplex(256);
        let (queue, shutdown) = spawn_worker(ours);

        let pending = queue.enqueue(AtCommand::signal_quality()).unwrap();
        tokio::task::yield_now().await;
        shutdown.cancel();

        assert!(matches!(pending.await, Err(SbdError::NotRunning)));
    }

    #[tokio::test]
    async fn link_closing_rejects_commands() {
        let (ours, theirs) = tokio::io::duplex(256);
        let (queue, _shutdown) = spawn_worker(ours);

        let pending = queue.enqueue(AtCommand::signal_quality()).unwrap();
        tokio::task::yield_now().await;
        drop(theirs);

        assert!(matches!(
            pending.await,
            Err(SbdError::ConnectionClosed) | Err(SbdError::Transport(_)) | Err(SbdError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn pending_command_ids_are_distinct() {
        let (ours, _theirs) = tokio::io::duplex(256);
        let (queue, _shutdown) = spawn_worker(ours);

        let a = queue.enqueue(AtCommand::signal_quality()).unwrap();
        let b = queue.enqueue(AtCommand::signal_quality()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn lease_holds_back_other_commands_until_dropped() {
        let (queue, _shutdown) = spawn_worker(BrokenLink);

        let lease = queue.lease().await.unwrap();
        let mut direct = queue.enqueue(AtCommand::signal_quality()).unwrap();

        let leased = lease.enqueue(AtCommand::write_text()).unwrap();
        assert!(matches!(leased.await, Err(SbdError::Transport(_))));
        assert!(timeout(Duration::from_secs(1), &mut direct).await.is_err());

        drop(lease);
        assert!(matches!(direct.await, Err(SbdError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn lease_waits_for_commands_queued_ahead() {
        let (queue, _shutdown) = spawn_worker(BrokenLink);

        let ahead = queue.enqueue(AtCommand::signal_quality()).unwrap();
        let lease = queue.lease().await.unwrap();

        assert!(matches!(ahead.await, Err(SbdError::Transport(_))));
        drop(lease);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_lease_request_does_not_stall_queue() {
        let (queue, _shutdown) = spawn_worker(BrokenLink);

        let lease = queue.lease().await.unwrap();
        let waiting = queue.clone();
        let abandoned = tokio::spawn(async move { waiting.lease().await.map(|l| l.id()) });
        tokio::task::yield_now().await;
        abandoned.abort();
        drop(lease);

        let after = queue.enqueue(AtCommand::signal_quality()).unwrap();
        let result = timeout(Duration::from_secs(1), after).await;
        assert!(matches!(result, Ok(Err(SbdError::Transport(_)))));
    }
}
