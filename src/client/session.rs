// ABOUTME: SBD session engine with a bounded per-call retry loop, and the mailbox drainer built on it
// ABOUTME: Both observe a cancellation token at every suspension point

use crate::client::error::{SbdError, SbdResult};
use crate::client::traits::AtCommander;
use crate::client::types::{CommandResponse, InboundMessage, InboxResult, SessionOutcome};
use crate::command::{AtCommand, SessionKind};
use crate::datatypes::SessionStatus;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs `AT+SBDIX` until the mobile-originated status is acceptable
///
/// Each call to [`execute`](SessionEngine::execute) keeps its own attempt
/// count, so one caller's failures never eat into another's budget.
#[derive(Debug)]
pub struct SessionEngine<C> {
    commander: C,
    retry_delay: Duration,
    last_status: watch::Sender<Option<SessionStatus>>,
}

impl<C: AtCommander> SessionEngine<C> {
    pub fn new(commander: C, retry_delay: Duration) -> Self {
        let (last_status, _) = watch::channel(None);
        Self {
            commander,
            retry_delay,
            last_status,
        }
    }

    pub fn commander(&self) -> &C {
        &self.commander
    }

    /// Report from the most recent attempt, kept even when the call that
    /// produced it was abandoned part way.
    pub fn last_status(&self) -> Option<SessionStatus> {
        *self.last_status.borrow()
    }

    /// Run a session, retrying failed attempts after the retry delay.
    ///
    /// At least one attempt is always made and at most `max_retries`.
    /// A reply that does not parse counts as a failed attempt. Errors from
    /// the command itself (timeout, modem error) end the session at once.
    pub async fn execute(
        &self,
        max_retries: u32,
        kind: SessionKind,
        cancel: &CancellationToken,
    ) -> SbdResult<SessionOutcome> {
        let mut attempts = 0;

        loop {
            let response = run_command(&self.commander, AtCommand::session(kind), cancel).await?;
            attempts += 1;

            let status = SessionStatus::parse(&response.data);
            self.last_status.send_replace(Some(status));
            if status.mo_succeeded() {
                info!(attempts, %status, "SBD session succeeded");
                return Ok(SessionOutcome {
                    status,
                    attempts,
                    is_sent: true,
                });
            }

            let reason = status
                .mo_status_code()
                .map_or("unrecognised status", |code| code.description());
            warn!(
                attempt = attempts,
                max_retries,
                mo_status = status.mo_status,
                valid = status.is_valid,
                reason,
                "SBD session failed"
            );

            if attempts >= max_retries {
                warn!(attempts, "satellite session retries exhausted");
                return Err(SbdError::SessionRetriesExhausted { attempts, status });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SbdError::Cancelled),
                _ = sleep(self.retry_delay) => {}
            }
        }
    }
}

/// Pulls mobile-terminated messages off the gateway after a session
///
/// Each retrieved message is published on the broadcast channel. When the
/// gateway reports more messages queued, another extended session is run to
/// fetch the next one, until the queue is empty.
#[derive(Debug)]
pub struct MailboxDrainer<C> {
    engine: SessionEngine<C>,
    messages: broadcast::Sender<InboundMessage>,
    watchdog: Duration,
    session_retries: u32,
}

impl<C: AtCommander> MailboxDrainer<C> {
    pub fn new(
        engine: SessionEngine<C>,
        messages: broadcast::Sender<InboundMessage>,
        watchdog: Duration,
        session_retries: u32,
    ) -> Self {
        Self {
            engine,
            messages,
            watchdog,
            session_retries,
        }
    }

    pub fn engine(&self) -> &SessionEngine<C> {
        &self.engine
    }

    /// Fetch the message announced by `status`, if there is one.
    ///
    /// Bounded by the watchdog: when it fires the retrieval is cancelled and
    /// `MailboxTimeout` is returned.
    pub async fn check_inbox(
        &self,
        status: SessionStatus,
        cancel: &CancellationToken,
    ) -> SbdResult<InboxResult> {
        if !status.has_mail() {
            debug!(%status, "no mobile-terminated message waiting");
            return Ok(InboxResult::empty(status));
        }

        let watchdog = cancel.child_token();
        tokio::select! {
            result = self.retrieve(status, &watchdog) => result,
            _ = sleep(self.watchdog) => {
                watchdog.cancel();
                warn!(mtmsn = status.mtmsn, "mailbox check timed out");
                Err(SbdError::MailboxTimeout(self.watchdog))
            }
        }
    }

    async fn retrieve(
        &self,
        status: SessionStatus,
        cancel: &CancellationToken,
    ) -> SbdResult<InboxResult> {
        let response = run_command(self.engine.commander(), AtCommand::read_text(), cancel).await?;

        info!(
            mtmsn = status.mtmsn,
            queued = status.mt_queued,
            bytes = response.data.len(),
            "mobile-terminated message received"
        );

        let message = InboundMessage {
            body: response.data.clone(),
            mtmsn: status.mtmsn,
            queued: status.mt_queued,
        };
        if self.messages.send(message).is_err() {
            debug!("no subscribers for inbound message");
        }

        Ok(InboxResult {
            message: Some(response.data),
            status,
        })
    }

    /// Run extended sessions and fetch messages until the gateway has none
    /// left. Returns how many messages were fetched.
    pub async fn download_message(&self, cancel: &CancellationToken) -> SbdResult<usize> {
        let mut fetched = 0;

        loop {
            let session = self
                .engine
                .execute(self.session_retries, SessionKind::Extended, cancel)
                .await?;
            let inbox = self.check_inbox(session.status, cancel).await?;

            if inbox.is_empty() {
                return Ok(fetched);
            }
            fetched += 1;
            if !inbox.has_more() {
                return Ok(fetched);
            }
        }
    }

    /// Check the mailbox after a session and keep going while more messages
    /// are queued. Returns how many messages were fetched.
    pub async fn drain(&self, status: SessionStatus, cancel: &CancellationToken) -> SbdResult<usize> {
        let inbox = self.check_inbox(status, cancel).await?;

        if inbox.is_empty() {
            return Ok(0);
        }
        if !inbox.has_more() {
            return Ok(1);
        }

        Ok(1 + self.download_message(cancel).await?)
    }
}

async fn run_command<C: AtCommander>(
    commander: &C,
    command: AtCommand,
    cancel: &CancellationToken,
) -> SbdResult<CommandResponse> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SbdError::Cancelled),
        response = commander.command(command) => response,
    }
}
