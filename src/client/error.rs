// ABOUTME: Error types for modem command, session, and send operations
// ABOUTME: Command-level failures reject only their own caller; none of them stop the queues

use crate::datatypes::{JobId, SessionStatus};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error type for SBD modem operations
#[derive(Debug, Error)]
pub enum SbdError {
    /// Writing to (or reading from) the serial link failed
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// No line matching the command's delimiter arrived in time
    #[error("Command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// The modem answered with an error line
    #[error("Modem error: {0}")]
    Modem(String),

    /// The session kept failing until the retry budget ran out
    #[error("Session failed after {attempts} attempts: {status}")]
    SessionRetriesExhausted { attempts: u32, status: SessionStatus },

    /// A send job did not finish within its overall deadline
    #[error("Send timed out after {after:?}")]
    SendTimeout {
        after: Duration,
        /// Report from the last session attempt made before the deadline
        last_status: Option<SessionStatus>,
    },

    /// A mailbox check did not finish within the watchdog period
    #[error("Mailbox check timed out after {0:?}")]
    MailboxTimeout(Duration),

    /// The operation was cancelled before it finished
    #[error("Operation cancelled")]
    Cancelled,

    /// The modem closed the link
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// The worker that owns the queue is gone
    #[error("Modem worker is not running")]
    NotRunning,

    /// Data that could not be used (oversized line, bad message text, unparsable reply)
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl SbdError {
    /// Session report carried by the error, if any.
    pub fn session_status(&self) -> Option<&SessionStatus> {
        match self {
            SbdError::SessionRetriesExhausted { status, .. } => Some(status),
            SbdError::SendTimeout { last_status, .. } => last_status.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias for SBD operations
pub type SbdResult<T> = Result<T, SbdError>;

/// Final state of a send job
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// Message went out in a successful session
    Sent,
    /// The overall deadline expired first
    Timeout,
    /// A step of the send failed
    Rejected,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            SendStatus::Sent => "sent",
            SendStatus::Timeout => "timeout",
            SendStatus::Rejected => "rejected",
        };
        f.write_str(status)
    }
}

/// Failure of a send job, as delivered to the caller of `send`
#[derive(Debug, Error)]
#[error("send {id} {status}: {error}")]
pub struct SendFailure {
    pub id: JobId,
    pub status: SendStatus,
    #[source]
    pub error: SbdError,
}

impl SendFailure {
    pub fn rejected(id: JobId, error: SbdError) -> Self {
        Self {
            id,
            status: SendStatus::Rejected,
            error,
        }
    }

    pub fn timed_out(id: JobId, timeout: Duration, last_status: Option<SessionStatus>) -> Self {
        Self {
            id,
            status: SendStatus::Timeout,
            error: SbdError::SendTimeout {
                after: timeout,
                last_status,
            },
        }
    }

    /// Last session report seen before the failure.
    pub fn last_status(&self) -> Option<&SessionStatus> {
        self.error.session_status()
    }
}
