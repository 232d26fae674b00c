// ABOUTME: Value types passed between the modem queues and their callers
// ABOUTME: Command responses, session outcomes, mailbox results, inbound messages, and send receipts

use crate::client::error::{SbdError, SbdResult, SendStatus};
use crate::datatypes::{JobId, SessionStatus};

/// Longest message body accepted by `AT+SBDWT` text mode
pub const MAX_TEXT_LEN: usize = 120;

/// Completion of an AT command: the line that matched its delimiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub id: JobId,
    pub data: String,
}

/// Result of a session run by the session engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Report from the final attempt
    pub status: SessionStatus,
    /// Attempts made, including the final one
    pub attempts: u32,
    pub is_sent: bool,
}

/// Result of one mailbox check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxResult {
    /// Retrieved text, `None` when there was nothing to fetch
    pub message: Option<String>,
    /// Session report the check was based on
    pub status: SessionStatus,
}

impl InboxResult {
    pub fn empty(status: SessionStatus) -> Self {
        Self {
            message: None,
            status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    /// A message was fetched and the gateway reported more behind it.
    pub fn has_more(&self) -> bool {
        !self.is_empty() && self.status.mt_queued > 0
    }
}

/// Mobile-terminated message pulled from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: String,
    /// Sequence number assigned by the gateway
    pub mtmsn: u16,
    /// Messages still waiting at the gateway when this one was fetched
    pub queued: u16,
}

/// Successful completion of a send job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: JobId,
    pub status: SendStatus,
    /// Report from the session that carried the message
    pub session: SessionStatus,
    /// Session attempts it took
    pub attempts: u32,
    /// Mobile-terminated messages drained after the session
    pub messages_received: usize,
}

/// Check that `text` can be written with `AT+SBDWT`.
pub fn validate_message(text: &str) -> SbdResult<()> {
    if text.len() > MAX_TEXT_LEN {
        return Err(SbdError::InvalidData(format!(
            "Message too long ({} bytes, max {MAX_TEXT_LEN})",
            text.len()
        )));
    }
    if text.contains('\r') {
        return Err(SbdError::InvalidData(
            "Message must not contain a carriage return".to_string(),
        ));
    }
    Ok(())
}
