// ABOUTME: AT command descriptions for the Iridium SBD dialect
// ABOUTME: Each command carries its text, the delimiter that completes it, and its matching rule

use crate::datatypes::{CSQ_TOKEN, SBDIX_TOKEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Delimiter used by commands that complete on a plain `OK`.
pub const DEFAULT_DELIMITER: &str = "OK";

/// Unsolicited ring alert announcing mobile-terminated mail.
pub const RING_TOKEN: &str = "SBDRING";

/// Any line containing this token fails the in-flight command.
pub const ERROR_TOKEN: &str = "ERROR";

/// Reply to `AT+SBDWT` once the modem accepts message text.
pub const READY_TOKEN: &str = "READY";

/// Header line that precedes mobile-terminated text.
pub const SBDRT_TOKEN: &str = "+SBDRT:";

/// Which session command to run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// `AT+SBDIX`
    Standard,
    /// `AT+SBDIXA`, answering a ring alert
    Extended,
}

/// A single AT command and the rule that decides when it has completed
///
/// The command text is sent verbatim followed by a carriage return. The
/// command completes on the first inbound line that contains `delimiter`,
/// unless `prepend_match` is set: then it completes on the line *after* the
/// one containing the delimiter, and that following line is the payload.
///
/// Commands whose delimiter is an information response (`+CSQ:`, `+SBDIX:`)
/// are followed by a final `OK`. The queue waits for that line before it
/// writes the next command, so the `OK` cannot be taken as the next reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtCommand {
    text: String,
    delimiter: String,
    prepend_match: bool,
    awaits_final_result: bool,
}

impl AtCommand {
    /// Create a command that completes on a line containing `delimiter`.
    ///
    /// Unless the delimiter is `OK` itself, a final result code is expected
    /// after the matching line.
    pub fn new(text: impl Into<String>, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        Self {
            text: text.into(),
            awaits_final_result: delimiter != DEFAULT_DELIMITER,
            delimiter,
            prepend_match: false,
        }
    }

    /// Complete on the line following the delimiter line instead.
    pub fn with_prepend_match(mut self) -> Self {
        self.prepend_match = true;
        self
    }

    /// The matching line is the last thing the modem sends for this command.
    pub fn without_final_result(mut self) -> Self {
        self.awaits_final_result = false;
        self
    }

    /// `AT+CSQ`, signal quality
    pub fn signal_quality() -> Self {
        Self::new("AT+CSQ", CSQ_TOKEN)
    }

    /// `AT+SBDWT`, enter text write mode. `READY` is not followed by `OK`;
    /// the modem waits for the message text instead.
    pub fn write_text() -> Self {
        Self::new("AT+SBDWT", READY_TOKEN).without_final_result()
    }

    /// Message body that commits the text written after `AT+SBDWT`
    pub fn commit_text(message: &str) -> Self {
        Self::new(message, DEFAULT_DELIMITER)
    }

    /// `AT+SBDIX` or `AT+SBDIXA`, start an SBD session
    pub fn session(kind: SessionKind) -> Self {
        let text = match kind {
            SessionKind::Standard => "AT+SBDIX",
            SessionKind::Extended => "AT+SBDIXA",
        };
        Self::new(text, SBDIX_TOKEN)
    }

    /// `AT+SBDRT`, read mobile-terminated text. The text follows the
    /// `+SBDRT:` header line.
    pub fn read_text() -> Self {
        Self::new("AT+SBDRT", SBDRT_TOKEN).with_prepend_match()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn prepend_match(&self) -> bool {
        self.prepend_match
    }

    pub fn awaits_final_result(&self) -> bool {
        self.awaits_final_result
    }

    /// Bytes to put on the wire.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.text.len() + 1);
        buf.put_slice(self.text.as_bytes());
        buf.put_u8(b'\r');
        buf.freeze()
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_table_is_byte_exact() {
        assert_eq!(&AtCommand::signal_quality().encode()[..], b"AT+CSQ\r");
        assert_eq!(&AtCommand::write_text().encode()[..], b"AT+SBDWT\r");
        assert_eq!(&AtCommand::commit_text("Hello").encode()[..], b"Hello\r");
        assert_eq!(&AtCommand::session(SessionKind::Standard).encode()[..], b"AT+SBDIX\r");
        assert_eq!(&AtCommand::session(SessionKind::Extended).encode()[..], b"AT+SBDIXA\r");
        assert_eq!(&AtCommand::read_text().encode()[..], b"AT+SBDRT\r");
    }

    #[test]
    fn delimiters_and_matching_rules() {
        assert_eq!(AtCommand::signal_quality().delimiter(), "+CSQ:");
        assert_eq!(AtCommand::write_text().delimiter(), "READY");
        assert_eq!(AtCommand::commit_text("x").delimiter(), "OK");
        assert_eq!(AtCommand::session(SessionKind::Extended).delimiter(), "+SBDIX:");

        let read = AtCommand::read_text();
        assert_eq!(read.delimiter(), "+SBDRT:");
        assert!(read.prepend_match());
        assert!(!AtCommand::signal_quality().prepend_match());
    }

    #[test]
    fn final_result_expectations() {
        assert!(AtCommand::signal_quality().awaits_final_result());
        assert!(AtCommand::session(SessionKind::Standard).awaits_final_result());
        assert!(AtCommand::read_text().awaits_final_result());
        assert!(!AtCommand::write_text().awaits_final_result());
        assert!(!AtCommand::commit_text("x").awaits_final_result());
        assert!(!AtCommand::new("AT+CSQ", "+CSQ:").without_final_result().awaits_final_result());
    }
}
