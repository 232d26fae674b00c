use crate::datatypes::MoStatusCode;
use std::fmt;

/// Token that introduces a session (`AT+SBDIX`/`AT+SBDIXA`) result line.
pub const SBDIX_TOKEN: &str = "+SBDIX:";

/// Highest mobile-originated status that still counts as a successful session.
pub const MO_SUCCESS_MAX: u8 = 4;

/// Parsed result of an SBD session
///
/// The modem reports a session as a single line:
///
/// ```text
/// +SBDIX: <MO status>, <MOMSN>, <MT status>, <MTMSN>, <MT length>, <MT queued>
/// ```
///
/// A record is produced once per response line and never mutated afterwards.
/// Lines that do not carry the `+SBDIX:` token, or whose numeric fields do not
/// parse, produce a zeroed record with `is_valid` set to false.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Mobile-originated status (0-4 success, anything higher is a failure)
    pub mo_status: u8,
    /// Mobile-originated message sequence number
    pub momsn: u16,
    /// Mobile-terminated status (0 no message, 1 message received, 2 error)
    pub mt_status: u8,
    /// Mobile-terminated message sequence number
    pub mtmsn: u16,
    /// Length in bytes of the mobile-terminated message
    pub mt_length: u16,
    /// Mobile-terminated messages still queued at the gateway
    pub mt_queued: u16,
    /// Whether the line carried a well-formed session report
    pub is_valid: bool,
}

impl SessionStatus {
    /// Parse a session result line.
    ///
    /// # Example
    ///
    /// ```rust
    /// use iridium_sbd::datatypes::SessionStatus;
    ///
    /// let status = SessionStatus::parse("+SBDIX: 0, 12, 0, 0, 0, 0");
    /// assert!(status.is_valid);
    /// assert_eq!(status.momsn, 12);
    ///
    /// assert!(!SessionStatus::parse("OK").is_valid);
    /// ```
    pub fn parse(line: &str) -> Self {
        let Some(start) = line.find(SBDIX_TOKEN) else {
            return Self::default();
        };

        let mut fields = line[start + SBDIX_TOKEN.len()..]
            .split_whitespace()
            .map(|field| field.trim_end_matches(','));

        match Self::parse_fields(&mut fields) {
            Some(status) => status,
            None => Self::default(),
        }
    }

    fn parse_fields<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Option<Self> {
        Some(SessionStatus {
            mo_status: fields.next()?.parse().ok()?,
            momsn: fields.next()?.parse().ok()?,
            mt_status: fields.next()?.parse().ok()?,
            mtmsn: fields.next()?.parse().ok()?,
            mt_length: fields.next()?.parse().ok()?,
            mt_queued: fields.next()?.parse().ok()?,
            is_valid: true,
        })
    }

    /// True when the mobile-originated part of the session succeeded.
    ///
    /// A record that failed to parse is never a success.
    pub fn mo_succeeded(&self) -> bool {
        self.is_valid && self.mo_status <= MO_SUCCESS_MAX
    }

    /// True when the session went through and the gateway reported a
    /// mobile-terminated message for retrieval.
    pub fn has_mail(&self) -> bool {
        self.is_valid && self.mo_status < MO_SUCCESS_MAX && self.mt_status > 0
    }

    /// Named status code for the mobile-originated result, when it is a
    /// documented one.
    pub fn mo_status_code(&self) -> Option<MoStatusCode> {
        MoStatusCode::try_from(self.mo_status).ok()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid {
            return write!(f, "invalid session status");
        }
        write!(
            f,
            "MO {} (MOMSN {}), MT {} (MTMSN {}, {} bytes, {} queued)",
            self.mo_status, self.momsn, self.mt_status, self.mtmsn, self.mt_length, self.mt_queued
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_session() {
        let status = SessionStatus::parse("+SBDIX: 0, 12, 0, 0, 0, 0");

        assert!(status.is_valid);
        assert_eq!(status.mo_status, 0);
        assert_eq!(status.momsn, 12);
        assert_eq!(status.mt_status, 0);
        assert_eq!(status.mt_queued, 0);
        assert!(status.mo_succeeded());
        assert!(!status.has_mail());
    }

    #[test]
    fn parses_waiting_mail() {
        let status = SessionStatus::parse("+SBDIX: 0, 1, 1, 2, 10, 2");

        assert_eq!(
            status,
            SessionStatus {
                mo_status: 0,
                momsn: 1,
                mt_status: 1,
                mtmsn: 2,
                mt_length: 10,
                mt_queued: 2,
                is_valid: true,
            }
        );
        assert!(status.has_mail());
    }

    #[test]
    fn line_without_token_is_invalid_and_zeroed() {
        let status = SessionStatus::parse("+CSQ:5");

        assert_eq!(status, SessionStatus::default());
        assert!(!status.is_valid);
        assert!(!status.mo_succeeded());
    }

    #[test]
    fn malformed_fields_are_invalid() {
        assert!(!SessionStatus::parse("+SBDIX: 0, x, 0, 0, 0, 0").is_valid);
        assert!(!SessionStatus::parse("+SBDIX: 0, 1, 0").is_valid);
        assert!(!SessionStatus::parse("+SBDIX: -1, 1, 0, 0, 0, 0").is_valid);
    }

    #[test]
    fn tolerates_carriage_return_and_missing_spaces() {
        let status = SessionStatus::parse("+SBDIX: 32, 7, 0, 0, 0, 0\r");
        assert!(status.is_valid);
        assert_eq!(status.mo_status, 32);
        assert!(!status.mo_succeeded());
        assert_eq!(status.mo_status_code(), Some(MoStatusCode::NoNetworkService));
    }

    #[test]
    fn status_four_is_the_success_boundary() {
        assert!(SessionStatus::parse("+SBDIX: 4, 1, 0, 0, 0, 0").mo_succeeded());
        assert!(!SessionStatus::parse("+SBDIX: 5, 1, 0, 0, 0, 0").mo_succeeded());
        // MO status 4 succeeds but does not open the mailbox
        assert!(!SessionStatus::parse("+SBDIX: 4, 1, 1, 0, 0, 0").has_mail());
    }
}
