use num_enum::TryFromPrimitive;

/// Mobile-originated status codes reported in the first field of `+SBDIX:`.
///
/// Values 0 through 4 indicate that the MO part of the session completed.
/// Codes not listed here are reserved and are treated as failures.
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoStatusCode {
    /// MO message, if any, transferred successfully
    Transferred = 0,

    /// MO message transferred, but the MT message in the queue was too big
    MtMessageTooBig = 1,

    /// MO message transferred, but the requested location update was not accepted
    LocationUpdateRejected = 2,

    /// GSS reported that the call did not complete in the allowed time
    CallTimeout = 10,

    /// MO message queue at the GSS is full
    GssQueueFull = 11,

    /// MO message has too many segments
    TooManySegments = 12,

    /// GSS reported that the session did not complete
    SessionIncomplete = 13,

    /// Invalid segment size
    InvalidSegmentSize = 14,

    /// Access is denied
    AccessDenied = 15,

    /// Transceiver is locked and may not make SBD calls
    Locked = 16,

    /// Gateway not responding (local session timeout)
    GatewayNotResponding = 17,

    /// Connection lost (RF drop)
    ConnectionLost = 18,

    /// Link failure (a protocol error caused termination of the call)
    LinkFailure = 19,

    /// No network service, unable to initiate call
    NoNetworkService = 32,

    /// Antenna fault, unable to initiate call
    AntennaFault = 33,

    /// Radio is disabled, unable to initiate call
    RadioDisabled = 34,

    /// Transceiver is busy, unable to initiate call
    Busy = 35,

    /// Must wait three minutes since the last registration
    TryLater = 36,

    /// SBD service is temporarily disabled
    ServiceDisabled = 37,

    /// Traffic management period
    TrafficManagement = 38,

    /// Band violation (attempt to transmit outside permitted frequency band)
    BandViolation = 64,

    /// PLL lock failure, hardware error during attempted transmit
    PllLockFailure = 65,
}

impl MoStatusCode {
    /// Human readable description for logs.
    pub fn description(&self) -> &'static str {
        match self {
            MoStatusCode::Transferred => "MO message transferred",
            MoStatusCode::MtMessageTooBig => "MO transferred, MT message too big",
            MoStatusCode::LocationUpdateRejected => "MO transferred, location update rejected",
            MoStatusCode::CallTimeout => "call did not complete in time",
            MoStatusCode::GssQueueFull => "gateway MO queue full",
            MoStatusCode::TooManySegments => "too many segments",
            MoStatusCode::SessionIncomplete => "session did not complete",
            MoStatusCode::InvalidSegmentSize => "invalid segment size",
            MoStatusCode::AccessDenied => "access denied",
            MoStatusCode::Locked => "transceiver locked",
            MoStatusCode::GatewayNotResponding => "gateway not responding",
            MoStatusCode::ConnectionLost => "connection lost (RF drop)",
            MoStatusCode::LinkFailure => "link failure",
            MoStatusCode::NoNetworkService => "no network service",
            MoStatusCode::AntennaFault => "antenna fault",
            MoStatusCode::RadioDisabled => "radio disabled",
            MoStatusCode::Busy => "transceiver busy",
            MoStatusCode::TryLater => "try later, registration hold-off",
            MoStatusCode::ServiceDisabled => "SBD service temporarily disabled",
            MoStatusCode::TrafficManagement => "traffic management period",
            MoStatusCode::BandViolation => "band violation",
            MoStatusCode::PllLockFailure => "PLL lock failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_convert() {
        assert_eq!(MoStatusCode::try_from(0).ok(), Some(MoStatusCode::Transferred));
        assert_eq!(MoStatusCode::try_from(32).ok(), Some(MoStatusCode::NoNetworkService));
        assert_eq!(MoStatusCode::try_from(65).ok(), Some(MoStatusCode::PllLockFailure));
    }

    #[test]
    fn reserved_codes_do_not_convert() {
        assert!(MoStatusCode::try_from(3).is_err());
        assert!(MoStatusCode::try_from(20).is_err());
        assert!(MoStatusCode::try_from(255).is_err());
    }
}
