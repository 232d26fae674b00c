// ABOUTME: Modem configuration covering the serial link, command timing, and session retry budgets
// ABOUTME: Builder-style setters with defaults taken from the modem's documented behaviour

use std::time::Duration;

/// Environment variable overriding the serial device path
pub const ENV_SERIAL_PATH: &str = "SBD_SERIAL_PATH";

/// Environment variable overriding the serial line speed
pub const ENV_BAUD_RATE: &str = "SBD_BAUD_RATE";

/// Configuration for an SBD modem
///
/// # Example
///
/// ```rust
/// use iridium_sbd::client::ModemConfig;
/// use std::time::Duration;
///
/// // Defaults: /dev/ttyUSB0 at 19200 baud, 10s command timeout
/// let config = ModemConfig::default();
///
/// let config = ModemConfig::new("/dev/ttyS1")
///     .with_baud_rate(115200)
///     .with_send_timeout(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct ModemConfig {
    /// Serial device path (default: `/dev/ttyUSB0`)
    pub device: String,

    /// Serial line speed (default: 19200)
    pub baud_rate: u32,

    /// How long a single AT command may wait for its delimiter (default: 10 seconds)
    pub command_timeout: Duration,

    /// Pause between failed session attempts (default: 10 seconds)
    pub session_retry_delay: Duration,

    /// Watchdog for one mailbox check (default: 60 seconds)
    pub mailbox_timeout: Duration,

    /// Session attempts for a ring-triggered download (default: 15)
    pub ring_session_retries: u32,

    /// Session attempts for `send` when none are given (default: 10)
    pub send_retries: u32,

    /// Overall deadline for `send` when none is given (default: 120 seconds)
    pub send_timeout: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            command_timeout: Duration::from_secs(10),
            session_retry_delay: Duration::from_secs(10),
            mailbox_timeout: Duration::from_secs(60),
            ring_session_retries: 15,
            send_retries: 10,
            send_timeout: Duration::from_secs(120),
        }
    }
}

impl ModemConfig {
    /// Default configuration for the given device
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `SBD_SERIAL_PATH` and `SBD_BAUD_RATE`.
    ///
    /// An unparsable baud rate is ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(device) = std::env::var(ENV_SERIAL_PATH) {
            config.device = device;
        }
        if let Some(baud_rate) = std::env::var(ENV_BAUD_RATE)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.baud_rate = baud_rate;
        }
        config
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_session_retry_delay(mut self, delay: Duration) -> Self {
        self.session_retry_delay = delay;
        self
    }

    pub fn with_mailbox_timeout(mut self, timeout: Duration) -> Self {
        self.mailbox_timeout = timeout;
        self
    }

    pub fn with_ring_session_retries(mut self, retries: u32) -> Self {
        self.ring_session_retries = retries;
        self
    }

    pub fn with_send_retries(mut self, retries: u32) -> Self {
        self.send_retries = retries;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ModemConfig::default();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.command_timeout, Duration::from_secs(10));
        assert_eq!(config.session_retry_delay, Duration::from_secs(10));
        assert_eq!(config.mailbox_timeout, Duration::from_secs(60));
        assert_eq!(config.ring_session_retries, 15);
        assert_eq!(config.send_retries, 10);
        assert_eq!(config.send_timeout, Duration::from_secs(120));
    }

    #[test]
    fn builder() {
        let config = ModemConfig::new("/dev/ttyS3")
            .with_baud_rate(115200)
            .with_command_timeout(Duration::from_secs(2))
            .with_send_retries(3);

        assert_eq!(config.device, "/dev/ttyS3");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.command_timeout, Duration::from_secs(2));
        assert_eq!(config.send_retries, 3);
        assert_eq!(config.mailbox_timeout, Duration::from_secs(60));
    }
}
