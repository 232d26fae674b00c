// ABOUTME: Modem client traits using native async functions
// ABOUTME: Separates raw AT command access from message sending and receiving

use crate::client::error::{SbdResult, SendFailure};
use crate::client::types::{CommandResponse, InboundMessage, SendReceipt};
use crate::command::AtCommand;
use crate::datatypes::parse_signal_quality;
use std::time::Duration;
use tokio::sync::broadcast;

/// Serialized access to the modem's AT command set
///
/// Implementations guarantee that commands reach the modem one at a time,
/// in the order they were issued.
pub trait AtCommander {
    /// Run one command and wait for the line that completes it.
    async fn command(&self, command: AtCommand) -> SbdResult<CommandResponse>;

    /// Query signal quality, 0 (none) to 5 (best).
    async fn signal_strength(&self) -> SbdResult<u8> {
        let response = self.command(AtCommand::signal_quality()).await?;
        parse_signal_quality(&response.data)
    }
}

/// Sending mobile-originated messages
pub trait SbdTransmitter: AtCommander {
    /// Send with the configured retry budget and deadline.
    async fn send(&self, message: &str) -> Result<SendReceipt, SendFailure>;

    /// Send with an explicit session retry budget and overall deadline.
    async fn send_with(
        &self,
        message: &str,
        retries: u32,
        timeout: Duration,
    ) -> Result<SendReceipt, SendFailure>;
}

/// Receiving mobile-terminated messages
pub trait SbdReceiver {
    /// Stream of message bodies as they are drained from the gateway.
    ///
    /// Only messages drained after subscribing are delivered.
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;
}
