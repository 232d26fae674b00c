pub mod client;
pub mod command;
pub mod connection;
pub mod datatypes;
pub mod router;


// Re-export the main client API for easy access
pub use client::{
    AtCommander, Modem, ModemConfig, SbdError, SbdReceiver, SbdResult, SbdTransmitter,
    SendFailure, SendReceipt, SendStatus,
};
pub use command::{AtCommand, SessionKind};
pub use datatypes::{MoStatusCode, SessionStatus};

/// Error returned by the demo and other top-level glue.
///
/// Library operations return [`SbdError`] or [`SendFailure`]; this boxed
/// form is only for code that mixes them with other error sources.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for top-level glue.
///
/// # Examples
///
/// ## Sending a message
///
/// ```rust,no_run
/// use iridium_sbd::{Modem, ModemConfig, SbdTransmitter};
///
/// #[tokio::main]
/// async fn main() -> iridium_sbd::Result<()> {
///     let modem = Modem::open(ModemConfig::new("/dev/ttyUSB0"))?;
///
///     let receipt = modem.send("Hello_Earth").await?;
///     println!("message {} {}", receipt.id, receipt.status);
///
///     modem.shutdown();
///     Ok(())
/// }
/// ```
///
/// ## Listening for messages over any stream
///
/// ```rust,no_run
/// use iridium_sbd::client::{Modem, ModemConfig, SbdReceiver};
///
/// # async fn example(stream: tokio::io::DuplexStream) -> iridium_sbd::Result<()> {
/// let modem = Modem::spawn(stream, ModemConfig::default());
/// let mut inbox = modem.subscribe();
///
/// while let Ok(message) = inbox.recv().await {
///     println!("MTMSN {}: {}", message.mtmsn, message.body);
/// }
/// # Ok(())
/// # }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
