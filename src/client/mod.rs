// ABOUTME: SBD modem client module: command queue, session engine, send queue, and the modem handle
// ABOUTME: Exports the client traits, configuration, error types, and value types

//! SBD Modem Client Module
//!
//! This module drives an Iridium SBD modem over a single serial line:
//!
//! * **Serialized AT commands** - One task owns the link; commands run strictly one at a time, FIFO
//! * **Per-command timeouts** - A command that never sees its delimiter fails alone, the queue moves on
//! * **Session retries** - `AT+SBDIX` is retried with a fixed delay, bounded per call
//! * **Mailbox draining** - Mobile-terminated messages are fetched after each session and on ring alerts
//! * **Native async traits** - No async_trait dependency
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iridium_sbd::client::{AtCommander, Modem, ModemConfig, SbdReceiver, SbdTransmitter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let modem = Modem::open(ModemConfig::from_env())?;
//!
//! println!("signal: {}", modem.signal_strength().await?);
//!
//! let mut inbox = modem.subscribe();
//! let receipt = modem.send("Hello_Earth").await?;
//! println!("sent {} after {} attempts", receipt.id, receipt.attempts);
//!
//! while let Ok(message) = inbox.try_recv() {
//!     println!("received: {}", message.body);
//! }
//!
//! modem.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! * `CommandQueue` - FIFO of AT commands, drained by the task that owns the link
//! * `CommandLease` - exclusive hold on the queue for a multi-command exchange
//! * `SessionEngine` - runs a session and retries while the modem reports failure
//! * `MailboxDrainer` - fetches waiting messages and publishes them to subscribers
//! * `Modem` - the handle; implements `AtCommander`, `SbdTransmitter`, and `SbdReceiver`
//!
//! The send queue runs on its own task and issues its commands through a
//! lease on the command queue, so a send holds the modem from `AT+SBDWT`
//! until its mailbox drain is over.

pub mod config;
pub mod error;
pub mod modem;
mod outbox;
pub mod queue;
pub mod session;
pub mod traits;
pub mod types;

pub use config::ModemConfig;
pub use error::{SbdError, SbdResult, SendFailure, SendStatus};
pub use modem::Modem;
pub use queue::{CommandLease, CommandQueue, PendingCommand};
pub use session::{MailboxDrainer, SessionEngine};
pub use traits::{AtCommander, SbdReceiver, SbdTransmitter};
pub use types::{
    CommandResponse, InboundMessage, InboxResult, MAX_TEXT_LEN, SendReceipt, SessionOutcome,
};
