// ABOUTME: Modem handle that owns the two worker tasks and implements the client traits
// ABOUTME: Spawned over any async byte stream; opens a serial port when the serial feature is on

use crate::client::config::ModemConfig;
use crate::client::error::{SbdResult, SendFailure};
use crate::client::outbox::{SendQueue, SendWorker};
use crate::client::queue::{CommandLease, CommandQueue, CommandWorker, PendingCommand};
use crate::client::traits::{AtCommander, SbdReceiver, SbdTransmitter};
use crate::client::types::{CommandResponse, InboundMessage, SendReceipt};
use crate::command::AtCommand;
use crate::connection::Connection;
use crate::datatypes::JobIds;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Capacity of the inbound message channel; slow subscribers lag past this
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running SBD modem
///
/// Two tasks sit behind it: one owns the serial link and runs AT commands
/// strictly one at a time, the other runs send jobs and ring-triggered
/// downloads in order. Clones share both tasks.
///
/// The tasks stop on [`shutdown`](Modem::shutdown), when the link closes,
/// or once every handle is dropped.
#[derive(Clone, Debug)]
pub struct Modem {
    commands: CommandQueue,
    sends: SendQueue,
    messages: broadcast::Sender<InboundMessage>,
    config: Arc<ModemConfig>,
    shutdown: CancellationToken,
}

impl Modem {
    /// Start the modem workers over an already-open stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stream: S, config: ModemConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = Arc::new(config);
        let ids = Arc::new(JobIds::new());
        let shutdown = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (ring_tx, ring_rx) = mpsc::unbounded_channel();
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        let commands = CommandQueue::new(command_tx, ids.clone());

        let command_worker = CommandWorker::new(
            Connection::new(stream),
            command_rx,
            ring_tx,
            config.command_timeout,
            shutdown.clone(),
        );

        let send_worker = SendWorker::new(
            commands.clone(),
            messages.clone(),
            config.clone(),
            send_rx,
            ring_rx,
            shutdown.clone(),
        );

        tokio::spawn(command_worker.run());
        tokio::spawn(send_worker.run());

        info!(device = %config.device, "SBD modem started");

        Self {
            commands,
            sends: SendQueue::new(send_tx, ids),
            messages,
            config,
            shutdown,
        }
    }

    /// Open the configured serial device and start the modem workers.
    #[cfg(feature = "serial")]
    pub fn open(config: ModemConfig) -> SbdResult<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(&config.device, config.baud_rate)
            .open_native_async()
            .map_err(std::io::Error::from)?;

        info!(device = %config.device, baud_rate = config.baud_rate, "serial port opened");
        Ok(Self::spawn(port, config))
    }

    /// Queue a raw command without waiting for it.
    pub fn enqueue(&self, command: AtCommand) -> SbdResult<PendingCommand> {
        self.commands.enqueue(command)
    }

    /// Hold the modem for a run of commands no other caller may interleave.
    ///
    /// Commands queued through the returned lease are the only ones written
    /// until every clone of it is dropped.
    pub async fn lease(&self) -> SbdResult<CommandLease> {
        self.commands.lease().await
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Stop both workers. Queued and in-flight work is rejected.
    pub fn shutdown(&self) {
        info!("SBD modem shutting down");
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

impl AtCommander for Modem {
    async fn command(&self, command: AtCommand) -> SbdResult<CommandResponse> {
        self.commands.command(command).await
    }
}

impl SbdTransmitter for Modem {
    async fn send(&self, message: &str) -> Result<SendReceipt, SendFailure> {
        self.send_with(message, self.config.send_retries, self.config.send_timeout)
            .await
    }

    async fn send_with(
        &self,
        message: &str,
        retries: u32,
        timeout: Duration,
    ) -> Result<SendReceipt, SendFailure> {
        self.sends.send(message, retries, timeout).await
    }
}

impl SbdReceiver for Modem {
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.messages.subscribe()
    }
}
