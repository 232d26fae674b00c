// ABOUTME: Demo that checks signal strength, sends a handful of messages, and prints anything received
// ABOUTME: Opens the serial device from the command line or SBD_SERIAL_PATH / SBD_BAUD_RATE

use argh::FromArgs;
use iridium_sbd::client::{AtCommander, Modem, ModemConfig, SbdReceiver, SbdTransmitter};
use std::error::Error;
use std::time::Duration;

/// Send test messages through an Iridium SBD modem
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the serial device (default: $SBD_SERIAL_PATH or /dev/ttyUSB0)
    #[argh(option)]
    device: Option<String>,

    /// the serial line speed (default: $SBD_BAUD_RATE or 19200)
    #[argh(option, short = 'b')]
    baud: Option<u32>,

    /// how many messages to send (default: 5)
    #[argh(option, short = 'n')]
    count: Option<u32>,

    /// session attempts per message (default: 10)
    #[argh(option, short = 'r')]
    retries: Option<u32>,
}

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ModemConfig::from_env();
    if let Some(device) = cli_args.device {
        config.device = device;
    }
    if let Some(baud) = cli_args.baud {
        config.baud_rate = baud;
    }
    if let Some(retries) = cli_args.retries {
        config.send_retries = retries;
    }
    let count = cli_args.count.unwrap_or(5);

    let modem = Modem::open(config)?;
    let config = modem.config();
    println!(
        "Opened {} at {} baud, {} session attempt(s) per send within {:?}",
        config.device, config.baud_rate, config.send_retries, config.send_timeout
    );

    let mut inbox = modem.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = inbox.recv().await {
            println!("Received message {}: {}", message.mtmsn, message.body);
        }
    });

    match modem.signal_strength().await {
        Ok(strength) => println!("Signal strength: {strength}"),
        Err(e) => eprintln!("Signal check failed: {e}"),
    }

    for i in 0..count {
        let text = format!("Hello_Earth_{i}");
        match modem.send(&text).await {
            Ok(receipt) => println!(
                "Sent {text} as {} after {} attempt(s), MOMSN {}",
                receipt.id, receipt.attempts, receipt.session.momsn
            ),
            Err(failure) => match failure.last_status() {
                Some(status) => eprintln!(
                    "Failed to send {text}: {failure} (last MO status {})",
                    status.mo_status
                ),
                None => eprintln!("Failed to send {text}: {failure}"),
            },
        }
    }

    // Give a ring-triggered download a chance to land before exiting.
    tokio::time::sleep(Duration::from_secs(5)).await;
    modem.shutdown();

    Ok(())
}
