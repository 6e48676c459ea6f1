//! FMDN accessory binary.
//!
//! Runs the accessory against a redb record store and drives it from a
//! line console on stdin (see [`fmdn_accessory::console`]). Notifications
//! and command results are written to stdout as hex.
//!
//! # Usage
//!
//! ```bash
//! # Fresh device with an owner key seeded
//! fmdn-accessory --db accessory.redb --account-key 00112233445566778899aabbccddeeff
//!
//! # Two ring components with volume control, verbose logs
//! fmdn-accessory --ring-components 2 --volume-control --log-level debug
//! ```

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use fmdn_accessory::{
    AccessoryRuntime, DEFAULT_EVENT_CAPACITY, LoggingSink, RedbStorage, RuntimeError,
    RuntimeHandle,
    console::{self, ConsoleCommand, ConsoleError},
};
use fmdn_core::{AccessoryConfig, LocalRingEvent};
use fmdn_proto::{ACCOUNT_KEY_SIZE, EcCurve};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Identifier curve.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Curve {
    Secp160r1,
    Secp256r1,
}

impl From<Curve> for EcCurve {
    fn from(curve: Curve) -> Self {
        match curve {
            Curve::Secp160r1 => Self::Secp160r1,
            Curve::Secp256r1 => Self::Secp256r1,
        }
    }
}

/// FMDN accessory
#[derive(Parser, Debug)]
#[command(name = "fmdn-accessory")]
#[command(about = "Find My Device Network accessory with a stdin console transport")]
#[command(version)]
struct Args {
    /// Path to the record database
    #[arg(long, default_value = "fmdn-accessory.redb")]
    db: String,

    /// Account key (32 hex digits) to admit at startup
    #[arg(long)]
    account_key: Option<String>,

    /// Identifier curve (the built-in crypto provider implements secp256r1)
    #[arg(long, value_enum, default_value_t = Curve::Secp256r1)]
    curve: Curve,

    /// Number of ringing components (0 = cannot ring)
    #[arg(long, default_value = "1")]
    ring_components: u8,

    /// Whether the actuator supports volume selection
    #[arg(long)]
    volume_control: bool,

    /// Account key store capacity
    #[arg(long, default_value = "5")]
    max_account_keys: usize,

    /// Calibrated TX power at 0 m, in dBm
    #[arg(long, default_value = "-10", allow_hyphen_values = true)]
    tx_power: i8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn accessory_config(&self) -> AccessoryConfig {
        AccessoryConfig {
            curve: self.curve.into(),
            ring_components: self.ring_components,
            volume_control: self.volume_control,
            max_account_keys: self.max_account_keys,
            calibrated_tx_power: self.tx_power,
            ..AccessoryConfig::default()
        }
    }

    fn account_key(&self) -> Result<Option<[u8; ACCOUNT_KEY_SIZE]>, RuntimeError> {
        let Some(text) = &self.account_key else {
            return Ok(None);
        };
        let bytes = hex::decode(text)
            .map_err(|e| RuntimeError::Config(format!("account key is not hex: {e}")))?;
        let key = <[u8; ACCOUNT_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
            RuntimeError::Config(format!("account key must be {ACCOUNT_KEY_SIZE} bytes"))
        })?;
        Ok(Some(key))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    tracing::info!(db = %args.db, curve = ?args.curve, "FMDN accessory starting");

    let storage = RedbStorage::open(&args.db)?;
    let (notify_tx, mut notifications) = mpsc::unbounded_channel();
    let sink = LoggingSink::with_notify(move |connection, frame| {
        let _ = notify_tx.send(format!("notify {} {}", connection.0, hex::encode(&frame)));
    });

    let mut runtime = AccessoryRuntime::new(args.accessory_config(), storage, sink)?;
    if let Some(key) = args.account_key()? {
        let saved = runtime.add_account_key(key);
        tracing::info!(id = saved.id(), owner = saved.is_owner(), "account key seeded");
    }

    let (handle, task) = runtime.spawn(DEFAULT_EVENT_CAPACITY);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console::parse(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => {
                        let reply = run_command(&handle, command).await;
                        write_line(&mut stdout, &reply).await?;
                    },
                    Err(ConsoleError::Empty) => {},
                    Err(e) => write_line(&mut stdout, &format!("error {e}")).await?,
                }
            },
            Some(notification) = notifications.recv() => {
                write_line(&mut stdout, &notification).await?;
            },
        }
    }

    handle.shutdown().await?;
    task.await?;
    Ok(())
}

async fn run_command(handle: &RuntimeHandle, command: ConsoleCommand) -> String {
    let ok = |()| "ok".to_string();
    let result = match command {
        ConsoleCommand::Connect(connection) => handle.connect(connection).await.map(ok),
        ConsoleCommand::Disconnect(connection) => handle.disconnect(connection).await.map(ok),
        ConsoleCommand::Challenge(connection) => handle
            .read_challenge(connection)
            .await
            .map(|challenge| format!("challenge {}", hex::encode(&challenge))),
        ConsoleCommand::Write(connection, frame) => {
            handle.write(connection, Bytes::from(frame)).await.map(ok)
        },
        ConsoleCommand::Button => handle.local_ring(LocalRingEvent::StoppedByButton).await.map(ok),
        ConsoleCommand::Battery(level) => handle.battery_changed(level).await.map(ok),
        ConsoleCommand::Consent(window) => handle.grant_consent(window).await.map(ok),
        ConsoleCommand::AddKey(key) => handle.add_account_key(key).await.map(ok),
        ConsoleCommand::Reset => handle.factory_reset().await.map(ok),
        ConsoleCommand::Quit => Ok("bye".to_string()),
    };

    match result {
        Ok(reply) => reply,
        Err(RuntimeError::Dispatch(e)) => format!("error {:#04x} {e}", e.code().to_u8()),
        Err(e) => format!("error {e}"),
    }
}

async fn write_line(stdout: &mut Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
