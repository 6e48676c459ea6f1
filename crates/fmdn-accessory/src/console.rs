//! Line-oriented stand-in for a radio transport.
//!
//! Lets a host drive the accessory from stdin: connections, challenge reads
//! and command writes carry hex frames, and local events (button, battery,
//! consent) are plain words.

use std::time::Duration;

use fmdn_core::{BatteryLevel, ConnectionId};
use fmdn_proto::ACCOUNT_KEY_SIZE;
use thiserror::Error;

use crate::platform::DEFAULT_CONSENT_WINDOW;

/// One console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `connect <id>`
    Connect(ConnectionId),
    /// `disconnect <id>`
    Disconnect(ConnectionId),
    /// `challenge <id>`
    Challenge(ConnectionId),
    /// `write <id> <hex>`
    Write(ConnectionId, Vec<u8>),
    /// `button`
    Button,
    /// `battery <unsupported|normal|low|critical>`
    Battery(BatteryLevel),
    /// `consent [secs]`
    Consent(Duration),
    /// `add-key <hex>`
    AddKey([u8; ACCOUNT_KEY_SIZE]),
    /// `reset`
    Reset,
    /// `quit`
    Quit,
}

/// Why a console line was not understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Line was blank
    #[error("empty line")]
    Empty,

    /// First word is not a command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required argument is absent
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// An argument did not parse
    #[error("invalid {field}: {value}")]
    InvalidArgument {
        /// Argument name
        field: &'static str,
        /// Offending text
        value: String,
    },
}

/// Parse one console line.
///
/// # Errors
///
/// Any [`ConsoleError`].
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or(ConsoleError::Empty)?;

    let parsed = match command {
        "connect" => ConsoleCommand::Connect(connection(words.next())?),
        "disconnect" => ConsoleCommand::Disconnect(connection(words.next())?),
        "challenge" => ConsoleCommand::Challenge(connection(words.next())?),
        "write" => {
            let id = connection(words.next())?;
            ConsoleCommand::Write(id, hex_bytes("frame", words.next())?)
        },
        "button" => ConsoleCommand::Button,
        "battery" => ConsoleCommand::Battery(battery(words.next())?),
        "consent" => ConsoleCommand::Consent(match words.next() {
            Some(secs) => Duration::from_secs(number("seconds", secs)?),
            None => DEFAULT_CONSENT_WINDOW,
        }),
        "add-key" => {
            let bytes = hex_bytes("account key", words.next())?;
            let key = <[u8; ACCOUNT_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
                ConsoleError::InvalidArgument { field: "account key", value: hex::encode(&bytes) }
            })?;
            ConsoleCommand::AddKey(key)
        },
        "reset" => ConsoleCommand::Reset,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(parsed)
}

fn connection(word: Option<&str>) -> Result<ConnectionId, ConsoleError> {
    let word = word.ok_or(ConsoleError::MissingArgument("connection"))?;
    number("connection", word).map(ConnectionId)
}

fn number(field: &'static str, word: &str) -> Result<u64, ConsoleError> {
    word.parse().map_err(|_| ConsoleError::InvalidArgument { field, value: word.to_string() })
}

fn hex_bytes(field: &'static str, word: Option<&str>) -> Result<Vec<u8>, ConsoleError> {
    let word = word.ok_or(ConsoleError::MissingArgument(field))?;
    hex::decode(word).map_err(|_| ConsoleError::InvalidArgument { field, value: word.to_string() })
}

fn battery(word: Option<&str>) -> Result<BatteryLevel, ConsoleError> {
    match word.ok_or(ConsoleError::MissingArgument("battery"))? {
        "unsupported" => Ok(BatteryLevel::Unsupported),
        "normal" => Ok(BatteryLevel::Normal),
        "low" => Ok(BatteryLevel::Low),
        "critical" => Ok(BatteryLevel::CriticallyLow),
        other => {
            Err(ConsoleError::InvalidArgument { field: "battery", value: other.to_string() })
        },
    }
}
