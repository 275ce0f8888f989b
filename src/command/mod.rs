// src/command/mod.rs

//! The external command channel.
//!
//! Text commands arrive one per line, usually through a named pipe. This
//! module decodes them; [`server`] runs the threads that read and apply
//! them and [`fifo`] manages the pipe itself.

pub mod fifo;
pub mod server;
pub mod waker;

pub use fifo::CommandFifo;
pub use server::CommandServer;
pub use waker::ListenerWaker;

use crate::control::ControlCommand;
use crate::rules::Rule;
use std::fmt;
use std::time::Duration;

/// Longest line accepted as a command, in bytes after trimming.
pub const MAX_COMMAND_LEN: usize = 256;

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    TooLong(usize),
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument {
        command: &'static str,
        value: String,
    },
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandParseError::TooLong(len) => {
                write!(f, "command of {} bytes exceeds the {} byte limit", len, MAX_COMMAND_LEN)
            }
            CommandParseError::UnknownCommand(token) => write!(f, "unknown command '{}'", token),
            CommandParseError::MissingArgument(command) => {
                write!(f, "'{}' needs an argument ({}:<value>)", command, command)
            }
            CommandParseError::InvalidArgument { command, value } => {
                write!(f, "invalid argument '{}' for '{}'", value, command)
            }
        }
    }
}

impl std::error::Error for CommandParseError {}

/// Decodes one line from the channel.
///
/// Surrounding whitespace is ignored and a blank line yields `Ok(None)`.
/// Accepted forms: `reset`, `rule:<1-4>`, `speed:<microseconds>`,
/// `color:on`, `color:off`, `pause`, `resume` and `quit`.
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>, CommandParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.len() > MAX_COMMAND_LEN {
        return Err(CommandParseError::TooLong(line.len()));
    }

    let (name, argument) = match line.split_once(':') {
        Some((name, argument)) => (name.trim(), Some(argument.trim())),
        None => (line, None),
    };

    let command = match (name, argument) {
        ("reset", None) => ControlCommand::Reset,
        ("pause", None) => ControlCommand::Pause,
        ("resume", None) => ControlCommand::Resume,
        ("quit", None) => ControlCommand::Quit,
        ("rule", Some(value)) => {
            let rule = digits(value)
                .and_then(|value| value.parse::<u8>().ok())
                .and_then(Rule::from_id)
                .ok_or_else(|| invalid("rule", value))?;
            ControlCommand::SetRule(rule)
        }
        ("speed", Some(value)) => {
            let micros = digits(value)
                .and_then(|value| value.parse::<u64>().ok())
                .ok_or_else(|| invalid("speed", value))?;
            ControlCommand::SetSpeed(Duration::from_micros(micros))
        }
        ("color", Some(value)) => match value {
            "on" => ControlCommand::SetColorMode(true),
            "off" => ControlCommand::SetColorMode(false),
            _ => return Err(invalid("color", value)),
        },
        ("rule", None) => return Err(CommandParseError::MissingArgument("rule")),
        ("speed", None) => return Err(CommandParseError::MissingArgument("speed")),
        ("color", None) => return Err(CommandParseError::MissingArgument("color")),
        _ => return Err(CommandParseError::UnknownCommand(line.to_string())),
    };
    Ok(Some(command))
}

/// `value` if it is a bare run of ASCII digits. `str::parse` would also
/// take a leading `+`.
fn digits(value: &str) -> Option<&str> {
    (!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())).then_some(value)
}

fn invalid(command: &'static str, value: &str) -> CommandParseError {
    CommandParseError::InvalidArgument {
        command,
        value: value.to_string(),
    }
}
