//! Line commands understood by the terminal host.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Debug,
    /// Pointer enters the unit at this position.
    Arm(usize),
    /// Pointer leaves the unit at this position.
    Disarm(usize),
    /// Confirm retraction of the unit at this position.
    Retract(usize),
    Quit,
    /// Anything else is typed into the message box.
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0}")]
    Unknown(String),

    #[error("/{0} expects a position")]
    MissingPosition(&'static str),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    match name {
        "connect" => Ok(Command::Connect),
        "disconnect" => Ok(Command::Disconnect),
        "debug" => Ok(Command::Debug),
        "quit" => Ok(Command::Quit),
        "arm" => position("arm", words.next()).map(Command::Arm),
        "disarm" => position("disarm", words.next()).map(Command::Disarm),
        "retract" => position("retract", words.next()).map(Command::Retract),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn position(command: &'static str, word: Option<&str>) -> Result<usize, CommandError> {
    let word = word.ok_or(CommandError::MissingPosition(command))?;
    word.parse()
        .map_err(|_| CommandError::InvalidPosition(word.to_string()))
}
