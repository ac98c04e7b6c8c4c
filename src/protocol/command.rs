//! Command definitions
//!
//! Turns a request's argument list into a typed command.

use thiserror::Error;

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Vec<u8> },

    /// Set a key-value pair
    Set { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Del { key: Vec<u8> },

    /// Ping (health check)
    Ping,
}

/// Why an argument list is not a command; the text is sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR empty command")]
    Empty,

    #[error("ERR unknown command '{0}'")]
    Unknown(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),
}

impl Command {
    /// Parse `[name, args...]`; the name is case-insensitive
    pub fn parse(args: Vec<Vec<u8>>) -> Result<Self, CommandError> {
        let mut args = args.into_iter();
        let name = args.next().ok_or(CommandError::Empty)?;
        let rest: Vec<Vec<u8>> = args.collect();

        match name.to_ascii_uppercase().as_slice() {
            b"GET" => match <[Vec<u8>; 1]>::try_from(rest) {
                Ok([key]) => Ok(Command::Get { key }),
                Err(_) => Err(CommandError::WrongArity("get")),
            },
            b"SET" => match <[Vec<u8>; 2]>::try_from(rest) {
                Ok([key, value]) => Ok(Command::Set { key, value }),
                Err(_) => Err(CommandError::WrongArity("set")),
            },
            b"DEL" => match <[Vec<u8>; 1]>::try_from(rest) {
                Ok([key]) => Ok(Command::Del { key }),
                Err(_) => Err(CommandError::WrongArity("del")),
            },
            b"PING" if rest.is_empty() => Ok(Command::Ping),
            b"PING" => Err(CommandError::WrongArity("ping")),
            _ => Err(CommandError::Unknown(
                String::from_utf8_lossy(&name).into_owned(),
            )),
        }
    }

    /// Command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Ping => "PING",
        }
    }

    /// Argument list including the name, for encoding a request
    pub fn to_args(&self) -> Vec<&[u8]> {
        let name = self.name().as_bytes();
        match self {
            Command::Get { key } | Command::Del { key } => vec![name, key.as_slice()],
            Command::Set { key, value } => vec![name, key.as_slice(), value.as_slice()],
            Command::Ping => vec![name],
        }
    }

    /// Whether the command changes the store
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set { .. } | Command::Del { .. })
    }
}
