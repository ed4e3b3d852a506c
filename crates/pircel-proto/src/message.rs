//! Splitting a decoded line into prefix, command and arguments.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError, Result};
use crate::prefix::Prefix;
use crate::response::normalize_command;

/// A single parsed IRC line.
///
/// The prefix is kept raw (empty when the line had none); use
/// [`Message::source`] for the structured form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Raw prefix without the leading `:`, or empty.
    pub prefix: String,
    /// Command exactly as received (`PRIVMSG`, `001`, ...).
    pub command: String,
    /// Positional arguments, with the trailing argument last.
    pub args: Vec<String>,
}

impl Message {
    /// Parse a decoded line.
    ///
    /// Trailing CR/LF is ignored. The first ` :` after the prefix starts the
    /// trailing argument, which may contain spaces.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim_end_matches(&['\r', '\n'][..]).trim_start();
        if trimmed.trim().is_empty() {
            return Err(invalid(line, MessageParseError::EmptyMessage));
        }

        let (prefix, rest) = match trimmed.strip_prefix(':') {
            Some(with_prefix) => match with_prefix.split_once(' ') {
                Some((prefix, rest)) => (prefix, rest),
                None => return Err(invalid(line, MessageParseError::MissingCommand)),
            },
            None => ("", trimmed),
        };

        let mut args: Vec<String> = match rest.split_once(" :") {
            Some((head, trailing)) => head
                .split_whitespace()
                .map(str::to_string)
                .chain(std::iter::once(trailing.to_string()))
                .collect(),
            None => rest.split_whitespace().map(str::to_string).collect(),
        };

        if args.is_empty() || args[0].is_empty() {
            return Err(invalid(line, MessageParseError::MissingCommand));
        }
        let command = args.remove(0);

        Ok(Self {
            prefix: prefix.to_string(),
            command,
            args,
        })
    }

    /// Build an outgoing message without a prefix.
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            prefix: String::new(),
            command: command.to_string(),
            args,
        }
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Structured prefix, if there was one.
    pub fn source(&self) -> Option<Prefix> {
        Prefix::parse(&self.prefix)
    }

    /// Nick part of the prefix (empty when there is no prefix).
    pub fn source_nick(&self) -> &str {
        crate::prefix::nick_of(&self.prefix)
    }

    /// The symbolic form of the command (`001` becomes `RPL_WELCOME`).
    pub fn symbolic_command(&self) -> Result<Cow<'_, str>> {
        normalize_command(&self.command)
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

fn invalid(line: &str, cause: MessageParseError) -> ProtocolError {
    ProtocolError::InvalidMessage {
        string: line.to_string(),
        cause,
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, ":{} ", self.prefix)?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.args.split_last() {
            for arg in middle {
                write!(f, " {}", arg)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}
