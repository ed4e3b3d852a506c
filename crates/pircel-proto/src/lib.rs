//! # pircel-proto
//!
//! The line codec under the pircel client engine: turning raw frames from an
//! IRC server into `(prefix, command, args)` and building the lines a client
//! sends back.
//!
//! ## Features
//!
//! - Best-effort decoding: UTF-8 first, detected legacy charsets second
//! - Line splitting with prefix and trailing-argument handling
//! - Numeric reply table (`001` ⇄ `RPL_WELCOME`)
//! - Command builders with newline-safe PRIVMSG/NOTICE splitting
//! - Optional Tokio integration: line framing and TCP/TLS connectors
//!
//! ## Quick Start
//!
//! ```rust
//! use pircel_proto::{decode, Message};
//!
//! let raw = b":nick!user@host PRIVMSG #chan :hello there";
//! let text = decode(raw).expect("valid line");
//! let msg = Message::parse(&text).expect("parsable line");
//!
//! assert_eq!(msg.prefix, "nick!user@host");
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.args, vec!["#chan", "hello there"]);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod decode;
pub mod encode;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;
pub mod response;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::casemap::{irc_eq, irc_to_lower, is_channel_name};
pub use self::decode::decode;
pub use self::error::{MessageParseError, ProtocolError};
pub use self::message::Message;
pub use self::prefix::Prefix;
pub use self::response::{normalize_command, Response};

#[cfg(feature = "tokio")]
pub use self::line::{Frame, LineCodec, MAX_IRC_LINE_LEN};
#[cfg(feature = "tokio")]
pub use self::transport::{BoxedStream, Connector, LineTransport, TcpConnector};
