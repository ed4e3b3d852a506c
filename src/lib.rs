//! # pircel
//!
//! A callback-driven IRC client engine. Raw lines from a server are decoded
//! and parsed by [`pircel_proto`], applied to a [`session::Session`] that
//! tracks users, buffers, memberships and history, and then published to
//! host callbacks keyed by lower-cased symbolic command name.
//!
//! [`Client`] adds the connection lifecycle on top: registration, autojoin,
//! keepalive and shutdown.
//!
//! ```no_run
//! use pircel::{config::Config, Client};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::load("pircel.toml")?;
//! let mut client = Client::new(config);
//! client.protocol_mut().subscribe("privmsg", |protocol, prefix, args| {
//!     if args.get(1).map(String::as_str) == Some("!hello") {
//!         let nick = pircel_proto::prefix::nick_of(prefix).to_string();
//!         protocol.send_message(&args[0], &format!("hello, {}", nick));
//!     }
//! });
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod session;

pub use callbacks::{CallbackRegistry, Subscription};
pub use client::{Client, ConnectionState, StopHandle};
pub use error::{ClientError, HandlerError};
pub use protocol::Protocol;
