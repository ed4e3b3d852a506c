//! Integration test common infrastructure.
//!
//! Provides an in-memory connector so a [`pircel::Client`] can be driven
//! against a scripted server without touching the network.

pub mod connector;
pub mod server;

#[allow(unused_imports)]
pub use connector::MockConnector;
#[allow(unused_imports)]
pub use server::TestServer;

use pircel::config::Config;
use pircel::ConnectionState;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Minimal config for `nick`, joining `channels` after the welcome.
#[allow(dead_code)]
pub fn test_config(nick: &str, channels: &[&str], extra: &str) -> Config {
    let channels: Vec<String> = channels.iter().map(|c| format!("{:?}", c)).collect();
    let raw = format!(
        r#"
channels = [{}]

[server]
host = "irc.test"

[identity]
nick = "{nick}"
username = "{nick}"
realname = "{nick}"

{}
"#,
        channels.join(", "),
        extra,
        nick = nick,
    );
    raw.parse().expect("valid test config")
}

/// Wait until the client reports `wanted`.
#[allow(dead_code)]
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, wanted: ConnectionState) {
    timeout(Duration::from_secs(120), async {
        while *rx.borrow_and_update() != wanted {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("state transition timed out");
    assert_eq!(*rx.borrow(), wanted);
}
