//! pircel - a small IRC bot on top of the pircel engine.
//!
//! Connects with the settings from a TOML file, joins the configured
//! channels and logs every message it sees.

use pircel::config::Config;
use pircel::db::Database;
use pircel::{Client, Protocol};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn log_message(protocol: &mut Protocol, prefix: &str, args: &[String]) {
    let (Some(target), Some(text)) = (args.first(), args.get(1)) else {
        return;
    };
    let nick = pircel_proto::prefix::nick_of(prefix);
    if protocol.session().is_me(nick) {
        return;
    }
    info!(target: "pircel::bot", channel = %target, %nick, "{}", text);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pircel.toml".to_string());

    let config = Config::load(&config_path)?;

    let default_level = if config.behavior.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();

    info!(
        server = %config.server.host,
        port = config.server.port,
        nick = %config.identity.nick,
        channels = ?config.channels,
        "Starting pircel"
    );

    let database = match &config.database {
        Some(db) => Some(Database::new(&db.path).await?),
        None => None,
    };

    let mut client = Client::new(config);
    if let Some(database) = database {
        client = client.with_database(database);
    }

    client.protocol_mut().subscribe("privmsg", log_message);

    let stop = client.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            stop.stop();
        }
    });

    if let Err(e) = client.run().await {
        error!(error = %e, "Connection ended");
        return Err(e.into());
    }
    Ok(())
}
