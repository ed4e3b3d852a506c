//! Connection lifecycle.
//!
//! [`Client`] drives one connection through
//! `Disconnected → Connecting → AwaitingWelcome → Registered → Closed`:
//! it opens the transport, registers, joins the configured channels once
//! the server welcomes us, sends keepalive PINGs and shuts everything down
//! on request or when the transport fails. There is no reconnect.
//!
//! A single task owns the [`Protocol`]. Incoming lines, keepalive ticks and
//! stop requests are multiplexed in one `select!`, so one line is fully
//! dispatched before the next event is looked at. Outgoing lines go through
//! the engine's outbox to a separate writer task that owns the socket's
//! write half; if that task fails, the run loop closes with its error.

use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use pircel_proto::transport::framed;
use pircel_proto::{Connector, Frame, LineTransport, ProtocolError, TcpConnector};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, ErrorPolicy};
use crate::db::{Database, DatabaseWriter};
use crate::error::ClientError;
use crate::protocol::Protocol;
use crate::session::{Identity, ServerInfo};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// NICK/USER sent, waiting for RPL_WELCOME.
    AwaitingWelcome,
    Registered,
    Closed,
}

/// Cloneable handle that ends a connection's run loop.
///
/// Stopping is idempotent and may happen before the loop even starts.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

type WriterTask = JoinHandle<Result<(), ProtocolError>>;

enum Event<F> {
    Stop,
    Keepalive,
    WriterDone(Result<Result<(), ProtocolError>, JoinError>),
    Frame(Option<F>),
}

/// One IRC connection.
pub struct Client {
    config: Config,
    protocol: Protocol,
    outbox: Option<mpsc::UnboundedReceiver<String>>,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    database: Option<Database>,
}

impl Client {
    /// Client connecting over plain TCP or TLS.
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    /// Client using a custom transport.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        let identity = Identity::new(
            &config.identity.nick,
            &config.identity.username,
            &config.identity.realname,
        );
        let server = ServerInfo::new(&config.server.host, config.server.port, config.server.secure);
        let (protocol, outbox) = Protocol::new(identity, server);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            protocol,
            outbox: Some(outbox),
            connector,
            state,
            database: None,
        }
    }

    /// Persist the session into `database` while running.
    #[must_use]
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The engine, for subscribing callbacks before [`Client::run`].
    pub fn protocol_mut(&mut self) -> &mut Protocol {
        &mut self.protocol
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.protocol.stop_handle()
    }

    /// Watch lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "Connection state");
        self.state.send_replace(state);
    }

    /// Connect and process lines until stopped or the connection fails.
    ///
    /// Returns `Ok(())` after a requested stop. A client runs once.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let outbox = self.outbox.take().ok_or(ClientError::AlreadyStarted)?;
        let result = self.run_connection(outbox).await;
        self.set_state(ConnectionState::Closed);
        match &result {
            Ok(()) => info!("Connection closed"),
            Err(e) => warn!(error = %e, code = e.error_code(), "Connection failed"),
        }
        result
    }

    async fn run_connection(&mut self, outbox: mpsc::UnboundedReceiver<String>) -> Result<(), ClientError> {
        let stop = self.protocol.stop_handle();
        let mut stop_rx = stop.subscribe();

        let writer = match &self.database {
            Some(db) => {
                let session = self.protocol.session();
                let server_id = db
                    .sessions()
                    .create_server(session.server(), session.identity())
                    .await?;
                self.protocol.enable_journal();
                Some(DatabaseWriter::new(db.clone(), server_id))
            }
            None => None,
        };

        for channel in &self.config.channels {
            let channel = channel.clone();
            self.protocol.subscribe_once("rpl_welcome", move |protocol, _, _| {
                protocol.join(&channel, None);
            });
        }

        let server = &self.config.server;
        self.set_state(ConnectionState::Connecting);
        info!(host = %server.host, port = server.port, secure = server.secure, "Connecting");
        let stream = self
            .connector
            .connect(&server.host, server.port, server.secure)
            .await?;

        let (sink, mut lines) = framed(stream).split();
        let mut writer_task: Option<WriterTask> =
            Some(tokio::spawn(write_loop(sink, outbox, stop.subscribe())));

        self.protocol.connect();
        self.set_state(ConnectionState::AwaitingWelcome);

        let period = self.config.behavior.keepalive();
        let policy = self.config.behavior.error_policy;
        let mut keepalive: Option<Interval> = None;

        let result = loop {
            if stop.is_stopped() {
                break Ok(());
            }

            let event = tokio::select! {
                biased;
                _ = stop_rx.changed() => Event::Stop,
                _ = tick(&mut keepalive) => Event::Keepalive,
                done = join_writer(&mut writer_task) => Event::WriterDone(done),
                frame = lines.next() => Event::Frame(frame),
            };

            match event {
                Event::Stop => {}
                Event::Keepalive => {
                    let token = Utc::now().timestamp().to_string();
                    self.protocol.send_ping(&token);
                }
                Event::WriterDone(done) => {
                    writer_task = None;
                    break match done {
                        Ok(Err(e)) => Err(ClientError::from_transport(e)),
                        Err(e) => Err(ClientError::Transport(std::io::Error::other(e))),
                        Ok(Ok(())) if stop.is_stopped() => Ok(()),
                        Ok(Ok(())) => Err(ClientError::ClosedByPeer),
                    };
                }
                Event::Frame(Some(Ok(frame))) => {
                    let handled = match frame {
                        Frame::Line(raw) => self.protocol.handle_line(&raw),
                        Frame::TooLong { actual, limit } => {
                            Err(ProtocolError::MessageTooLong { actual, limit }.into())
                        }
                    };
                    if let Err(e) = handled {
                        match policy {
                            ErrorPolicy::Log => {
                                warn!(error = %e, code = e.error_code(), "Dropping line");
                            }
                            ErrorPolicy::Terminate => break Err(e),
                        }
                    }
                    if keepalive.is_none() && self.protocol.session().is_registered() {
                        self.set_state(ConnectionState::Registered);
                        let mut interval = interval_at(Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        keepalive = Some(interval);
                    }
                }
                Event::Frame(Some(Err(e))) => break Err(ClientError::from_transport(e)),
                Event::Frame(None) => {
                    break if stop.is_stopped() {
                        Ok(())
                    } else {
                        Err(ClientError::ClosedByPeer)
                    };
                }
            }

            if let Some(writer) = &writer {
                for change in self.protocol.drain_changes() {
                    writer.write(change).await;
                }
            }
        };

        // Lets the writer flush what is queued and close the socket.
        stop.stop();
        if let Some(task) = writer_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Writer closed with error"),
                Err(e) => warn!(error = %e, "Writer task failed"),
            }
        }

        if let Some(writer) = writer {
            for change in self.protocol.drain_changes() {
                writer.write(change).await;
            }
            writer.shutdown().await;
        }

        result
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn join_writer(
    task: &mut Option<WriterTask>,
) -> Result<Result<(), ProtocolError>, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn write_loop(
    mut sink: SplitSink<LineTransport, String>,
    mut outbox: mpsc::UnboundedReceiver<String>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ProtocolError> {
    loop {
        tokio::select! {
            biased;
            line = outbox.recv() => match line {
                Some(line) => sink.send(line).await?,
                None => break,
            },
            _ = stop.changed() => {
                while let Ok(line) = outbox.try_recv() {
                    sink.feed(line).await?;
                }
                break;
            }
        }
    }
    sink.close().await
}
