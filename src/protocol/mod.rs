//! The protocol engine.
//!
//! [`Protocol`] owns the session model and the callback registry. Each
//! incoming line is decoded, parsed and normalized, handed to the built-in
//! handler for its command (if any) and then published to user callbacks
//! under its lower-cased symbolic name.
//!
//! Writes never block: they are queued on an unbounded channel that the
//! connection's writer task drains.

mod handlers;

use pircel_proto::{decode, encode, Message, ProtocolError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::callbacks::{CallbackHost, CallbackRegistry, Subscription};
use crate::client::StopHandle;
use crate::error::ClientError;
use crate::session::{Change, Identity, ServerInfo, Session};

use handlers::Context;

/// Trace target that receives every raw line in both directions.
pub const VERBATIM_TARGET: &str = "pircel::verbatim";

/// Sending half of the outgoing line queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one line (without terminator).
    pub fn send(&self, line: String) {
        trace!(target: "pircel::verbatim", ">> {}", line);
        if self.tx.send(line).is_err() {
            debug!("Outbox closed, dropping line");
        }
    }
}

/// The engine: session model, callbacks and outgoing queue for one
/// connection.
pub struct Protocol {
    session: Session,
    callbacks: CallbackRegistry<Protocol>,
    outbox: Outbox,
    stop: StopHandle,
    /// Set while one of our own lines is being dispatched.
    echoing: bool,
}

impl CallbackHost for Protocol {
    fn callbacks(&mut self) -> &mut CallbackRegistry<Self> {
        &mut self.callbacks
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("nick", &self.session.identity().nick)
            .field("registered", &self.session.is_registered())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl Protocol {
    /// Create an engine and the receiving end of its outgoing queue.
    pub fn new(identity: Identity, server: ServerInfo) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbox, rx) = Outbox::channel();
        let protocol = Self {
            session: Session::new(identity, server),
            callbacks: CallbackRegistry::new(),
            outbox,
            stop: StopHandle::new(),
            echoing: false,
        };
        (protocol, rx)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle that ends the connection's run loop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the connection to close after the current line.
    pub fn request_stop(&self) {
        self.stop.stop();
    }

    pub(crate) fn enable_journal(&mut self) {
        self.session.enable_journal();
    }

    pub(crate) fn drain_changes(&mut self) -> Vec<Change> {
        self.session.drain_changes()
    }

    // === Callbacks ===

    /// Call `callback(engine, prefix, args)` for every `event` line.
    pub fn subscribe<F>(&mut self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&mut Protocol, &str, &[String]) + Send + Sync + 'static,
    {
        self.callbacks.subscribe(event, callback)
    }

    /// Like [`Protocol::subscribe`], but only for the next `event` line.
    pub fn subscribe_once<F>(&mut self, event: &str, callback: F) -> Subscription
    where
        F: FnOnce(&mut Protocol, &str, &[String]) + Send + 'static,
    {
        self.callbacks.subscribe_once(event, callback)
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        self.callbacks.unsubscribe(subscription)
    }

    pub fn clear_callbacks(&mut self, event: &str) {
        self.callbacks.clear(event);
    }

    // === Incoming ===

    /// Process one raw frame from the server.
    ///
    /// Unknown numerics are logged and skipped. Undecodable or unparsable
    /// lines and lines a built-in handler rejects come back as errors; the
    /// caller decides whether that ends the connection.
    pub fn handle_line(&mut self, raw: &[u8]) -> Result<(), ClientError> {
        let text = decode(raw)?;
        trace!(target: "pircel::verbatim", "<< {}", text);
        let message = Message::parse(&text)?;
        self.dispatch(&message)
    }

    /// Run built-in handling and user callbacks for a parsed line.
    pub fn dispatch(&mut self, message: &Message) -> Result<(), ClientError> {
        let command = match message.symbolic_command() {
            Ok(command) => command.to_ascii_uppercase(),
            Err(ProtocolError::UnknownNumericCommand(code)) => {
                debug!(%code, prefix = %message.prefix, args = ?message.args, "Unknown numeric, not dispatched");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let builtin = handlers::registry().get(&command);
        match builtin {
            Some(handler) => {
                let mut ctx = Context {
                    session: &mut self.session,
                    outbox: &self.outbox,
                    prefix: &message.prefix,
                };
                handler.handle(&mut ctx, &message.args)?;
            }
            None => trace!(%command, "No built-in handler"),
        }

        let event = command.to_ascii_lowercase();
        let delivered = CallbackRegistry::publish(self, &event, &message.prefix, &message.args);
        if builtin.is_none() && delivered == 0 {
            self.log_unhandled("no handler or callback", message);
        }
        Ok(())
    }

    fn log_unhandled(&self, reason: &str, message: &Message) {
        debug!(
            %reason,
            raw = %message,
            prefix = %message.prefix,
            command = %message.command,
            args = ?message.args,
            "Unhandled line"
        );
    }

    /// Feed a line we sent back through dispatch as if the server had
    /// relayed it, so history and callbacks see our own messages.
    ///
    /// Lines sent by a callback while an echo is being dispatched are not
    /// echoed again, which bounds a callback that answers every message.
    fn echo(&mut self, line: &str) {
        if self.echoing {
            debug!(%line, "Not echoing a line sent from an echo callback");
            return;
        }
        self.echoing = true;
        self.echo_line(line);
        self.echoing = false;
    }

    fn echo_line(&mut self, line: &str) {
        let identity = self.session.identity();
        let echoed = format!(":{}!~{}@localhost {}", identity.nick, identity.username, line);
        let result = Message::parse(&echoed)
            .map_err(ClientError::from)
            .and_then(|message| self.dispatch(&message));
        if let Err(e) = result {
            warn!(error = %e, line = %echoed, "Failed to record own line");
        }
    }

    // === Outgoing ===

    /// Queue a raw line.
    ///
    /// A trailing line ending is dropped. A line with an embedded line break
    /// would reach the server as two commands, so it is refused with a
    /// warning and `false` is returned.
    pub fn send_raw(&mut self, line: &str) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains(['\r', '\n']) {
            warn!(%line, "Refusing raw line with an embedded line break");
            return false;
        }
        self.outbox.send(line.to_string());
        true
    }

    /// Register with the server using the session identity.
    pub fn connect(&mut self) {
        let identity = self.session.identity().clone();
        self.outbox.send(encode::nick(&identity.nick));
        self.outbox.send(encode::user(&identity.username, &identity.realname));
        self.session.register(identity);
    }

    pub fn join(&mut self, channel: &str, key: Option<&str>) {
        debug!(%channel, "Joining channel");
        self.outbox.send(encode::join(channel, key));
    }

    pub fn part(&mut self, channel: &str, reason: Option<&str>) {
        debug!(%channel, "Leaving channel");
        self.outbox.send(encode::part(channel, reason));
    }

    pub fn quit(&mut self, message: &str) {
        self.outbox.send(encode::quit(message));
    }

    pub fn who(&mut self, mask: &str) {
        self.outbox.send(encode::who(mask));
    }

    /// Send a PRIVMSG (one frame per line of `text`) and record it locally.
    ///
    /// The recorded copy is dispatched to `privmsg` callbacks too. A reply a
    /// callback sends from inside that dispatch goes out but is not recorded.
    pub fn send_message(&mut self, target: &str, text: &str) {
        for line in encode::privmsg(target, text) {
            self.outbox.send(line.clone());
            self.echo(&line);
        }
    }

    /// Send a NOTICE (one frame per line of `text`) and record it locally.
    pub fn send_notice(&mut self, target: &str, text: &str) {
        for line in encode::notice(target, text) {
            self.outbox.send(line.clone());
            self.echo(&line);
        }
    }

    pub fn send_ping(&mut self, token: &str) {
        self.session.record_ping(token);
        self.outbox.send(encode::ping(token));
    }

    pub fn pong(&mut self, token: &str) {
        self.outbox.send(encode::pong(token));
    }

    /// Ask for a new nick. The session follows once the server confirms it
    /// with a NICK of its own; before registration the request is the only
    /// confirmation we get until RPL_WELCOME.
    pub fn change_nick(&mut self, nick: &str) {
        if !self.session.is_registered() {
            self.session.set_requested_nick(nick);
        }
        self.outbox.send(encode::nick(nick));
    }
}
