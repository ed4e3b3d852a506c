//! Built-in handlers.
//!
//! These keep the session model in step with the server and answer the
//! lines a client must answer (PING). They run before any user callback for
//! the same line. The table is built once and keyed by upper-case symbolic
//! command.

use std::collections::HashMap;
use std::sync::OnceLock;

use pircel_proto::{encode, Prefix};
use tracing::{debug, info};

use super::Outbox;
use crate::error::{require_args, HandlerError, HandlerResult};
use crate::session::Session;

/// What a handler gets to work with for one line.
pub(crate) struct Context<'a> {
    pub session: &'a mut Session,
    pub outbox: &'a Outbox,
    /// Raw prefix of the line (may be empty).
    pub prefix: &'a str,
}

impl Context<'_> {
    /// The line's source as a user, or `MissingPrefix`.
    fn source(&self, command: &'static str) -> Result<Prefix, HandlerError> {
        Prefix::parse(self.prefix).ok_or(HandlerError::MissingPrefix { command })
    }
}

pub(crate) trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult;
}

pub(crate) struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Connection upkeep
        handlers.insert("PING", Box::new(PingHandler));
        handlers.insert("PONG", Box::new(PongHandler));

        // Registration
        handlers.insert("RPL_WELCOME", Box::new(WelcomeHandler));
        handlers.insert("ERR_NICKNAMEINUSE", Box::new(NickInUseHandler));
        handlers.insert("RPL_MOTD", Box::new(MotdHandler));
        handlers.insert("RPL_ENDOFMOTD", Box::new(EndOfMotdHandler));
        handlers.insert("ERR_NOMOTD", Box::new(EndOfMotdHandler));

        // Channel membership
        handlers.insert("JOIN", Box::new(JoinHandler));
        handlers.insert("PART", Box::new(PartHandler));
        handlers.insert("KICK", Box::new(KickHandler));
        handlers.insert("QUIT", Box::new(QuitHandler));
        handlers.insert("NICK", Box::new(NickHandler));
        handlers.insert("RPL_NAMREPLY", Box::new(NamesHandler));

        // Messages and topics
        handlers.insert("PRIVMSG", Box::new(MessageHandler { notice: false }));
        handlers.insert("NOTICE", Box::new(MessageHandler { notice: true }));
        handlers.insert("TOPIC", Box::new(TopicHandler));
        handlers.insert("RPL_TOPIC", Box::new(TopicReplyHandler));

        Self { handlers }
    }

    /// Look up the handler for a symbolic command.
    pub fn get(&self, command: &str) -> Option<&dyn Handler> {
        self.handlers
            .get(command.to_ascii_uppercase().as_str())
            .map(|h| h.as_ref())
    }
}

/// The process-wide handler table.
pub(crate) fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

// ============================================================================
// Connection upkeep
// ============================================================================

struct PingHandler;

impl Handler for PingHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("PING", args, 1)?;
        let token = &args[args.len() - 1];
        ctx.outbox.send(encode::pong(token));
        Ok(())
    }
}

struct PongHandler;

impl Handler for PongHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("PONG", args, 1)?;
        ctx.session.record_pong(&args[args.len() - 1]);
        Ok(())
    }
}

// ============================================================================
// Registration
// ============================================================================

struct WelcomeHandler;

impl Handler for WelcomeHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        let nick = args.first().map(String::as_str).unwrap_or_default();
        ctx.session.welcome(nick);
        info!(nick = %ctx.session.identity().nick, server = %ctx.prefix, "Registered");
        Ok(())
    }
}

/// Before registration a taken nick gets `_` appended and is tried again.
/// Afterwards it only means a `change_nick` was refused.
struct NickInUseHandler;

impl Handler for NickInUseHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        if ctx.session.is_registered() {
            debug!(nick = args.get(1).map(String::as_str).unwrap_or_default(), "Nick change refused");
            return Ok(());
        }
        let retry = format!("{}_", ctx.session.identity().nick);
        info!(nick = %retry, "Nick in use, retrying");
        ctx.session.set_requested_nick(&retry);
        ctx.outbox.send(encode::nick(&retry));
        Ok(())
    }
}

struct MotdHandler;

impl Handler for MotdHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("RPL_MOTD", args, 1)?;
        ctx.session.motd_line(&args[args.len() - 1]);
        Ok(())
    }
}

struct EndOfMotdHandler;

impl Handler for EndOfMotdHandler {
    fn handle(&self, ctx: &mut Context<'_>, _args: &[String]) -> HandlerResult {
        ctx.session.end_of_motd();
        Ok(())
    }
}

// ============================================================================
// Channel membership
// ============================================================================

struct JoinHandler;

impl Handler for JoinHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("JOIN", args, 1)?;
        let source = ctx.source("JOIN")?;
        for channel in args[0].split(',').filter(|c| !c.is_empty()) {
            ctx.session.join(&source, channel);
        }
        Ok(())
    }
}

struct PartHandler;

impl Handler for PartHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("PART", args, 1)?;
        let source = ctx.source("PART")?;
        let reason = args.get(1).map(String::as_str);
        for channel in args[0].split(',').filter(|c| !c.is_empty()) {
            ctx.session.part(&source, channel, reason);
        }
        Ok(())
    }
}

struct KickHandler;

impl Handler for KickHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("KICK", args, 2)?;
        let kicker = Prefix::parse(ctx.prefix);
        let reason = args.get(2).map(String::as_str);
        ctx.session.kick(kicker.as_ref(), &args[0], &args[1], reason);
        Ok(())
    }
}

struct QuitHandler;

impl Handler for QuitHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        let source = ctx.source("QUIT")?;
        let reason = args.first().map(String::as_str).unwrap_or_default();
        ctx.session.quit(&source.nick, reason);
        Ok(())
    }
}

struct NickHandler;

impl Handler for NickHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("NICK", args, 1)?;
        let source = ctx.source("NICK")?;
        ctx.session.rename(&source.nick, &args[0]);
        Ok(())
    }
}

/// `RPL_NAMREPLY <me> [<symbol>] <channel> :<names>`; some servers leave
/// out the channel symbol, so the channel is read from the end.
struct NamesHandler;

impl Handler for NamesHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("RPL_NAMREPLY", args, 3)?;
        let channel = &args[args.len() - 2];
        let names = &args[args.len() - 1];
        ctx.session.names(channel, names);
        Ok(())
    }
}

// ============================================================================
// Messages and topics
// ============================================================================

struct MessageHandler {
    notice: bool,
}

impl Handler for MessageHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        let command = if self.notice { "NOTICE" } else { "PRIVMSG" };
        require_args(command, args, 2)?;
        let sender = Prefix::parse(ctx.prefix);
        ctx.session
            .message(sender.as_ref(), &args[0], &args[1], self.notice);
        Ok(())
    }
}

struct TopicHandler;

impl Handler for TopicHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("TOPIC", args, 2)?;
        let setter = ctx.source("TOPIC")?;
        ctx.session.set_topic(&args[0], &args[1], Some(&setter));
        Ok(())
    }
}

/// `RPL_TOPIC <me> <channel> :<topic>`
struct TopicReplyHandler;

impl Handler for TopicReplyHandler {
    fn handle(&self, ctx: &mut Context<'_>, args: &[String]) -> HandlerResult {
        require_args("RPL_TOPIC", args, 3)?;
        ctx.session.set_topic(&args[1], &args[2], None);
        Ok(())
    }
}
