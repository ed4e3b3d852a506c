//! Records kept by the session model.

use chrono::{DateTime, Utc};
use std::fmt;

/// Stable identifier of a [`User`] within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

/// Stable identifier of a [`Buffer`] within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Who we are on the network. Only the nick ever changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nick: String,
    pub username: String,
    pub realname: String,
}

impl Identity {
    pub fn new(nick: &str, username: &str, realname: &str) -> Self {
        Self {
            nick: nick.to_string(),
            username: username.to_string(),
            realname: realname.to_string(),
        }
    }
}

/// Where the session is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ServerInfo {
    pub fn new(host: &str, port: u16, secure: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            secure,
        }
    }
}

/// A remote (or our own) participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub nick: String,
    pub username: Option<String>,
    pub host: Option<String>,
    /// Whether this record still holds `nick`. A record loses its slot when
    /// the user quits or another record takes the nick over.
    pub current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Messages from the server itself.
    Server,
    Channel,
    /// Private conversation with one user.
    Query,
}

impl BufferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Channel => "channel",
            Self::Query => "query",
        }
    }
}

/// A named conversation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub id: BufferId,
    /// Name as first seen; lookups are case-folded.
    pub name: String,
    pub kind: BufferKind,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Message,
    Notice,
    /// CTCP ACTION (`/me`).
    Action,
    Join,
    Part,
    Kick,
    Quit,
    Nick,
    Topic,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Action => "action",
            Self::Join => "join",
            Self::Part => "part",
            Self::Kick => "kick",
            Self::Quit => "quit",
            Self::Nick => "nick",
            Self::Topic => "topic",
        }
    }
}

/// One history entry. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub buffer: BufferId,
    /// `None` for server-originated lines.
    pub sender: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub kind: LineKind,
    pub body: String,
}

/// A mutation of the model, as handed to persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// New or updated user record.
    User(User),
    /// New or updated buffer record.
    Buffer(Buffer),
    MembershipAdded { user: UserId, buffer: BufferId },
    MembershipRemoved { user: UserId, buffer: BufferId },
    Line(Line),
}
