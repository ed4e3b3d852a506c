//! Message prefixes.
//!
//! The prefix identifies where a line came from: either a bare server name /
//! nick, or a full `nick!user@host` mask.

use std::fmt;

/// Parsed origin of a line.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Prefix {
    /// Nickname, or the server name for server-originated lines.
    pub nick: String,
    /// Username with any leading `~` (no ident response) removed.
    pub username: Option<String>,
    /// Hostname or cloak.
    pub host: Option<String>,
}

impl Prefix {
    /// Parse a raw prefix (without the leading `:`).
    ///
    /// Returns `None` for the empty prefix. This never fails otherwise:
    /// anything without `!` is treated as a nick-only (or server) prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.strip_prefix(':').unwrap_or(raw);
        if raw.is_empty() {
            return None;
        }

        let (nick, rest) = match raw.split_once('!') {
            Some((nick, rest)) => (nick, Some(rest)),
            None => (raw, None),
        };

        let (username, host) = match rest {
            Some(rest) => match rest.split_once('@') {
                Some((user, host)) => (Some(user), Some(host)),
                None => (Some(rest), None),
            },
            // `nick@host` without a user part
            None => match nick.split_once('@') {
                Some((n, host)) => return Some(Self::from_parts(n, None, Some(host))),
                None => (None, None),
            },
        };

        Some(Self::from_parts(nick, username, host))
    }

    fn from_parts(nick: &str, username: Option<&str>, host: Option<&str>) -> Self {
        Self {
            nick: nick.to_string(),
            username: username.map(|u| u.strip_prefix('~').unwrap_or(u).to_string()),
            host: host.map(str::to_string),
        }
    }

    /// Build a full user prefix.
    pub fn new(nick: &str, username: &str, host: &str) -> Self {
        Self::from_parts(nick, Some(username), Some(host))
    }

    /// Whether this looks like a server rather than a user.
    pub fn is_server(&self) -> bool {
        self.username.is_none() && self.host.is_none() && self.nick.contains('.')
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if let Some(user) = &self.username {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

/// Extract just the nick from a raw prefix; empty for the empty prefix.
pub fn nick_of(raw: &str) -> &str {
    let raw = raw.strip_prefix(':').unwrap_or(raw);
    let end = raw.find(|c: char| c == '!' || c == '@').unwrap_or(raw.len());
    &raw[..end]
}
