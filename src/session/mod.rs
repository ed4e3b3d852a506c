//! The session model: everything we know about one server connection.
//!
//! Users and buffers are created lazily the first time a line mentions
//! them and are never removed; only memberships come and go. Lookups by
//! nick or buffer name are RFC 1459 case-folded.
//!
//! Invariant: at most one user record with `current == true` holds a given
//! folded nick. The nick index only ever points at that record.
//!
//! Every transition here is total. Redundant or out-of-order events (a
//! second JOIN, a PART for a channel we never saw, a nick reclaimed twice)
//! leave the model consistent and never fail.

mod types;

pub use types::{
    Buffer, BufferId, BufferKind, Change, Identity, Line, LineKind, ServerInfo, User, UserId,
};

use chrono::Utc;
use pircel_proto::{irc_eq, irc_to_lower, is_channel_name, Prefix};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Mode prefixes a server may put in front of nicks in RPL_NAMREPLY.
const NAMES_MODE_PREFIXES: &[char] = &['~', '&', '@', '%', '+'];

const ACTION_PREFIX: &str = "\u{1}ACTION ";

#[derive(Debug)]
pub struct Session {
    identity: Identity,
    server: ServerInfo,
    registered: bool,

    motd: Vec<String>,
    motd_complete: bool,
    last_ping: Option<String>,
    last_pong: Option<String>,

    users: Vec<User>,
    /// Folded nick -> current holder.
    nicks: HashMap<String, UserId>,
    buffers: Vec<Buffer>,
    /// Folded name -> buffer.
    buffer_names: HashMap<String, BufferId>,
    memberships: BTreeSet<(UserId, BufferId)>,
    lines: Vec<Line>,

    journal: Option<Vec<Change>>,
}

impl Session {
    pub fn new(identity: Identity, server: ServerInfo) -> Self {
        Self {
            identity,
            server,
            registered: false,
            motd: Vec::new(),
            motd_complete: false,
            last_ping: None,
            last_pong: None,
            users: Vec::new(),
            nicks: HashMap::new(),
            buffers: Vec::new(),
            buffer_names: HashMap::new(),
            memberships: BTreeSet::new(),
            lines: Vec::new(),
            journal: None,
        }
    }

    // === Queries ===

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Whether `nick` is our own current nick.
    pub fn is_me(&self, nick: &str) -> bool {
        irc_eq(nick, &self.identity.nick)
    }

    /// Our own user record, once a line has mentioned us.
    pub fn me(&self) -> Option<&User> {
        self.find_user_by_nick(&self.identity.nick)
    }

    /// Full MOTD text, or `None` until RPL_ENDOFMOTD arrived.
    pub fn motd(&self) -> Option<String> {
        self.motd_complete.then(|| self.motd.join("\n"))
    }

    pub fn last_ping(&self) -> Option<&str> {
        self.last_ping.as_deref()
    }

    pub fn last_pong(&self) -> Option<&str> {
        self.last_pong.as_deref()
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(id.0 as usize)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id.0 as usize)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    /// The user currently holding `nick`.
    pub fn find_user_by_nick(&self, nick: &str) -> Option<&User> {
        self.nicks
            .get(&irc_to_lower(nick))
            .and_then(|id| self.user(*id))
    }

    pub fn find_buffer_by_name(&self, name: &str) -> Option<&Buffer> {
        self.buffer_names
            .get(&irc_to_lower(name))
            .and_then(|id| self.buffer(*id))
    }

    pub fn is_member(&self, user: UserId, buffer: BufferId) -> bool {
        self.memberships.contains(&(user, buffer))
    }

    /// Users presently in `buffer`.
    pub fn members(&self, buffer: BufferId) -> Vec<UserId> {
        self.memberships
            .iter()
            .filter(|(_, b)| *b == buffer)
            .map(|(u, _)| *u)
            .collect()
    }

    /// Buffers `user` is presently in.
    pub fn buffers_of(&self, user: UserId) -> Vec<BufferId> {
        self.memberships
            .range((user, BufferId(0))..=(user, BufferId(u64::MAX)))
            .map(|(_, b)| *b)
            .collect()
    }

    pub fn membership_count(&self) -> usize {
        self.memberships.len()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn lines_for(&self, buffer: BufferId) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(move |line| line.buffer == buffer)
    }

    // === Journal ===

    /// Start recording every mutation for [`Session::drain_changes`].
    pub fn enable_journal(&mut self) {
        self.journal.get_or_insert_with(Vec::new);
    }

    /// Take the mutations recorded since the last call.
    pub fn drain_changes(&mut self) -> Vec<Change> {
        self.journal
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn record(&mut self, change: Change) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(change);
        }
    }

    fn touch_user(&mut self, id: UserId) {
        if self.journal.is_some()
            && let Some(user) = self.user(id).cloned()
        {
            self.record(Change::User(user));
        }
    }

    fn touch_buffer(&mut self, id: BufferId) {
        if self.journal.is_some()
            && let Some(buffer) = self.buffer(id).cloned()
        {
            self.record(Change::Buffer(buffer));
        }
    }

    // === Registration ===

    /// NICK/USER were sent with `identity`.
    pub fn register(&mut self, identity: Identity) {
        debug!(nick = %identity.nick, "Registering");
        self.identity = identity;
    }

    /// Replace the nick we are asking the server for. Only valid before
    /// registration completes; afterwards the server's NICK echo decides.
    pub fn set_requested_nick(&mut self, nick: &str) {
        self.identity.nick = nick.to_string();
    }

    /// RPL_WELCOME: registration is complete and `nick` is confirmed.
    pub fn welcome(&mut self, nick: &str) {
        self.registered = true;
        if !nick.is_empty() && nick != "*" {
            self.identity.nick = nick.to_string();
        }
    }

    pub fn motd_line(&mut self, text: &str) {
        if self.motd_complete {
            self.motd.clear();
            self.motd_complete = false;
        }
        self.motd.push(text.to_string());
    }

    pub fn end_of_motd(&mut self) {
        self.motd_complete = true;
    }

    pub fn record_ping(&mut self, token: &str) {
        self.last_ping = Some(token.to_string());
    }

    pub fn record_pong(&mut self, token: &str) {
        self.last_pong = Some(token.to_string());
    }

    // === Entity resolution ===

    /// Find or create the user a prefix refers to.
    pub fn resolve_prefix(&mut self, prefix: &Prefix) -> UserId {
        self.resolve(
            &prefix.nick,
            prefix.username.as_deref(),
            prefix.host.as_deref(),
        )
    }

    /// Find or create the user for `nick`.
    ///
    /// The current holder wins; otherwise the most recent record that used
    /// to hold the nick is revived; otherwise a new record is created.
    /// Missing username/host fields are filled in, known ones are kept.
    pub fn resolve(&mut self, nick: &str, username: Option<&str>, host: Option<&str>) -> UserId {
        let key = irc_to_lower(nick);

        if let Some(&id) = self.nicks.get(&key) {
            if self.fill_user(id, username, host) {
                self.touch_user(id);
            }
            return id;
        }

        let stale = self
            .users
            .iter()
            .rev()
            .find(|user| !user.current && irc_eq(&user.nick, nick))
            .map(|user| user.id);
        if let Some(id) = stale {
            trace!(%nick, user = %id, "Reviving user record");
            self.fill_user(id, username, host);
            if let Some(user) = self.users.get_mut(id.0 as usize) {
                user.current = true;
            }
            self.nicks.insert(key, id);
            self.touch_user(id);
            return id;
        }

        let id = UserId(self.users.len() as u64);
        self.users.push(User {
            id,
            nick: nick.to_string(),
            username: username.map(str::to_string),
            host: host.map(str::to_string),
            current: true,
        });
        self.nicks.insert(key, id);
        self.touch_user(id);
        id
    }

    fn fill_user(&mut self, id: UserId, username: Option<&str>, host: Option<&str>) -> bool {
        let Some(user) = self.users.get_mut(id.0 as usize) else {
            return false;
        };
        let mut changed = false;
        if user.username.is_none()
            && let Some(username) = username
        {
            user.username = Some(username.to_string());
            changed = true;
        }
        if user.host.is_none()
            && let Some(host) = host
        {
            user.host = Some(host.to_string());
            changed = true;
        }
        changed
    }

    /// Find or create the buffer called `name`.
    pub fn buffer_for(&mut self, name: &str) -> BufferId {
        let kind = if is_channel_name(name) {
            BufferKind::Channel
        } else {
            BufferKind::Query
        };
        self.buffer_of_kind(name, kind)
    }

    /// The buffer holding server-originated lines.
    pub fn server_buffer(&mut self) -> BufferId {
        let host = self.server.host.clone();
        self.buffer_of_kind(&host, BufferKind::Server)
    }

    fn buffer_of_kind(&mut self, name: &str, kind: BufferKind) -> BufferId {
        let key = irc_to_lower(name);
        if let Some(&id) = self.buffer_names.get(&key) {
            return id;
        }
        let id = BufferId(self.buffers.len() as u64);
        self.buffers.push(Buffer {
            id,
            name: name.to_string(),
            kind,
            topic: None,
        });
        self.buffer_names.insert(key, id);
        self.touch_buffer(id);
        id
    }

    fn add_membership(&mut self, user: UserId, buffer: BufferId) -> bool {
        let added = self.memberships.insert((user, buffer));
        if added {
            self.record(Change::MembershipAdded { user, buffer });
        }
        added
    }

    fn remove_membership(&mut self, user: UserId, buffer: BufferId) -> bool {
        let removed = self.memberships.remove(&(user, buffer));
        if removed {
            self.record(Change::MembershipRemoved { user, buffer });
        }
        removed
    }

    fn append_line(&mut self, buffer: BufferId, sender: Option<UserId>, kind: LineKind, body: &str) {
        let line = Line {
            buffer,
            sender,
            timestamp: Utc::now(),
            kind,
            body: body.to_string(),
        };
        self.record(Change::Line(line.clone()));
        self.lines.push(line);
    }

    /// Take `id` out of the nick index and drop every membership it holds.
    fn retire(&mut self, id: UserId) {
        let Some(user) = self.users.get_mut(id.0 as usize) else {
            return;
        };
        if !user.current {
            return;
        }
        user.current = false;
        let key = irc_to_lower(&user.nick);
        if self.nicks.get(&key) == Some(&id) {
            self.nicks.remove(&key);
        }
        for buffer in self.buffers_of(id) {
            self.remove_membership(id, buffer);
        }
        self.touch_user(id);
    }

    // === Transitions driven by server lines ===

    /// `prefix` joined `channel`.
    pub fn join(&mut self, prefix: &Prefix, channel: &str) -> (UserId, BufferId) {
        let user = self.resolve_prefix(prefix);
        let buffer = self.buffer_for(channel);
        if self.add_membership(user, buffer) {
            self.append_line(buffer, Some(user), LineKind::Join, "");
        }
        (user, buffer)
    }

    /// `prefix` left `channel`. Unknown channels are ignored.
    pub fn part(&mut self, prefix: &Prefix, channel: &str, reason: Option<&str>) {
        let Some(buffer) = self.find_buffer_by_name(channel).map(|b| b.id) else {
            trace!(%channel, "PART for unknown buffer");
            return;
        };
        let user = self.resolve_prefix(prefix);
        if self.remove_membership(user, buffer) {
            self.append_line(buffer, Some(user), LineKind::Part, reason.unwrap_or(""));
        }
    }

    /// `target` was removed from `channel`, by `kicker` if it is a user.
    pub fn kick(&mut self, kicker: Option<&Prefix>, channel: &str, target: &str, reason: Option<&str>) {
        let Some(buffer) = self.find_buffer_by_name(channel).map(|b| b.id) else {
            trace!(%channel, "KICK for unknown buffer");
            return;
        };
        let Some(kicked) = self.find_user_by_nick(target).map(|u| u.id) else {
            return;
        };
        let sender = kicker
            .filter(|p| !p.is_server())
            .map(|p| self.resolve_prefix(p));
        if self.remove_membership(kicked, buffer) {
            let body = match reason {
                Some(reason) if !reason.is_empty() => format!("{}: {}", target, reason),
                _ => target.to_string(),
            };
            self.append_line(buffer, sender, LineKind::Kick, &body);
        }
    }

    /// `nick` disconnected: every membership goes, the record stays.
    pub fn quit(&mut self, nick: &str, reason: &str) {
        let Some(id) = self.find_user_by_nick(nick).map(|u| u.id) else {
            trace!(%nick, "QUIT from unknown user");
            return;
        };
        for buffer in self.buffers_of(id) {
            self.append_line(buffer, Some(id), LineKind::Quit, reason);
        }
        self.retire(id);
    }

    /// `old` is now known as `new`.
    ///
    /// The user who held `old` keeps its id. If a different record still
    /// held `new`, that record loses the nick and its memberships; no second
    /// record is created. If nobody held `old`, `new` is simply resolved.
    pub fn rename(&mut self, old: &str, new: &str) -> UserId {
        if self.is_me(old) {
            debug!(%old, %new, "Own nick changed");
            self.identity.nick = new.to_string();
        }

        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);

        let Some(mover) = self.nicks.get(&old_key).copied() else {
            return self.resolve(new, None, None);
        };

        if let Some(&holder) = self.nicks.get(&new_key)
            && holder != mover
        {
            debug!(nick = %new, stale = %holder, user = %mover, "Nick taken over from stale record");
            self.retire(holder);
        }

        self.nicks.remove(&old_key);
        if let Some(user) = self.users.get_mut(mover.0 as usize) {
            user.nick = new.to_string();
        }
        self.nicks.insert(new_key, mover);
        self.touch_user(mover);

        for buffer in self.buffers_of(mover) {
            self.append_line(buffer, Some(mover), LineKind::Nick, new);
        }
        mover
    }

    /// PRIVMSG or NOTICE from `sender` to `target`.
    ///
    /// Lines addressed to our own nick go to the sender's private buffer.
    /// Lines without a user sender go to the server buffer.
    pub fn message(&mut self, sender: Option<&Prefix>, target: &str, text: &str, notice: bool) -> BufferId {
        let sender = sender.filter(|p| !p.is_server());
        let sender_id = sender.map(|p| self.resolve_prefix(p));

        let buffer = match sender {
            None => self.server_buffer(),
            Some(prefix) if !is_channel_name(target) && self.is_me(target) => {
                self.buffer_for(&prefix.nick)
            }
            Some(_) => self.buffer_for(target),
        };

        let (kind, body) = match text.strip_prefix(ACTION_PREFIX) {
            Some(action) if !notice => (
                LineKind::Action,
                action.strip_suffix('\u{1}').unwrap_or(action),
            ),
            _ if notice => (LineKind::Notice, text),
            _ => (LineKind::Message, text),
        };
        self.append_line(buffer, sender_id, kind, body);
        buffer
    }

    /// RPL_NAMREPLY: everyone listed is in `channel`.
    pub fn names(&mut self, channel: &str, list: &str) {
        let buffer = self.buffer_for(channel);
        for entry in list.split_whitespace() {
            let entry = entry.trim_start_matches(NAMES_MODE_PREFIXES);
            let Some(prefix) = Prefix::parse(entry) else {
                continue;
            };
            let user = self.resolve_prefix(&prefix);
            self.add_membership(user, buffer);
        }
    }

    /// Topic of `channel` is now `topic`. `setter` is present for a live
    /// TOPIC change and absent for RPL_TOPIC on join.
    pub fn set_topic(&mut self, channel: &str, topic: &str, setter: Option<&Prefix>) {
        let buffer = self.buffer_for(channel);
        if let Some(entry) = self.buffers.get_mut(buffer.0 as usize) {
            entry.topic = Some(topic.to_string());
        }
        self.touch_buffer(buffer);
        if let Some(setter) = setter {
            let sender = self.resolve_prefix(setter);
            self.append_line(buffer, Some(sender), LineKind::Topic, topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            Identity::new("me", "me", "Me"),
            ServerInfo::new("irc.example.net", 6667, false),
        )
    }

    fn who(mask: &str) -> Prefix {
        Prefix::parse(mask).unwrap()
    }

    #[test]
    fn nick_takeover_keeps_mover_identity() {
        let mut s = session();
        let n = s.resolve("n", None, None);
        let m = s.resolve("m", None, None);
        assert_ne!(n, m);

        s.rename("m", "n");

        assert_eq!(s.find_user_by_nick("n").unwrap().id, m);
        assert!(s.find_user_by_nick("m").is_none());
        assert!(!s.user(n).unwrap().current);
        assert_eq!(s.users().filter(|u| u.current && u.nick == "n").count(), 1);
    }

    #[test]
    fn stale_holder_loses_memberships() {
        let mut s = session();
        let (n, chan) = s.join(&who("n!u@h"), "#chan");
        let (m, _) = s.join(&who("m!u@h"), "#chan");

        s.rename("m", "n");

        assert!(!s.is_member(n, chan));
        assert!(s.is_member(m, chan));
        assert_eq!(s.members(chan), vec![m]);
    }

    #[test]
    fn rename_in_place_preserves_memberships() {
        let mut s = session();
        let (alice, chan) = s.join(&who("alice!a@h"), "#chan");

        assert_eq!(s.rename("alice", "ALICE2"), alice);

        assert!(s.is_member(alice, chan));
        assert_eq!(s.find_user_by_nick("alice2").unwrap().id, alice);
        assert_eq!(s.user(alice).unwrap().nick, "ALICE2");
        let last = s.lines().last().unwrap();
        assert_eq!(last.kind, LineKind::Nick);
        assert_eq!(last.body, "ALICE2");
    }

    #[test]
    fn rename_of_unknown_nick_resolves_new_nick() {
        let mut s = session();
        let ghost = s.rename("ghost", "spirit");
        assert_eq!(s.find_user_by_nick("spirit").unwrap().id, ghost);

        let existing = s.resolve("taken", None, None);
        assert_eq!(s.rename("nobody", "taken"), existing);
        assert_eq!(s.users().count(), 2);
    }

    #[test]
    fn repeated_interleavings_never_duplicate() {
        let mut s = session();
        for _ in 0..3 {
            s.join(&who("m!u@h"), "#chan");
            s.join(&who("m!u@h"), "#chan");
            s.rename("m", "n");
            s.rename("m", "n");
            s.join(&who("m!u@h"), "#chan");
            s.rename("n", "m");
            s.rename("m", "n");
            s.part(&who("n!u@h"), "#chan", None);
            s.part(&who("n!u@h"), "#chan", None);
            s.part(&who("x!u@h"), "#never", Some("bye"));
        }

        let chan = s.find_buffer_by_name("#CHAN").unwrap().id;
        let mut seen = BTreeSet::new();
        for user in s.members(chan) {
            assert!(seen.insert(user));
        }
        let current_n = s.users().filter(|u| u.current && irc_eq(&u.nick, "n")).count();
        let current_m = s.users().filter(|u| u.current && irc_eq(&u.nick, "m")).count();
        assert!(current_n <= 1 && current_m <= 1);
        assert!(s.find_buffer_by_name("#never").is_none());
    }

    #[test]
    fn quit_drops_memberships_and_keeps_record() {
        let mut s = session();
        let (bob, a) = s.join(&who("bob!b@h"), "#a");
        let (_, b) = s.join(&who("bob!b@h"), "#b");

        s.quit("bob", "gone");

        assert!(!s.is_member(bob, a));
        assert!(!s.is_member(bob, b));
        let record = s.user(bob).unwrap();
        assert!(!record.current);
        assert_eq!(record.nick, "bob");
        assert!(s.find_user_by_nick("bob").is_none());
        assert_eq!(s.lines_for(a).filter(|l| l.kind == LineKind::Quit).count(), 1);

        // a returning bob revives the same record
        let (again, _) = s.join(&who("bob!b@h"), "#a");
        assert_eq!(again, bob);

        s.quit("unknown", "whatever");
    }

    #[test]
    fn kick_removes_the_target_only() {
        let mut s = session();
        let (op, chan) = s.join(&who("op!o@h"), "#chan");
        let (victim, _) = s.join(&who("victim!v@h"), "#chan");

        s.kick(Some(&who("op!o@h")), "#chan", "victim", Some("spam"));

        assert!(s.is_member(op, chan));
        assert!(!s.is_member(victim, chan));
        let line = s.lines().last().unwrap();
        assert_eq!(line.kind, LineKind::Kick);
        assert_eq!(line.sender, Some(op));
        assert_eq!(line.body, "victim: spam");

        s.kick(None, "#chan", "victim", None);
        s.kick(None, "#nowhere", "victim", None);
    }

    #[test]
    fn private_messages_use_sender_buffer() {
        let mut s = session();
        let buffer = s.message(Some(&who("friend!f@h")), "ME", "hi", false);
        let record = s.buffer(buffer).unwrap();
        assert_eq!(record.name, "friend");
        assert_eq!(record.kind, BufferKind::Query);

        let chan = s.message(Some(&who("friend!f@h")), "#chan", "\u{1}ACTION waves\u{1}", false);
        let line = s.lines_for(chan).next().unwrap();
        assert_eq!(line.kind, LineKind::Action);
        assert_eq!(line.body, "waves");

        let server = s.message(Some(&who("irc.example.net")), "*", "*** Looking up your hostname", true);
        let record = s.buffer(server).unwrap();
        assert_eq!(record.kind, BufferKind::Server);
        let line = s.lines_for(server).next().unwrap();
        assert_eq!(line.kind, LineKind::Notice);
        assert_eq!(line.sender, None);
    }

    #[test]
    fn names_strip_mode_prefixes() {
        let mut s = session();
        s.names("#chan", "@op +voice ~owner plain me");
        s.names("#chan", "@op +voice");

        let chan = s.find_buffer_by_name("#chan").unwrap().id;
        assert_eq!(s.members(chan).len(), 5);
        assert!(s.find_user_by_nick("op").is_some());
        assert!(s.find_user_by_nick("@op").is_none());
        assert!(s.me().is_some());
    }

    #[test]
    fn topic_and_motd() {
        let mut s = session();
        s.set_topic("#chan", "welcome", None);
        s.set_topic("#chan", "new topic", Some(&who("op!o@h")));
        let chan = s.find_buffer_by_name("#chan").unwrap();
        assert_eq!(chan.topic.as_deref(), Some("new topic"));
        assert_eq!(s.lines().len(), 1);

        assert_eq!(s.motd(), None);
        s.motd_line("- line one");
        s.motd_line("- line two");
        assert_eq!(s.motd(), None);
        s.end_of_motd();
        assert_eq!(s.motd().as_deref(), Some("- line one\n- line two"));
    }

    #[test]
    fn welcome_confirms_nick() {
        let mut s = session();
        s.set_requested_nick("me_");
        assert!(!s.is_registered());
        s.welcome("me_");
        assert!(s.is_registered());
        assert_eq!(s.identity().nick, "me_");

        s.rename("me_", "me");
        assert_eq!(s.identity().nick, "me");
    }

    #[test]
    fn journal_records_changes_once_enabled() {
        let mut s = session();
        s.join(&who("early!e@h"), "#chan");
        assert!(s.drain_changes().is_empty());

        s.enable_journal();
        let (late, chan) = s.join(&who("late!l@h"), "#chan");
        let changes = s.drain_changes();
        assert!(matches!(&changes[0], Change::User(user) if user.id == late));
        assert!(changes.contains(&Change::MembershipAdded { user: late, buffer: chan }));
        assert!(matches!(changes.last(), Some(Change::Line(line)) if line.kind == LineKind::Join));
        assert!(s.drain_changes().is_empty());
    }
}
