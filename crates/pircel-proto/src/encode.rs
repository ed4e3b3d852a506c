//! Builders for the commands a client sends.
//!
//! Each function returns the line without its terminator; the
//! [`LineCodec`](crate::line::LineCodec) adds the newline on the way out.

/// `NICK <nick>`
pub fn nick(nick: &str) -> String {
    format!("NICK {}", nick)
}

/// `USER <username> 0 * :<realname>`
pub fn user(username: &str, realname: &str) -> String {
    format!("USER {} 0 * :{}", username, realname)
}

/// `JOIN <channel>[ <key>]`
pub fn join(channel: &str, key: Option<&str>) -> String {
    match key {
        Some(key) if !key.is_empty() => format!("JOIN {} {}", channel, key),
        _ => format!("JOIN {}", channel),
    }
}

/// `PART <channel>[ :<reason>]`
pub fn part(channel: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("PART {} :{}", channel, reason),
        None => format!("PART {}", channel),
    }
}

/// `QUIT :<message>`
pub fn quit(message: &str) -> String {
    format!("QUIT :{}", message)
}

/// `PING <token>`
pub fn ping(token: &str) -> String {
    format!("PING {}", token)
}

/// `PONG :<token>`
pub fn pong(token: &str) -> String {
    format!("PONG :{}", token)
}

/// `WHO <mask>`
pub fn who(mask: &str) -> String {
    format!("WHO {}", mask)
}

/// `PRIVMSG <target> :<text>`, one line per line of `text`.
pub fn privmsg(target: &str, text: &str) -> Vec<String> {
    split_lines("PRIVMSG", target, text)
}

/// `NOTICE <target> :<text>`, one line per line of `text`.
pub fn notice(target: &str, text: &str) -> Vec<String> {
    split_lines("NOTICE", target, text)
}

/// Emit one `<command> <target> :<line>` per line so no frame ever carries an
/// embedded newline. A trailing CR from CRLF input is dropped.
fn split_lines(command: &str, target: &str, text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| format!("{} {} :{}", command, target, line))
        .collect()
}
