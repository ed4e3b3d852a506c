//! IRC numeric replies and their symbolic names.
//!
//! Servers send replies as three-digit numerics; everything above the codec
//! talks in symbolic names (`RPL_WELCOME`, `ERR_NICKNAMEINUSE`) so that
//! handlers and host callbacks can be keyed by something readable.
//!
//! # Reference
//! - RFC 2812 section 5: Replies
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

macro_rules! responses {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)+) => {
        /// IRC server numeric reply.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u16)]
        #[non_exhaustive]
        pub enum Response {
            $($(#[$doc])* $name = $code,)+
        }

        impl Response {
            /// Look up a reply by its numeric code.
            pub fn from_code(code: u16) -> Option<Response> {
                match code {
                    $($code => Some(Response::$name),)+
                    _ => None,
                }
            }

            /// The symbolic name, e.g. `RPL_WELCOME`.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Response::$name => stringify!($name),)+
                }
            }
        }
    };
}

responses! {
    // === Connection registration ===
    /// 001
    RPL_WELCOME = 1,
    /// 002
    RPL_YOURHOST = 2,
    /// 003
    RPL_CREATED = 3,
    /// 004
    RPL_MYINFO = 4,
    /// 005 - ISUPPORT tokens
    RPL_ISUPPORT = 5,
    /// 010
    RPL_BOUNCE = 10,
    /// 042
    RPL_YOURID = 42,

    // === Trace / stats ===
    /// 200
    RPL_TRACELINK = 200,
    /// 201
    RPL_TRACECONNECTING = 201,
    /// 202
    RPL_TRACEHANDSHAKE = 202,
    /// 203
    RPL_TRACEUNKNOWN = 203,
    /// 204
    RPL_TRACEOPERATOR = 204,
    /// 205
    RPL_TRACEUSER = 205,
    /// 206
    RPL_TRACESERVER = 206,
    /// 207
    RPL_TRACESERVICE = 207,
    /// 208
    RPL_TRACENEWTYPE = 208,
    /// 209
    RPL_TRACECLASS = 209,
    /// 210
    RPL_TRACERECONNECT = 210,
    /// 211
    RPL_STATSLINKINFO = 211,
    /// 212
    RPL_STATSCOMMANDS = 212,
    /// 219
    RPL_ENDOFSTATS = 219,
    /// 221
    RPL_UMODEIS = 221,
    /// 234
    RPL_SERVLIST = 234,
    /// 235
    RPL_SERVLISTEND = 235,
    /// 242
    RPL_STATSUPTIME = 242,
    /// 243
    RPL_STATSOLINE = 243,
    /// 250
    RPL_STATSCONN = 250,
    /// 251
    RPL_LUSERCLIENT = 251,
    /// 252
    RPL_LUSEROP = 252,
    /// 253
    RPL_LUSERUNKNOWN = 253,
    /// 254
    RPL_LUSERCHANNELS = 254,
    /// 255
    RPL_LUSERME = 255,
    /// 256
    RPL_ADMINME = 256,
    /// 257
    RPL_ADMINLOC1 = 257,
    /// 258
    RPL_ADMINLOC2 = 258,
    /// 259
    RPL_ADMINEMAIL = 259,
    /// 261
    RPL_TRACELOG = 261,
    /// 262
    RPL_TRACEEND = 262,
    /// 263
    RPL_TRYAGAIN = 263,
    /// 265
    RPL_LOCALUSERS = 265,
    /// 266
    RPL_GLOBALUSERS = 266,

    // === User / channel replies ===
    /// 301
    RPL_AWAY = 301,
    /// 302
    RPL_USERHOST = 302,
    /// 303
    RPL_ISON = 303,
    /// 305
    RPL_UNAWAY = 305,
    /// 306
    RPL_NOWAWAY = 306,
    /// 311
    RPL_WHOISUSER = 311,
    /// 312
    RPL_WHOISSERVER = 312,
    /// 313
    RPL_WHOISOPERATOR = 313,
    /// 314
    RPL_WHOWASUSER = 314,
    /// 315
    RPL_ENDOFWHO = 315,
    /// 317
    RPL_WHOISIDLE = 317,
    /// 318
    RPL_ENDOFWHOIS = 318,
    /// 319
    RPL_WHOISCHANNELS = 319,
    /// 321
    RPL_LISTSTART = 321,
    /// 322
    RPL_LIST = 322,
    /// 323
    RPL_LISTEND = 323,
    /// 324
    RPL_CHANNELMODEIS = 324,
    /// 325
    RPL_UNIQOPIS = 325,
    /// 329
    RPL_CREATIONTIME = 329,
    /// 330
    RPL_WHOISACCOUNT = 330,
    /// 331
    RPL_NOTOPIC = 331,
    /// 332
    RPL_TOPIC = 332,
    /// 333
    RPL_TOPICWHOTIME = 333,
    /// 341
    RPL_INVITING = 341,
    /// 342
    RPL_SUMMONING = 342,
    /// 346
    RPL_INVITELIST = 346,
    /// 347
    RPL_ENDOFINVITELIST = 347,
    /// 348
    RPL_EXCEPTLIST = 348,
    /// 349
    RPL_ENDOFEXCEPTLIST = 349,
    /// 351
    RPL_VERSION = 351,
    /// 352
    RPL_WHOREPLY = 352,
    /// 353
    RPL_NAMREPLY = 353,
    /// 364
    RPL_LINKS = 364,
    /// 365
    RPL_ENDOFLINKS = 365,
    /// 366
    RPL_ENDOFNAMES = 366,
    /// 367
    RPL_BANLIST = 367,
    /// 368
    RPL_ENDOFBANLIST = 368,
    /// 369
    RPL_ENDOFWHOWAS = 369,
    /// 371
    RPL_INFO = 371,
    /// 372
    RPL_MOTD = 372,
    /// 374
    RPL_ENDOFINFO = 374,
    /// 375
    RPL_MOTDSTART = 375,
    /// 376
    RPL_ENDOFMOTD = 376,
    /// 381
    RPL_YOUREOPER = 381,
    /// 382
    RPL_REHASHING = 382,
    /// 383
    RPL_YOURESERVICE = 383,
    /// 391
    RPL_TIME = 391,
    /// 392
    RPL_USERSSTART = 392,
    /// 393
    RPL_USERS = 393,
    /// 394
    RPL_ENDOFUSERS = 394,
    /// 395
    RPL_NOUSERS = 395,
    /// 396
    RPL_VISIBLEHOST = 396,

    // === Errors ===
    /// 401
    ERR_NOSUCHNICK = 401,
    /// 402
    ERR_NOSUCHSERVER = 402,
    /// 403
    ERR_NOSUCHCHANNEL = 403,
    /// 404
    ERR_CANNOTSENDTOCHAN = 404,
    /// 405
    ERR_TOOMANYCHANNELS = 405,
    /// 406
    ERR_WASNOSUCHNICK = 406,
    /// 407
    ERR_TOOMANYTARGETS = 407,
    /// 408
    ERR_NOSUCHSERVICE = 408,
    /// 409
    ERR_NOORIGIN = 409,
    /// 411
    ERR_NORECIPIENT = 411,
    /// 412
    ERR_NOTEXTTOSEND = 412,
    /// 413
    ERR_NOTOPLEVEL = 413,
    /// 414
    ERR_WILDTOPLEVEL = 414,
    /// 415
    ERR_BADMASK = 415,
    /// 421
    ERR_UNKNOWNCOMMAND = 421,
    /// 422
    ERR_NOMOTD = 422,
    /// 423
    ERR_NOADMININFO = 423,
    /// 424
    ERR_FILEERROR = 424,
    /// 431
    ERR_NONICKNAMEGIVEN = 431,
    /// 432
    ERR_ERRONEUSNICKNAME = 432,
    /// 433
    ERR_NICKNAMEINUSE = 433,
    /// 436
    ERR_NICKCOLLISION = 436,
    /// 437
    ERR_UNAVAILRESOURCE = 437,
    /// 441
    ERR_USERNOTINCHANNEL = 441,
    /// 442
    ERR_NOTONCHANNEL = 442,
    /// 443
    ERR_USERONCHANNEL = 443,
    /// 444
    ERR_NOLOGIN = 444,
    /// 445
    ERR_SUMMONDISABLED = 445,
    /// 446
    ERR_USERSDISABLED = 446,
    /// 451
    ERR_NOTREGISTERED = 451,
    /// 461
    ERR_NEEDMOREPARAMS = 461,
    /// 462
    ERR_ALREADYREGISTRED = 462,
    /// 463
    ERR_NOPERMFORHOST = 463,
    /// 464
    ERR_PASSWDMISMATCH = 464,
    /// 465
    ERR_YOUREBANNEDCREEP = 465,
    /// 466
    ERR_YOUWILLBEBANNED = 466,
    /// 467
    ERR_KEYSET = 467,
    /// 471
    ERR_CHANNELISFULL = 471,
    /// 472
    ERR_UNKNOWNMODE = 472,
    /// 473
    ERR_INVITEONLYCHAN = 473,
    /// 474
    ERR_BANNEDFROMCHAN = 474,
    /// 475
    ERR_BADCHANNELKEY = 475,
    /// 476
    ERR_BADCHANMASK = 476,
    /// 477
    ERR_NOCHANMODES = 477,
    /// 478
    ERR_BANLISTFULL = 478,
    /// 481
    ERR_NOPRIVILEGES = 481,
    /// 482
    ERR_CHANOPRIVSNEEDED = 482,
    /// 483
    ERR_CANTKILLSERVER = 483,
    /// 484
    ERR_RESTRICTED = 484,
    /// 485
    ERR_UNIQOPPRIVSNEEDED = 485,
    /// 491
    ERR_NOOPERHOST = 491,
    /// 492
    ERR_NOSERVICEHOST = 492,
    /// 501
    ERR_UMODEUNKNOWNFLAG = 501,
    /// 502
    ERR_USERSDONTMATCH = 502,

    // === Extended ===
    /// 671
    RPL_WHOISSECURE = 671,
    /// 900
    RPL_LOGGEDIN = 900,
    /// 901
    RPL_LOGGEDOUT = 901,
}

impl Response {
    /// Returns the numeric code.
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is an error reply (4xx/5xx).
    #[inline]
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code())
    }
}

impl FromStr for Response {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || ProtocolError::UnknownNumericCommand(s.to_string());
        if !is_numeric(s) {
            return Err(unknown());
        }
        let code: u16 = s.parse().map_err(|_| unknown())?;
        Response::from_code(code).ok_or_else(unknown)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// Whether a command is a three-digit numeric reply.
pub fn is_numeric(command: &str) -> bool {
    command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit())
}

/// Normalize a command to its symbolic name.
///
/// Numerics are translated through the reply table; everything else is
/// passed through unchanged (case is preserved, dispatch lower-cases).
pub fn normalize_command(command: &str) -> Result<Cow<'_, str>> {
    if is_numeric(command) {
        command
            .parse::<Response>()
            .map(|response| Cow::Borrowed(response.name()))
    } else {
        Ok(Cow::Borrowed(command))
    }
}
