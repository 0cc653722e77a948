#![allow(clippy::write_with_newline)]

//! IRC wire protocol message parsers and generators. Incomplete; new messages are added as needed.
//!
//! This library is for implementing clients rather than servers or services, and does not support
//! the IRC message format in full generality.

use std::str;

use libcourier_common::{ChanName, ChanNameRef};
use time::OffsetDateTime;

pub mod isupport;
pub mod modes;
pub mod tags;

pub use tags::Tags;

pub fn pass(pass: &str) -> String {
    format!("PASS {}\r\n", pass)
}

// FIXME: Option<String> because going from Option<String> to Option<&str> is too painful...
pub fn quit(reason: Option<String>) -> String {
    match reason {
        None => "QUIT\r\n".to_string(),
        Some(reason) => format!("QUIT :{}\r\n", reason),
    }
}

pub fn user(hostname: &str, realname: &str) -> String {
    format!("USER {} 8 * :{}\r\n", hostname, realname)
}

pub fn nick(arg: &str) -> String {
    format!("NICK {}\r\n", arg)
}

pub fn ping(arg: &str) -> String {
    format!("PING {}\r\n", arg)
}

pub fn pong(arg: &str) -> String {
    format!("PONG {}\r\n", arg)
}

pub fn join<'a, I>(chans: I) -> String
where
    I: Iterator<Item = &'a ChanNameRef> + 'a,
{
    let chans = chans.map(|c| c.display()).collect::<Vec<_>>();
    format!("JOIN {}\r\n", chans.join(","))
}

pub fn part(chan: &ChanNameRef) -> String {
    format!("PART {}\r\n", chan.display())
}

pub fn privmsg(msgtarget: &str, msg: &str) -> String {
    // IRC messages need to be shorter than 512 bytes (see RFC 1459 or 2812). This should be dealt
    // with at call sites as we can't show how we split messages into multiple messages in the UI
    // at this point.
    assert!(msgtarget.len() + msg.len() + 12 <= 512);
    format!("PRIVMSG {} :{}\r\n", msgtarget, msg)
}

pub fn action(msgtarget: &str, msg: &str) -> String {
    assert!(msgtarget.len() + msg.len() + 21 <= 512); // See comments in `privmsg`
    format!("PRIVMSG {} :\x01ACTION {}\x01\r\n", msgtarget, msg)
}

pub fn away(msg: Option<&str>) -> String {
    match msg {
        None => "AWAY\r\n".to_string(),
        Some(msg) => format!("AWAY :{}\r\n", msg),
    }
}

pub fn cap_ls() -> String {
    "CAP LS\r\n".to_string()
}

pub fn cap_req(cap_identifiers: &[&str]) -> String {
    format!("CAP REQ :{}\r\n", cap_identifiers.join(" "))
}

pub fn cap_end() -> String {
    "CAP END\r\n".to_string()
}

pub fn authenticate(msg: &str) -> String {
    format!("AUTHENTICATE {}\r\n", msg)
}

pub fn notice(msgtarget: &str, msg: &str) -> String {
    format!("NOTICE {} :{}\r\n", msgtarget, msg)
}

pub fn ctcp_reply(msgtarget: &str, payload: &str) -> String {
    format!("NOTICE {} :\x01{}\x01\r\n", msgtarget, payload)
}

pub fn mode(target: &str, modestring: &str, args: &[&str]) -> String {
    if args.is_empty() {
        format!("MODE {} {}\r\n", target, modestring)
    } else {
        format!("MODE {} {} {}\r\n", target, modestring, args.join(" "))
    }
}

/// Query a channel's current modes (bare `MODE <chan>`, no modestring).
pub fn mode_query(chan: &str) -> String {
    format!("MODE {}\r\n", chan)
}

/// Render an arbitrary command with params, quoting the last param as trailing (`:`-prefixed) if
/// it's empty, contains a space, or already starts with `:`. For commands with a dedicated
/// builder above, prefer that; this is for the pure core's generic `send_message`.
pub fn render(command: &str, params: &[&str]) -> String {
    let mut out = command.to_owned();
    for (i, param) in params.iter().enumerate() {
        out.push(' ');
        let needs_colon = i == params.len() - 1
            && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
        if needs_colon {
            out.push(':');
        }
        out.push_str(param);
    }
    out.push_str("\r\n");
    out
}

pub fn who(mask: &str) -> String {
    format!("WHO {}\r\n", mask)
}

pub fn tagmsg(target: &str, typing: &str) -> String {
    format!("@+typing={} TAGMSG {}\r\n", typing, target)
}

/// Sender of a message ("prefix" in the RFC), split into its component parts. Every message that
/// has a prefix gets one of these; messages without a prefix get the all-empty default.
///
/// Parsing is a simple split, not the RFC 2812 server/nick classification: if the prefix contains
/// both `!` and `@` (in that order) it's a user mask and we split nick/user/host out of it;
/// otherwise the whole prefix is the host, with nick and user left empty. Distinguishing "this is
/// definitely a server" from "this is a bare nick with no user/host" from the raw text alone isn't
/// reliable (RFC 2812's own grammar admits the ambiguity), so we don't try — callers that care
/// check whether `nick` is empty instead.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Source {
    /// The raw prefix text, exactly as it appeared on the wire.
    pub raw: String,
    /// Nick, if the prefix was a full `nick!user@host` mask.
    pub nick: String,
    /// User, if the prefix was a full `nick!user@host` mask.
    pub user: String,
    /// Host. Set to the whole prefix when it wasn't a `nick!user@host` mask (e.g. a server name).
    pub host: String,
}

impl Source {
    /// Human-readable label for this source: the first non-empty of nick, host, raw.
    pub fn display(&self) -> &str {
        if !self.nick.is_empty() {
            &self.nick
        } else if !self.host.is_empty() {
            &self.host
        } else {
            &self.raw
        }
    }
}

pub fn parse_source(raw: &str) -> Source {
    match (raw.find('!'), raw.find('@')) {
        (Some(bang_idx), Some(at_idx)) if bang_idx < at_idx => Source {
            raw: raw.to_owned(),
            nick: raw[..bang_idx].to_owned(),
            user: raw[bang_idx + 1..at_idx].to_owned(),
            host: raw[at_idx + 1..].to_owned(),
        },
        _ => Source {
            raw: raw.to_owned(),
            nick: String::new(),
            user: String::new(),
            host: raw.to_owned(),
        },
    }
}

/// Target of a message
///
/// Masks are not parsed, as rules for masks are not clear in RFC 2818 (for example, `#x.y` can be
/// a channel name or a host mask, there is no way to disambiguate), and in practice servers use
/// masks that are not valid according to the RFC (for example, I've observed Freenode sending
/// PRIVMSGs to `$$*`). The rules we follow is: if a target starts with `#` it's a `Chan`,
/// otherwise it's a `User`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum MsgTarget {
    Chan(ChanName),
    User(String),
}

/// An IRC message
#[derive(Debug, PartialEq, Eq)]
pub struct Msg {
    /// IRCv3 message tags, if the message carried an `@...` tag section. Empty when absent.
    pub tags: Tags,

    /// Sender of a message. According to RFC 2812 the prefix is optional:
    ///
    /// > If the prefix is missing from the message, it is assumed to have originated from the
    /// > connection from which it was received from.
    ///
    /// In that case `source` is the all-empty `Source::default()` rather than an `Option`, so
    /// callers always have something to match `nick`/`host` against.
    pub source: Source,
    pub cmd: Cmd,
}

impl Msg {
    /// The `time` tag, parsed as RFC3339, if present and valid. Servers that support the
    /// `server-time` capability attach this to replayed (e.g. batched, history) messages.
    pub fn time(&self) -> Option<OffsetDateTime> {
        let raw = self.tags.get("time")?;
        OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339).ok()
    }
}

/// A client-to-client protocol message. See https://defs.ircdocs.horse/defs/ctcp.html
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CTCP {
    Version,
    Action,
    Other(String),
}

impl CTCP {
    fn parse(s: &str) -> CTCP {
        match s {
            "VERSION" => CTCP::Version,
            "ACTION" => CTCP::Action,
            _ => CTCP::Other(s.to_owned()),
        }
    }
}

/// An IRC command or reply
#[derive(Debug, PartialEq, Eq)]
pub enum Cmd {
    /// A PRIVMSG or NOTICE. Check `is_notice` field.
    PRIVMSG {
        // TODO: In theory this should be a list of targets, but in practice I've never
        // encountered that case.
        target: MsgTarget,
        msg: String,
        is_notice: bool,
        ctcp: Option<CTCP>,
    },

    JOIN {
        // TODO: Same as above, this should be a list ...
        chan: ChanName, // TODO: key field might be useful when joining restricted channels. In
                        // practice I've never needed it.
    },

    PART {
        // TODO: List of channels
        chan: ChanName,
        msg: Option<String>,
    },

    QUIT {
        msg: Option<String>,
        /// Channels of the user that just quit. This is not a part of the IRC message, but
        /// something `libcourier_client` fills in for the users. Currently used to update tabs of the
        /// user in TUI.
        chans: Vec<ChanName>,
    },

    NICK {
        nick: String,
        /// Channels of the user. Channels of the user that just quit. This is not a part of the
        /// IRC message, but something `libcourier_client` fills in for the users. Currently used to
        /// update tabs of the user in TUI.
        chans: Vec<ChanName>,
    },

    PING {
        server: String,
    },

    PONG {
        server: String,
    },

    ERROR {
        msg: String,
    },

    /// Our own away status changed, echoed back by some servers, or another user's AWAY seen via
    /// the `away-notify` capability.
    AWAY {
        msg: Option<String>,
    },

    TOPIC {
        chan: ChanName,
        topic: String,
    },

    CAP {
        client: String,
        subcommand: String,
        params: Vec<String>,
    },

    AUTHENTICATE {
        param: String,
    },

    MODE {
        target: String,
        modestring: String,
        args: Vec<String>,
    },

    KICK {
        chan: ChanName,
        nick: String,
        comment: Option<String>,
    },

    /// A batched-message marker (`BATCH +id type params...` / `BATCH -id`). Batch contents
    /// themselves arrive as ordinary messages tagged with `batch=id`; this command only carries
    /// the start/end markers.
    BATCH {
        /// Without the leading `+`/`-`.
        id: String,
        /// `Some` for a batch start, `None` for a batch end.
        start: Option<BatchStart>,
    },

    /// A tag-only message, e.g. used for typing notifications (`+typing`).
    TAGMSG {
        target: String,
    },

    /// An IRC message other than the ones listed above.
    Other {
        cmd: String,
        params: Vec<String>,
    },

    /// Numeric replies are kept generic as there are just too many replies and we probably only
    /// need to handle a small subset of them.
    Reply {
        num: u16,
        params: Vec<String>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BatchStart {
    pub batch_type: String,
    pub params: Vec<String>,
}

/// An intermediate type used during parsing.
enum MsgType<'a> {
    Cmd(&'a str),
    Num(u16),
}

static CRLF: [u8; 2] = [b'\r', b'\n'];

/// Try to read an IRC message off a buffer. Drops the message when parsing is successful.
/// Otherwise the buffer is left unchanged.
pub fn parse_irc_msg(buf: &mut Vec<u8>) -> Option<Result<Msg, String>> {
    // Find "\r\n" separator. We can't do this *after* generating the lossy UTF-8, as that may have
    // different size than the original buffer after inserting "REPLACEMENT CHARACTER"s.
    let crlf_idx = {
        match buf.windows(2).position(|sub| sub == CRLF) {
            None => return None,
            Some(i) => i,
        }
    };

    let msg_owned: String = String::from_utf8_lossy(&buf[0..crlf_idx]).to_string();
    let msg: &str = &msg_owned;

    let ret = parse_one_message(msg);
    buf.drain(0..crlf_idx + 2);

    Some(ret)
}

// NB. 'msg' does not contain '\r\n' suffix.
fn parse_one_message(mut msg: &str) -> Result<Msg, String> {
    let tags: Tags = {
        if let Some('@') = msg.chars().next() {
            let ws_idx = msg
                .find(' ')
                .ok_or_else(|| format!("Can't find tags terminator (' ') in msg: {:?}", msg))?;
            let tags_str = &msg[1..ws_idx]; // consume '@'
            msg = &msg[ws_idx + 1..]; // consume ' '
            tags::parse_tags(tags_str)
        } else {
            Tags::default()
        }
    };

    let source: Source = {
        if let Some(':') = msg.chars().next() {
            // parse prefix
            let ws_idx = msg.find(' ').ok_or(format!(
                "Can't find prefix terminator (' ') in msg: {:?}",
                msg
            ))?;
            let pfx = &msg[1..ws_idx]; // consume ':'
            msg = &msg[ws_idx + 1..]; // consume ' '
            parse_source(pfx)
        } else {
            Source::default()
        }
    };

    let msg_ty: MsgType = {
        let ws_idx = msg.find(' ').ok_or(format!(
            "Can't find message type terminator (' ') in msg: {:?}",
            msg
        ))?;
        let cmd = &msg[..ws_idx];
        msg = &msg[ws_idx + 1..]; // Consume ' '
        match cmd.parse::<u16>() {
            Ok(num) => MsgType::Num(num),
            Err(_) => MsgType::Cmd(cmd),
        }
    };

    let params = parse_params(msg);
    let cmd = match msg_ty {
        MsgType::Cmd("PRIVMSG") | MsgType::Cmd("NOTICE") if params.len() == 2 => {
            let is_notice = matches!(msg_ty, MsgType::Cmd("NOTICE"));
            let target = params[0];
            let mut msg = params[1];
            let target = if target.starts_with('#') {
                MsgTarget::Chan(ChanName::new(target.to_owned()))
            } else {
                MsgTarget::User(target.to_owned())
            };

            let mut ctcp: Option<CTCP> = None;
            if !msg.is_empty() && msg.as_bytes()[0] == 0x01 {
                // Drop 0x01
                msg = &msg[1..];
                // Parse message type
                for (byte_idx, byte) in msg.as_bytes().iter().enumerate() {
                    if *byte == 0x01 {
                        let ctcp_type = &msg[0..byte_idx];
                        ctcp = Some(CTCP::parse(ctcp_type));
                        msg = &msg[byte_idx + 1..];
                        break;
                    } else if *byte == b' ' {
                        let ctcp_type = &msg[0..byte_idx];
                        ctcp = Some(CTCP::parse(ctcp_type));
                        msg = &msg[byte_idx + 1..];
                        if !msg.is_empty() && msg.as_bytes()[msg.len() - 1] == 0x01 {
                            msg = &msg[..msg.len() - 1];
                        }
                        break;
                    }
                }
            }

            Cmd::PRIVMSG {
                target,
                msg: msg.to_owned(),
                is_notice,
                ctcp,
            }
        }
        MsgType::Cmd("JOIN") if params.len() == 1 => {
            let chan = params[0];
            Cmd::JOIN {
                chan: ChanName::new(chan.to_owned()),
            }
        }
        MsgType::Cmd("PART") if params.len() == 1 || params.len() == 2 => {
            let mb_msg = if params.len() == 2 {
                Some(params[1].to_owned())
            } else {
                None
            };
            Cmd::PART {
                chan: ChanName::new(params[0].to_owned()),
                msg: mb_msg,
            }
        }
        MsgType::Cmd("QUIT") if params.is_empty() || params.len() == 1 => {
            let mb_msg = params.get(1).map(|s| (*s).to_owned());

            Cmd::QUIT {
                msg: mb_msg,
                chans: Vec::new(),
            }
        }
        MsgType::Cmd("NICK") if params.len() == 1 => {
            let nick = params[0];
            Cmd::NICK {
                nick: nick.to_owned(),
                chans: Vec::new(),
            }
        }
        MsgType::Cmd("PING") if params.len() == 1 => Cmd::PING {
            server: params[0].to_owned(),
        },
        MsgType::Cmd("PONG") if !params.is_empty() => Cmd::PONG {
            server: params[0].to_owned(),
        },
        MsgType::Cmd("ERROR") if params.len() == 1 => Cmd::ERROR {
            msg: params[0].to_owned(),
        },
        MsgType::Cmd("AWAY") if params.len() <= 1 => Cmd::AWAY {
            msg: params.first().map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("TOPIC") if params.len() == 2 => Cmd::TOPIC {
            chan: ChanName::new(params[0].to_owned()),
            topic: params[1].to_owned(),
        },
        MsgType::Cmd("CAP") if params.len() == 3 => Cmd::CAP {
            client: params[0].to_owned(),
            subcommand: params[1].to_owned(),
            params: params[2].split(' ').map(|s| s.to_owned()).collect(),
        },
        MsgType::Cmd("AUTHENTICATE") if params.len() == 1 => Cmd::AUTHENTICATE {
            param: params[0].to_owned(),
        },
        MsgType::Cmd("MODE") if !params.is_empty() => {
            let target = params[0].to_owned();
            let modestring = params.get(1).map(|s| (*s).to_owned()).unwrap_or_default();
            let args = params[2..].iter().map(|s| (*s).to_owned()).collect();
            Cmd::MODE {
                target,
                modestring,
                args,
            }
        }
        MsgType::Cmd("KICK") if params.len() >= 2 => Cmd::KICK {
            chan: ChanName::new(params[0].to_owned()),
            nick: params[1].to_owned(),
            comment: params.get(2).map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("BATCH") if !params.is_empty() => {
            let marker = params[0];
            if let Some(id) = marker.strip_prefix('+') {
                Cmd::BATCH {
                    id: id.to_owned(),
                    start: Some(BatchStart {
                        batch_type: params.get(1).map(|s| (*s).to_owned()).unwrap_or_default(),
                        params: params[2..].iter().map(|s| (*s).to_owned()).collect(),
                    }),
                }
            } else if let Some(id) = marker.strip_prefix('-') {
                Cmd::BATCH {
                    id: id.to_owned(),
                    start: None,
                }
            } else {
                Cmd::Other {
                    cmd: "BATCH".to_owned(),
                    params: params.into_iter().map(|s| s.to_owned()).collect(),
                }
            }
        }
        MsgType::Cmd("TAGMSG") if params.len() == 1 => Cmd::TAGMSG {
            target: params[0].to_owned(),
        },
        MsgType::Num(n) => Cmd::Reply {
            num: n,
            params: params.into_iter().map(|s| s.to_owned()).collect(),
        },
        MsgType::Cmd(cmd) => Cmd::Other {
            cmd: cmd.to_owned(),
            params: params.into_iter().map(|s| s.to_owned()).collect(),
        },
    };

    Ok(Msg { tags, source, cmd })
}

fn parse_params(chrs: &str) -> Vec<&str> {
    // Spec:
    //
    //     params     =  *14( SPACE middle ) [ SPACE ":" trailing ]
    //                =/ 14( SPACE middle ) [ SPACE [ ":" ] trailing ]
    //
    //     nospcrlfcl =  %x01-09 / %x0B-0C / %x0E-1F / %x21-39 / %x3B-FF
    //                     ; any octet except NUL, CR, LF, " " and ":"
    //     middle     =  nospcrlfcl *( ":" / nospcrlfcl )
    //     trailing   =  *( ":" / " " / nospcrlfcl )
    //
    // The RFC doesn't explain the syntax with `14` here as if it's something standard. I'm
    // guessing it's number of repetitions, and `*14` means "14 or less" repetitions.

    let mut params = Vec::new();
    let mut char_indices = chrs.char_indices();

    while let Some((idx, c)) = char_indices.next() {
        if c == ':' {
            params.push(&chrs[idx + 1..]); // Skip ':'
            break;
        }

        if params.len() == 14 {
            params.push(&chrs[idx..]);
            break;
        }

        if c == ' ' {
            continue;
        }

        loop {
            match char_indices.next() {
                Some((idx_, c)) => {
                    if c == ' ' {
                        params.push(&chrs[idx..idx_]);
                        break;
                    }
                }
                None => {
                    params.push(&chrs[idx..]);
                    break;
                }
            }
        }
    }

    params
}

/// Nicks may have prefixes, indicating it is a operator, founder, or something else.
///
/// Channel Membership Prefixes: http://modern.ircdocs.horse/#channel-membership-prefixes
///
/// Returns the nick without prefix.
pub fn drop_nick_prefix(nick: &str) -> &str {
    static PREFIXES: [char; 5] = ['~', '&', '@', '%', '+'];

    if PREFIXES.contains(&nick.chars().next().unwrap()) {
        &nick[1..]
    } else {
        nick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params("p1 p2 p3"), vec!["p1", "p2", "p3"]);
        let empty: Vec<&str> = vec![];
        assert_eq!(parse_params(""), empty);
        assert_eq!(parse_params(":foo bar baz "), vec!["foo bar baz "]);
        assert_eq!(
            parse_params(":foo : bar : baz :"),
            vec!["foo : bar : baz :"]
        );
        assert_eq!(parse_params(":"), vec![""]);
        assert_eq!(parse_params("x:"), vec!["x:"]);
        assert_eq!(parse_params("x:y"), vec!["x:y"]);
        assert_eq!(parse_params("x:y:z"), vec!["x:y:z"]);
        assert_eq!(parse_params(":::::"), vec!["::::"]);

        let params = parse_params("1 2 3 4 5 6 7 8 9 10 11 12 13 14 blah blah blah");
        assert_eq!(params.len(), 15);
        assert_eq!(params[params.len() - 1], "blah blah blah");

        assert_eq!(parse_params("   "), empty); // Not valid according to the RFC, I think
        assert_eq!(parse_params(":  "), vec!["  "]);
        assert_eq!(parse_params(": : :"), vec![" : :"]);
        assert_eq!(parse_params("x y : : :"), vec!["x", "y", " : :"]);
        assert_eq!(parse_params("aaa://aaa"), vec!["aaa://aaa"]);
    }

    #[test]
    fn test_privmsg_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":nick!~nick@unaffiliated/nick PRIVMSG courier :a b c\r\n"
        )
        .unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source {
                    raw: "nick!~nick@unaffiliated/nick".to_owned(),
                    nick: "nick".to_owned(),
                    user: "~nick".to_owned(),
                    host: "unaffiliated/nick".to_owned(),
                },
                cmd: Cmd::PRIVMSG {
                    target: MsgTarget::User("courier".to_owned()),
                    msg: "a b c".to_owned(),
                    is_notice: false,
                    ctcp: None,
                },
            }
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_notice_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":barjavel.freenode.net NOTICE * :*** Looking up your hostname...\r\n"
        )
        .unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source {
                    raw: "barjavel.freenode.net".to_owned(),
                    nick: String::new(),
                    user: String::new(),
                    host: "barjavel.freenode.net".to_owned(),
                },
                cmd: Cmd::PRIVMSG {
                    target: MsgTarget::User("*".to_owned()),
                    msg: "*** Looking up your hostname...".to_owned(),
                    is_notice: true,
                    ctcp: None,
                },
            }
        );
    }

    #[test]
    fn test_numeric_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":barjavel.freenode.net 001 courier :Welcome to the freenode Internet Relay Chat Network courier\r\n"
        ).unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 002 courier :Your host is barjavel.freenode.net[123.123.123.123/8001], \
             running version ircd-seven-1.1.4\r\n"
        ).unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 004 courier_test barjavel.freenode.net \
             ircd-seven-1.1.4 DOQRSZaghilopswz \
             CFILMPQSbcefgijklmnopqrstvz bkloveqjfI\r\n"
        )
        .unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 005 courier_test CHANTYPES=# EXCEPTS INVEX \
             CHANMODES=eIbq,k,flj,CFLMPQScgimnprstz CHANLIMIT=#:120 PREFIX=(ov)@+ \
             MAXLIST=bqeI:100 MODES=4 NETWORK=freenode STATUSMSG=@+ CALLERID=g \
             CASEMAPPING=rfc1459 :are supported by this server\r\n"
        )
        .unwrap();

        let mut msgs = vec![];
        while let Some(Ok(msg)) = parse_irc_msg(&mut buf) {
            assert_eq!(msg.source.host, "barjavel.freenode.net");
            assert!(msg.source.nick.is_empty());
            msgs.push(msg);
        }

        assert_eq!(msgs.len(), 4);
    }

    #[test]
    fn test_part_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":courier!~courier@123.123.123.123 PART #haskell\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source {
                    raw: "courier!~courier@123.123.123.123".to_owned(),
                    nick: "courier".to_owned(),
                    user: "~courier".to_owned(),
                    host: "123.123.123.123".to_owned(),
                },
                cmd: Cmd::PART {
                    chan: ChanName::new("#haskell".to_owned()),
                    msg: None,
                },
            }
        );
    }

    #[test]
    fn test_join_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":courier!~courier@192.168.0.1 JOIN #haskell\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source {
                    raw: "courier!~courier@192.168.0.1".to_owned(),
                    nick: "courier".to_owned(),
                    user: "~courier".to_owned(),
                    host: "192.168.0.1".to_owned(),
                },
                cmd: Cmd::JOIN {
                    chan: ChanName::new("#haskell".to_owned()),
                },
            }
        );
        assert_eq!(buf.len(), 0);
    }

    // Example from https://tools.ietf.org/id/draft-oakley-irc-ctcp-01.html
    #[test]
    fn test_ctcp_action_parsing_1() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":dan!u@localhost PRIVMSG #ircv3 :\x01ACTION writes some specs!\x01\r\n"
        )
        .unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source {
                    raw: "dan!u@localhost".to_owned(),
                    nick: "dan".to_owned(),
                    user: "u".to_owned(),
                    host: "localhost".to_owned(),
                },
                cmd: Cmd::PRIVMSG {
                    target: MsgTarget::Chan(ChanName::new("#ircv3".to_owned())),
                    msg: "writes some specs!".to_owned(),
                    is_notice: false,
                    ctcp: Some(CTCP::Action),
                },
            }
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_ctcp_action_parsing_2() {
        // From https://modern.ircdocs.horse/ctcp.html:
        //
        // > The final <delim> MUST be sent, but parsers SHOULD accept incoming messages which lack
        // > it (particularly for CTCP ACTION). This is due to how some software incorrectly
        // > implements message splitting.
        let mut buf = vec![];
        write!(
            &mut buf,
            ":a!b@c PRIVMSG target :\x01ACTION msg contents\r\n"
        )
        .unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "msg contents".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Action),
            }
        );
        assert_eq!(buf.len(), 0);

        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :\x01ACTION \r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Action),
            }
        );
        assert_eq!(buf.len(), 0);

        // This is a regression test: the slice [..8] takes the substring with only a part of one
        // of the '’'s.
        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :’’’’’’’\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "’’’’’’’".to_owned(),
                is_notice: false,
                ctcp: None,
            }
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_ctcp_version_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :\x01VERSION\x01\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Version),
            }
        );

        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :\x01VERSION \x01\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Version),
            }
        );
    }

    #[test]
    fn other_ctcp_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :\x01blah blah \x01\r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "blah ".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Other("blah".to_owned())),
            }
        );

        let mut buf = vec![];
        write!(&mut buf, ":a!b@c PRIVMSG target :\x01blah blah \r\n").unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap().cmd,
            Cmd::PRIVMSG {
                target: MsgTarget::User("target".to_owned()),
                msg: "blah ".to_owned(),
                is_notice: false,
                ctcp: Some(CTCP::Other("blah".to_owned())),
            }
        );
    }

    #[test]
    fn test_error_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            "ERROR :Closing Link: 212.252.143.51 (Excess Flood)\r\n"
        )
        .unwrap();
        assert_eq!(
            parse_irc_msg(&mut buf).unwrap().unwrap(),
            Msg {
                tags: Tags::default(),
                source: Source::default(),
                cmd: Cmd::ERROR {
                    msg: "Closing Link: 212.252.143.51 (Excess Flood)".to_owned(),
                },
            },
        );
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(
            parse_source("xyz"),
            Source {
                raw: "xyz".to_string(),
                nick: String::new(),
                user: String::new(),
                host: "xyz".to_string(),
            }
        );
        assert_eq!(
            parse_source("xy.z"),
            Source {
                raw: "xy.z".to_string(),
                nick: String::new(),
                user: String::new(),
                host: "xy.z".to_string(),
            }
        );
        assert_eq!(
            parse_source("wisp!wisp@x.y.im"),
            Source {
                raw: "wisp!wisp@x.y.im".to_string(),
                nick: "wisp".to_string(),
                user: "wisp".to_string(),
                host: "x.y.im".to_string(),
            }
        );
        assert_eq!(
            parse_source("IRC!IRC@fe-00106.xyz.net"),
            Source {
                raw: "IRC!IRC@fe-00106.xyz.net".to_string(),
                nick: "IRC".to_string(),
                user: "IRC".to_string(),
                host: "fe-00106.xyz.net".to_string(),
            }
        );
        // '@' before '!' doesn't count as a mask split.
        assert_eq!(
            parse_source("weird@nick!thing"),
            Source {
                raw: "weird@nick!thing".to_string(),
                nick: String::new(),
                user: String::new(),
                host: "weird@nick!thing".to_string(),
            }
        );
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            Source {
                raw: "a!b@c".to_string(),
                nick: "a".to_string(),
                user: "b".to_string(),
                host: "c".to_string(),
            }
            .display(),
            "a"
        );
        assert_eq!(
            Source {
                raw: "irc.example.org".to_string(),
                nick: String::new(),
                user: String::new(),
                host: "irc.example.org".to_string(),
            }
            .display(),
            "irc.example.org"
        );
    }

    #[test]
    fn test_tags_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            "@id=123;time=2021-01-05T12:00:00.000Z :nick!u@h PRIVMSG #chan :hi\r\n"
        )
        .unwrap();
        let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(msg.tags.get("id"), Some("123"));
        assert!(msg.time().is_some());
    }

    #[test]
    fn test_mode_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":op!o@h MODE #chan +ov alice bob\r\n").unwrap();
        let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::MODE {
                target: "#chan".to_owned(),
                modestring: "+ov".to_owned(),
                args: vec!["alice".to_owned(), "bob".to_owned()],
            }
        );
    }

    #[test]
    fn test_kick_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":op!o@h KICK #chan alice :be nice\r\n").unwrap();
        let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::KICK {
                chan: ChanName::new("#chan".to_owned()),
                nick: "alice".to_owned(),
                comment: Some("be nice".to_owned()),
            }
        );
    }

    #[test]
    fn test_batch_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":irc.example.com BATCH +abc123 chathistory #chan\r\n"
        )
        .unwrap();
        write!(&mut buf, ":irc.example.com BATCH -abc123\r\n").unwrap();
        let start = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(
            start.cmd,
            Cmd::BATCH {
                id: "abc123".to_owned(),
                start: Some(BatchStart {
                    batch_type: "chathistory".to_owned(),
                    params: vec!["#chan".to_owned()],
                }),
            }
        );
        let end = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(
            end.cmd,
            Cmd::BATCH {
                id: "abc123".to_owned(),
                start: None,
            }
        );
    }

    #[test]
    fn test_tagmsg_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            "@+typing=active :nick!u@h TAGMSG #chan\r\n"
        )
        .unwrap();
        let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(msg.tags.get("+typing"), Some("active"));
        assert_eq!(
            msg.cmd,
            Cmd::TAGMSG {
                target: "#chan".to_owned(),
            }
        );
    }
}
