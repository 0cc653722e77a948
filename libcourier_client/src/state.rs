#![allow(clippy::zero_prefixed_literal)]

use crate::utils;
use crate::{Cmd, Event, SASLAuth, ServerInfo, TypingStatus};
use libcourier_common::{ChanName, ChanNameRef};
use libcourier_wire as wire;
use libcourier_wire::isupport::{self, ChanModes, Prefix};
use libcourier_wire::{Msg, Source};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Minimum time between two `+typing=active` TAGMSGs for the same target, per the IRCv3 typing
/// notification spec's recommendation to throttle to roughly once every 3 seconds.
const TYPING_ACTIVE_THROTTLE: Duration = Duration::from_secs(3);

/// A user is considered recently active if they've sent a message within this long.
const RECENTLY_ACTIVE_WINDOW: Duration = Duration::from_secs(15 * 60);

use futures::{select, FutureExt, StreamExt};
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Clone)]
pub struct State {
    inner: Rc<RefCell<StateInner>>,
}

impl State {
    pub(crate) fn new(server_info: ServerInfo) -> State {
        State {
            inner: Rc::new(RefCell::new(StateInner::new(server_info))),
        }
    }

    /// A fresh TCP/TLS connection was established. Resets per-connection state and returns the
    /// outbound lines to kick off the handshake (capability negotiation).
    pub(crate) fn on_connection_established(&self) -> Vec<String> {
        self.inner.borrow_mut().on_connection_established()
    }

    /// New bytes arrived on the wire. Frames and dispatches as many complete messages as the
    /// buffer holds, returning the events raised and the lines that should be sent back.
    pub(crate) fn on_bytes_received(&self, bytes: &[u8]) -> (Vec<Event>, Vec<String>) {
        self.inner.borrow_mut().on_bytes_received(bytes)
    }

    /// The connection was closed, by us or by the remote end.
    pub(crate) fn on_connection_closed(&self) -> Event {
        Event::ConnectionClosed
    }

    pub(crate) fn set_outbound_channel(&self, snd: Sender<String>) {
        self.inner.borrow_mut().outbound_chan = Some(snd);
    }

    pub(crate) fn ping_line(&self) -> Option<String> {
        self.inner.borrow().servername.as_ref().map(|s| wire::ping(s))
    }

    // FIXME: This allocates a new String
    pub(crate) fn get_nick(&self) -> String {
        self.inner.borrow().current_nick.clone()
    }

    // FIXME: Maybe use RwLock instead of Mutex
    pub(crate) fn is_nick_accepted(&self) -> bool {
        self.inner.borrow().nick_accepted
    }

    pub(crate) fn get_usermask(&self) -> Option<String> {
        self.inner.borrow().usermask.clone()
    }

    pub(crate) fn set_away(&self, msg: Option<&str>) {
        self.inner.borrow_mut().away_status = msg.map(str::to_owned);
    }

    pub(crate) fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        self.inner.borrow().get_chan_nicks(chan)
    }

    pub(crate) fn leave_channel(&self, msg_chan: &mut Sender<Cmd>, chan: &ChanNameRef) {
        self.inner.borrow_mut().leave_channel(msg_chan, chan)
    }

    pub(crate) fn kill_join_tasks(&self) {
        self.inner.borrow_mut().kill_join_tasks();
    }

    /// Decide whether a typing-active notification should actually be sent to the wire right
    /// now, and if so, record that we sent it.
    pub(crate) fn try_send_typing_active(&self, target: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.should_send_active_typing_update(target) {
            inner.mark_sent_active_typing_update(target);
            true
        } else {
            false
        }
    }

    /// Decide whether a typing-done notification should actually be sent, and if so, record it.
    pub(crate) fn try_send_typing_done(&self, target: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.should_send_done_typing_update(target) {
            inner.mark_sent_done_typing_update(target);
            true
        } else {
            false
        }
    }
}

/// A known user, keyed by current nick in `StateInner::users`. Created lazily the first time we
/// see a reference to a nick (e.g. a bare nick in a NAMES reply, before we've seen a full mask for
/// them), and filled in further as richer `Source` values arrive.
#[derive(Debug, Default, Clone)]
struct User {
    source: Source,
    modes: HashSet<char>,
    is_away: bool,
    last_message_at: Option<Instant>,
}

impl User {
    fn is_recently_active(&self) -> bool {
        match self.last_message_at {
            Some(at) => at.elapsed() < RECENTLY_ACTIVE_WINDOW,
            None => false,
        }
    }
}

/// A user's presence in a specific channel.
#[derive(Debug, Default, Clone)]
struct Member {
    /// Membership mode letters held in this channel (e.g. `{'o', 'v'}`).
    prefixes: HashSet<char>,
    /// Most-privileged prefix *symbol* (e.g. `'@'`) for `prefixes`, in server-advertised rank
    /// order. `None` if `prefixes` is empty or none of them are in the `PREFIX=` table.
    highest_prefix: Option<char>,
    is_typing: bool,
    last_typing_update_at: Option<Instant>,
}

struct StateInner {
    /// Nicks to try, in this order.
    nicks: Vec<String>,

    /// NickServ password
    nickserv_ident: Option<String>,

    /// An index to `nicks`. When out of range we add `current_nick_idx - nicks.length()`
    /// underscores to the last nick in `nicks`
    current_nick_idx: usize,

    /// A cache of current nick, to avoid allocating new nicks when inventing new nicks with
    /// underscores.
    current_nick: String,

    /// Currently joined channels. Every channel we join will be added here to be able to re-join
    /// automatically on reconnect and channels we leave will be removed.
    ///
    /// This would be a `HashMap<String, ..>` but we want to join channels in the order the user
    /// specified, so using a `Vec`.
    chans: Vec<Chan>,

    /// Users we currently know about, keyed by current nick. A user exists here as soon as we've
    /// seen any reference to them (even a bare nick in a NAMES list); they're removed on QUIT and
    /// renamed (key changes) on NICK.
    users: HashMap<String, User>,

    /// Away reason if away mode is on. `None` otherwise.
    away_status: Option<String>,

    /// servername to be used in PING messages. Read from 002 RPL_YOURHOST. `None` until 002.
    servername: Option<String>,

    /// Our usermask given by the server. Currently only parsed after a JOIN, reply 396.
    ///
    /// Note that RPL_USERHOST (302) does not take cloaks into account, so we don't parse USERHOST
    /// responses to set this field.
    usermask: Option<String>,

    /// Do we have a nick yet? Try another nick on ERR_NICKNAMEINUSE (433) until we've got a nick.
    nick_accepted: bool,

    /// `PREFIX=` ISUPPORT token, e.g. `(ov)@+`. Defaults to the common `(ov)@+` until 005 is
    /// seen.
    prefix: Prefix,

    /// `CHANMODES=` ISUPPORT token, used to know which mode letters take an argument when
    /// iterating a MODE message.
    chanmodes: ChanModes,

    /// Network name, from the `NETWORK=` ISUPPORT token, if sent.
    network: Option<String>,

    /// Every RPL_ISUPPORT (005) token seen this connection, keyed by token name. `-KEY` tokens
    /// remove the corresponding entry instead of inserting one.
    supported: HashMap<String, Option<String>>,

    /// Capabilities actually negotiated (CAP ACK'd), not merely offered. Typing notifications and
    /// other capability-gated behavior check this, not the server's CAP LS advertisement.
    capabilities: HashMap<String, Option<String>>,

    /// Where we are in the connection handshake.
    handshake: HandshakeState,

    /// Currently open (one level deep) BATCHes, keyed by batch id, buffering the messages tagged
    /// with that batch id until the matching `BATCH -id` closes it, at which point they're
    /// re-dispatched in order. Nested batches aren't supported.
    open_batches: HashMap<String, Vec<Msg>>,

    /// MOTD lines (372) buffered between RPL_MOTDSTART (375) and RPL_ENDOFMOTD (376), flushed as
    /// a single batch of `Event::NewMessageFromServer` at 376.
    motd_buf: Vec<String>,

    /// Last time we sent a `+typing=active` TAGMSG to a given target, for throttling.
    last_typing_active: HashMap<String, Instant>,

    /// Whether we last told a given target we were typing (so we know whether a `+typing=done`
    /// is worth sending, rather than spamming "done" with nothing active).
    typing_active: HashSet<String>,

    /// Buffer for bytes read off the wire that don't yet form a complete line.
    parse_buf: Vec<u8>,

    /// Sender for outgoing lines, used only by the async channel-rejoin retry task spawned out of
    /// the otherwise-synchronous dispatcher. Set once per connection by the host.
    outbound_chan: Option<Sender<String>>,

    /// Server information
    server_info: ServerInfo,
}

/// Where we are in the post-connect handshake. `AwaitSaslPlus`/`AwaitSasl903` are only visited
/// when SASL was requested and offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Waiting for the server's CAP LS reply.
    AwaitCaps,
    /// Requested SASL, waiting for the empty `AUTHENTICATE +` continuation.
    AwaitSaslPlus,
    /// Sent SASL credentials, waiting for 903 (success) or 904-907 (failure).
    AwaitSasl903,
    /// CAP negotiation finished, waiting for RPL_WELCOME (001).
    AwaitWelcome,
    /// Got 001, about to auto-join configured channels.
    Joining,
    /// Fully connected; everything past this point is steady-state traffic.
    Running,
}

#[derive(Debug)]
struct Chan {
    /// Name of the channel
    name: ChanName,
    /// Channel modes that aren't membership prefixes, e.g. `{'n': None, 'k': Some("secret")}`.
    modes: HashMap<char, Option<String>>,
    /// Current topic, if known.
    topic: Option<String>,
    /// Members, keyed by current nick.
    members: HashMap<String, Member>,
    /// Buffer for names accumulated across one or more 353 (RPL_NAMREPLY) replies, flushed at 366
    /// (RPL_ENDOFNAMES).
    names_buf: Vec<String>,
    /// Channel joined state
    join_state: JoinState,
    /// Join attempts
    join_attempts: u8,
}

/// State transitions:
///    NotJoined -> Joining: When we get 477 for the channel
///    NotJoined -> Joined: When we get a JOIN message for the channel on first attempt
///    Joining -> Joined: When we get a JOIN message for the channel
///    Joining -> NotJoined: Connection reset
///    Joined -> NotJoined: Connection reset
///    Joined -> Joining: Unexpected/Invalid state
#[derive(Debug)]
enum JoinState {
    /// Initial state for Chan
    NotJoined,
    /// In the process of joining the channel
    Joining {
        /// Sender to kill the retry task if tab is closed
        stop_task: Sender<()>,
    },
    /// Successfully joined the channel
    Joined,
}

const MAX_JOIN_RETRIES: u8 = 3;

impl Chan {
    fn new(name: ChanName) -> Chan {
        Chan {
            name,
            modes: HashMap::new(),
            topic: None,
            members: HashMap::new(),
            names_buf: Vec::new(),
            join_state: JoinState::NotJoined,
            join_attempts: MAX_JOIN_RETRIES,
        }
    }

    fn reset(&mut self) {
        self.modes.clear();
        self.topic = None;
        self.members.clear();
        self.names_buf.clear();
        self.join_state = JoinState::NotJoined;
        self.join_attempts = MAX_JOIN_RETRIES;
    }

    fn set_joining(&mut self, stop_task: Sender<()>) {
        self.join_state = JoinState::Joining { stop_task }
    }

    /// Uses a retry.
    /// Returns number of retries left or None.
    fn retry_join(&mut self) -> Option<u8> {
        match self.join_attempts {
            0 => None,
            _ => {
                self.join_attempts -= 1;
                Some(self.join_attempts)
            }
        }
    }
}

/// Split a name as found in a NAMES reply (e.g. `@alice`) into its membership prefix mode letters
/// and the bare nick.
fn split_name_prefixes<'a>(raw: &'a str, prefix: &Prefix) -> (HashSet<char>, &'a str) {
    let mut modes = HashSet::new();
    let mut plain = raw;
    while let Some(c) = plain.chars().next() {
        match prefix.mode_for_symbol(c) {
            Some(mode) => {
                modes.insert(mode);
                plain = &plain[c.len_utf8()..];
            }
            None => break,
        }
    }
    (modes, plain)
}

fn recompute_highest_prefix(member: &mut Member, prefix: &Prefix) {
    let symbols: Vec<char> = member
        .prefixes
        .iter()
        .filter_map(|m| prefix.symbol_for_mode(*m))
        .collect();
    member.highest_prefix = prefix.highest(symbols.iter());
}

/// Toggle bare mode letters on/off as found in a plain (non-channel) MODE string, e.g. `+i-w`.
fn apply_umodestring(modes: &mut HashSet<char>, modestring: &str) {
    let mut add = true;
    for c in modestring.chars() {
        match c {
            '+' => add = true,
            '-' => add = false,
            m if add => {
                modes.insert(m);
            }
            m => {
                modes.remove(&m);
            }
        }
    }
}

impl StateInner {
    fn new(server_info: ServerInfo) -> StateInner {
        let current_nick = server_info.nicks[0].to_owned();
        let chans = server_info
            .auto_join
            .iter()
            .map(|s| Chan::new(s.to_owned()))
            .collect();
        StateInner {
            nicks: server_info.nicks.clone(),
            nickserv_ident: server_info.nickserv_ident.clone(),
            current_nick_idx: 0,
            current_nick,
            chans,
            users: HashMap::new(),
            away_status: None,
            servername: None,
            usermask: None,
            nick_accepted: false,
            prefix: isupport::default_prefix(),
            chanmodes: ChanModes::default(),
            network: None,
            supported: HashMap::new(),
            capabilities: HashMap::new(),
            handshake: HandshakeState::AwaitCaps,
            open_batches: HashMap::new(),
            motd_buf: Vec::new(),
            last_typing_active: HashMap::new(),
            typing_active: HashSet::new(),
            parse_buf: Vec::with_capacity(1024),
            outbound_chan: None,
            server_info,
        }
    }

    fn reset(&mut self) {
        self.nick_accepted = false;
        self.nicks = self.server_info.nicks.clone();
        self.current_nick_idx = 0;
        self.current_nick = self.nicks[0].clone();
        // Only reset the values here; the key set will be used to join channels
        for chan in &mut self.chans {
            chan.reset();
        }
        self.users.clear();
        self.servername = None;
        self.usermask = None;
        self.prefix = isupport::default_prefix();
        self.chanmodes = ChanModes::default();
        self.network = None;
        self.supported.clear();
        self.capabilities.clear();
        self.handshake = HandshakeState::AwaitCaps;
        self.open_batches.clear();
        self.motd_buf.clear();
        self.parse_buf.clear();
    }

    fn on_connection_established(&mut self) -> Vec<String> {
        self.reset();
        vec![wire::cap_ls()]
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) -> (Vec<Event>, Vec<String>) {
        self.parse_buf.extend_from_slice(bytes);
        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        loop {
            match wire::parse_irc_msg(&mut self.parse_buf) {
                None => break,
                Some(Err(err)) => ev_out.push(Event::WireError(err)),
                Some(Ok(msg)) => self.dispatch_message(msg, &mut ev_out, &mut line_out),
            }
        }
        (ev_out, line_out)
    }

    fn introduce(&mut self, line_out: &mut Vec<String>) {
        if let Some(ref pass) = self.server_info.pass {
            line_out.push(wire::pass(pass));
        }
        line_out.push(wire::nick(&self.current_nick));
        line_out.push(wire::user(&self.nicks[0], &self.server_info.realname));
    }

    fn get_next_nick(&mut self) -> &str {
        self.current_nick_idx += 1;
        if self.current_nick_idx >= self.nicks.len() {
            let n_underscores = self.current_nick_idx - self.nicks.len() + 1;
            let mut new_nick = self.nicks.last().unwrap().to_string();
            for _ in 0..n_underscores {
                new_nick.push('_');
            }
            self.current_nick = new_nick;
        } else {
            self.current_nick = self.nicks[self.current_nick_idx].clone();
        }
        &self.current_nick
    }

    /// Look up a user by nick, creating an empty entry if we've never seen them before.
    fn user_mut_by_nick(&mut self, nick: &str) -> &mut User {
        self.users.entry(nick.to_owned()).or_default()
    }

    /// Record a richer `Source` for a user the first time we see one (a bare nick in a NAMES
    /// reply won't have a user/host; a JOIN or PRIVMSG prefix will).
    fn touch_user(&mut self, source: &Source) -> Option<&mut User> {
        if source.nick.is_empty() {
            return None;
        }
        let user = self.user_mut_by_nick(&source.nick);
        if !source.user.is_empty() || !source.host.is_empty() {
            user.source = source.clone();
        } else if user.source.nick.is_empty() {
            user.source.nick = source.nick.clone();
        }
        Some(user)
    }

    /// Toggle a user's away status, emitting `GoneAway`/`BackFromAway` for every channel they're a
    /// member of, but only when the status actually changed.
    fn set_user_away(
        &mut self,
        nick: &str,
        away: bool,
        away_message: Option<String>,
        ev_out: &mut Vec<Event>,
    ) {
        let changed = {
            let user = self.user_mut_by_nick(nick);
            let changed = user.is_away != away;
            user.is_away = away;
            changed
        };
        if !changed {
            return;
        }
        for chan in &self.chans {
            if chan.members.contains_key(nick) {
                if away {
                    ev_out.push(Event::GoneAway {
                        chan: chan.name.clone(),
                        nick: nick.to_owned(),
                        away_message: away_message.clone(),
                    });
                } else {
                    ev_out.push(Event::BackFromAway {
                        chan: chan.name.clone(),
                        nick: nick.to_owned(),
                    });
                }
            }
        }
    }

    /// Intercepts BATCH markers and batched messages, buffering the latter until their batch
    /// closes; otherwise dispatches normally and raises `Event::Msg` for the message itself.
    fn dispatch_message(&mut self, mut msg: Msg, ev_out: &mut Vec<Event>, line_out: &mut Vec<String>) {
        if let wire::Cmd::BATCH { id, start } = &msg.cmd {
            match start {
                Some(_) => {
                    self.open_batches.insert(id.clone(), Vec::new());
                }
                None => {
                    if let Some(buffered) = self.open_batches.remove(id) {
                        for buffered_msg in buffered {
                            self.dispatch_message(buffered_msg, ev_out, line_out);
                        }
                    }
                }
            }
            return;
        }

        if let Some(batch_id) = msg.tags.get("batch").map(str::to_owned) {
            if let Some(buf) = self.open_batches.get_mut(&batch_id) {
                buf.push(msg);
                return;
            }
        }

        self.update(&mut msg, ev_out, line_out);
        ev_out.push(Event::Msg(msg));
    }

    fn update(&mut self, msg: &mut Msg, ev_out: &mut Vec<Event>, line_out: &mut Vec<String>) {
        let Msg {
            tags: ref msg_tags,
            ref source,
            ref cmd,
        } = msg;

        use wire::Cmd::*;
        match cmd {
            // PING: Send PONG
            PING { server } => {
                line_out.push(wire::pong(server));
            }

            // JOIN: If this is us then update usermask, create/reset the channel state, query
            // its modes, and optionally WHO it (to learn away status when away-notify isn't
            // negotiated). If someone else, add them as a member.
            JOIN { chan } => {
                if source.nick == self.current_nick {
                    if !source.user.is_empty() {
                        self.usermask = Some(format!("{}!{}", source.nick, source.user));
                    }
                    match utils::find_idx(&self.chans, |c| c.name == *chan) {
                        None => {
                            let mut new_chan = Chan::new(chan.to_owned());
                            new_chan.join_state = JoinState::Joined;
                            self.chans.push(new_chan);
                        }
                        Some(idx) => {
                            self.chans[idx].reset();
                            self.chans[idx].join_state = JoinState::Joined;
                        }
                    }
                    line_out.push(wire::mode_query(chan.display()));
                    if !self.capabilities.contains_key("away-notify") {
                        line_out.push(wire::who(chan.display()));
                    }
                    ev_out.push(Event::ChannelJoined {
                        chan: chan.to_owned(),
                        nick: self.current_nick.clone(),
                    });
                } else {
                    self.touch_user(source);
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        self.chans[chan_idx]
                            .members
                            .insert(source.nick.clone(), Member::default());
                        ev_out.push(Event::ChannelJoined {
                            chan: chan.to_owned(),
                            nick: source.nick.clone(),
                        });
                    } else {
                        debug!("Can't find channel state for JOIN: {:?}", cmd);
                    }
                }
            }

            // PART: if a departing member was typing, surface that before the PART itself. Our
            // own PART drops the whole channel with no trailing typing event.
            PART { chan, msg: reason } => {
                if source.nick == self.current_nick {
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        self.chans.remove(chan_idx);
                    } else {
                        debug!("Can't find channel state: {}", chan.display());
                    }
                    ev_out.push(Event::ChannelPart {
                        chan: chan.to_owned(),
                        nick: source.nick.clone(),
                    });
                } else if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                    if let Some(member) = self.chans[chan_idx].members.get(&source.nick) {
                        if member.is_typing {
                            ev_out.push(Event::ChannelTyping {
                                chan: chan.to_owned(),
                            });
                        }
                    }
                    self.chans[chan_idx].members.remove(&source.nick);
                    ev_out.push(Event::ChannelPart {
                        chan: chan.to_owned(),
                        nick: source.nick.clone(),
                    });
                } else {
                    debug!("Can't find channel state for PART: {:?}", cmd);
                }
                let _ = reason;
            }

            // QUIT: update every channel the user was a member of.
            QUIT { chans: _, msg: reason } => {
                if source.nick.is_empty() {
                    return;
                }
                let nick = source.nick.clone();
                for chan in &self.chans {
                    if let Some(member) = chan.members.get(&nick) {
                        if member.is_typing {
                            ev_out.push(Event::ChannelTyping {
                                chan: chan.name.to_owned(),
                            });
                        }
                    }
                }
                for chan in &mut self.chans {
                    if chan.members.remove(&nick).is_some() {
                        ev_out.push(Event::Quit {
                            chan: chan.name.to_owned(),
                            nick: nick.clone(),
                            reason: reason.clone(),
                        });
                    }
                }
                self.users.remove(&nick);
            }

            // KICK: same channel-state update as a PART, whether we're the kicked party or a
            // bystander.
            KICK {
                chan,
                nick,
                comment,
            } => {
                if nick == &self.current_nick {
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        self.chans.remove(chan_idx);
                    }
                    ev_out.push(Event::ChannelKick {
                        chan: chan.to_owned(),
                        nick: source.nick.clone(),
                        kicked_nick: nick.clone(),
                        reason: comment.clone(),
                    });
                } else if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                    if let Some(member) = self.chans[chan_idx].members.get(nick) {
                        if member.is_typing {
                            ev_out.push(Event::ChannelTyping {
                                chan: chan.to_owned(),
                            });
                        }
                    }
                    self.chans[chan_idx].members.remove(nick);
                    ev_out.push(Event::ChannelKick {
                        chan: chan.to_owned(),
                        nick: source.nick.clone(),
                        kicked_nick: nick.clone(),
                        reason: comment.clone(),
                    });
                }
            }

            // MODE: membership-prefix changes update per-channel member state; other channel
            // modes update `Chan::modes`; a target that isn't a channel is our own user modes.
            MODE {
                target,
                modestring,
                args,
            } => {
                let chan = ChanNameRef::new(target);
                if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                    let prefix_modes = self.prefix.modes.clone();
                    let prefix = self.prefix.clone();
                    let changes: Vec<wire::modes::ModeChange> =
                        wire::modes::iter_modestring(modestring, args, &self.chanmodes, &prefix_modes)
                            .collect();
                    for change in changes {
                        if prefix_modes.contains(&change.mode) {
                            if let Some(nick) = &change.arg {
                                let member = self.chans[chan_idx]
                                    .members
                                    .entry(nick.clone())
                                    .or_default();
                                match change.sign {
                                    wire::modes::Sign::Add => {
                                        member.prefixes.insert(change.mode);
                                    }
                                    wire::modes::Sign::Remove => {
                                        member.prefixes.remove(&change.mode);
                                    }
                                }
                                recompute_highest_prefix(member, &prefix);
                            }
                        } else {
                            let entry = self.chans[chan_idx].modes.entry(change.mode);
                            match change.sign {
                                wire::modes::Sign::Add => {
                                    entry.or_insert(None);
                                    self.chans[chan_idx]
                                        .modes
                                        .insert(change.mode, change.arg.clone());
                                }
                                wire::modes::Sign::Remove => {
                                    self.chans[chan_idx].modes.remove(&change.mode);
                                }
                            }
                        }
                    }
                    let modes_display = modestring.clone();
                    ev_out.push(Event::ChannelMode {
                        chan: chan.to_owned(),
                        modes: modes_display,
                    });
                } else {
                    // A plain nick target: our own user modes.
                    let user = self.user_mut_by_nick(target);
                    apply_umodestring(&mut user.modes, modestring);
                }
            }

            // BATCH markers are intercepted in `dispatch_message` before `update` ever sees them.
            BATCH { .. } => {}

            // TAGMSG: currently only used for typing notifications, gated on `message-tags`
            // having actually been negotiated.
            TAGMSG { target } => {
                if source.nick.is_empty() {
                    return;
                }
                if !self.capabilities.contains_key("message-tags") {
                    return;
                }
                let Some(typing) = msg_tags.get("+typing").and_then(TypingStatus::parse) else {
                    return;
                };
                let chan = ChanNameRef::new(target);
                if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                    if !self.chans[chan_idx].members.contains_key(&self.current_nick) {
                        return;
                    }
                    let member = self.chans[chan_idx]
                        .members
                        .entry(source.nick.clone())
                        .or_default();
                    let is_typing = !matches!(typing, TypingStatus::Done);
                    if member.is_typing != is_typing {
                        member.is_typing = is_typing;
                        member.last_typing_update_at = Some(Instant::now());
                        ev_out.push(Event::ChannelTyping {
                            chan: chan.to_owned(),
                        });
                    }
                }
            }

            // AWAY: another user's away status changed, seen via `away-notify`. Our own AWAY
            // reply from the server (if echoed) is handled the same way.
            AWAY { msg: away_msg } => {
                if source.nick.is_empty() {
                    return;
                }
                let nick = source.nick.clone();
                let away = away_msg.is_some();
                let away_message = away_msg.clone();
                self.set_user_away(&nick, away, away_message, ev_out);
            }

            // 305/306: our own away status, via RPL_UNAWAY/RPL_NOWAWAY.
            Reply { num: 305, .. } => {
                let nick = self.current_nick.clone();
                self.set_user_away(&nick, false, None, ev_out);
            }
            Reply { num: 306, .. } => {
                let nick = self.current_nick.clone();
                let msg_txt = self.away_status.clone();
                self.set_user_away(&nick, true, msg_txt, ev_out);
            }

            // 221: RPL_UMODEIS, our own user modes.
            Reply { num: 221, params } => {
                if let Some(modestring) = params.get(1) {
                    let nick = self.current_nick.clone();
                    let user = self.user_mut_by_nick(&nick);
                    apply_umodestring(&mut user.modes, modestring);
                }
            }

            // 324: RPL_CHANNELMODEIS, a full snapshot of a channel's (non-membership) modes.
            Reply { num: 324, params } => {
                if let (Some(chan_name), Some(modestring)) = (params.get(1), params.get(2)) {
                    let chan = ChanNameRef::new(chan_name);
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        self.chans[chan_idx].modes.clear();
                        let prefix_modes = self.prefix.modes.clone();
                        let args: Vec<String> = params.get(3..).unwrap_or(&[]).to_vec();
                        for change in
                            wire::modes::iter_modestring(modestring, &args, &self.chanmodes, &prefix_modes)
                        {
                            if change.sign == wire::modes::Sign::Add {
                                self.chans[chan_idx].modes.insert(change.mode, change.arg);
                            }
                        }
                    }
                }
            }

            // 332/333: topic and topic-who-time.
            Reply { num: 332, params } => {
                if let (Some(chan_name), Some(topic)) = (params.get(1), params.get(2)) {
                    let chan = ChanNameRef::new(chan_name);
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        self.chans[chan_idx].topic = Some(topic.clone());
                    }
                    ev_out.push(Event::ChannelTopic {
                        chan: chan.to_owned(),
                        topic: topic.clone(),
                    });
                }
            }
            Reply { num: 333, params } => {
                if let (Some(chan_name), Some(setter)) = (params.get(1), params.get(2)) {
                    let chan = ChanNameRef::new(chan_name);
                    let set_by = wire::parse_source(setter).display().to_owned();
                    ev_out.push(Event::ChannelTopicWhoTime {
                        chan: chan.to_owned(),
                        set_by,
                        set_at: params.get(3).and_then(|t| t.parse::<i64>().ok()),
                    });
                }
            }

            // 352/315: WHO reply and end-of-WHO. We only care about the away flag (G/H).
            Reply { num: 352, params } => {
                if let (Some(nick), Some(flags)) = (params.get(5), params.get(6)) {
                    let away = flags.starts_with('G');
                    self.set_user_away(nick, away, None, ev_out);
                }
            }
            Reply { num: 315, .. } => {}

            // 353/366: NAMES reply, buffered across 353s and flushed at 366.
            Reply { num: 353, params } => {
                if let (Some(chan_name), Some(names)) = (params.get(2), params.get(3)) {
                    let chan = ChanNameRef::new(chan_name);
                    let idx = match utils::find_idx(&self.chans, |c| c.name == *chan) {
                        Some(idx) => idx,
                        None => {
                            self.chans.push(Chan::new(chan.to_owned()));
                            self.chans.len() - 1
                        }
                    };
                    for name in names.split_whitespace() {
                        self.chans[idx].names_buf.push(name.to_owned());
                    }
                }
            }
            Reply { num: 366, params } => {
                if let Some(chan_name) = params.get(1) {
                    let chan = ChanNameRef::new(chan_name);
                    if let Some(idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        let names = std::mem::take(&mut self.chans[idx].names_buf);
                        let prefix = self.prefix.clone();
                        let mut nicks = Vec::with_capacity(names.len());
                        for raw in &names {
                            let (modes, nick) = split_name_prefixes(raw, &prefix);
                            let mut member = Member {
                                prefixes: modes,
                                ..Member::default()
                            };
                            recompute_highest_prefix(&mut member, &prefix);
                            self.chans[idx].members.insert(nick.to_owned(), member);
                            self.user_mut_by_nick(nick);
                            nicks.push(nick.to_owned());
                        }
                        nicks.sort_unstable_by_key(|n| n.to_lowercase());
                        ev_out.push(Event::ChannelNames {
                            chan: chan.to_owned(),
                            nicks,
                        });
                    }
                }
            }

            // PRIVMSG/NOTICE carrying a CTCP payload: surface it as its own event, in addition
            // to the raw `Event::Msg` the caller sends after this returns.
            PRIVMSG {
                target,
                msg: text,
                is_notice,
                ctcp: Some(ctcp),
            } => {
                if source.nick.is_empty() {
                    return;
                }
                ev_out.push(Event::Ctcp {
                    nick: source.nick.clone(),
                    target: target.clone(),
                    ctcp: ctcp.clone(),
                    is_reply: *is_notice,
                    text: text.clone(),
                });
            }

            // Plain PRIVMSG/NOTICE: update sender liveness, surface as a typed event, and clear
            // then re-raise the sender's typing indicator (typing is cleared, unlike PART/KICK/
            // QUIT, *after* the message is surfaced, since a new message supersedes "typing").
            PRIVMSG {
                target,
                msg: text,
                is_notice: _,
                ctcp: None,
            } => {
                if source.nick.is_empty() {
                    ev_out.push(Event::NewMessageFromServer { msg: text.clone() });
                    return;
                }
                self.touch_user(source);
                {
                    let user = self.user_mut_by_nick(&source.nick);
                    user.last_message_at = Some(Instant::now());
                }
                ev_out.push(Event::NewMessage {
                    target: target.clone(),
                    nick: source.nick.clone(),
                    msg: text.clone(),
                });
                if let wire::MsgTarget::Chan(chan) = target {
                    if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                        if let Some(member) = self.chans[chan_idx].members.get_mut(&source.nick) {
                            if member.is_typing {
                                member.is_typing = false;
                                ev_out.push(Event::ChannelTyping {
                                    chan: chan.to_owned(),
                                });
                            }
                        }
                    }
                }
            }

            // TOPIC: a live topic change (not the 332 snapshot on join).
            TOPIC { chan, topic } => {
                if let Some(chan_idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
                    self.chans[chan_idx].topic = Some(topic.clone());
                }
                ev_out.push(Event::ChannelTopic {
                    chan: chan.to_owned(),
                    topic: topic.clone(),
                });
            }

            // 396: Try to set usermask.
            Reply { num: 396, params } => {
                // :hobana.freenode.net 396 wisp haskell/developer/wisp
                // :is now your hidden host (set by services.)
                if params.len() == 3 {
                    let usermask =
                        format!("{}!~{}@{}", self.current_nick, self.nicks[0], params[1]);
                    self.usermask = Some(usermask);
                }
            }

            // Reply 477 when user needs to be identified with NickServ to join a channel
            // ex. Reply { num: 477, params: ["<your_nick>", "<channel name>", "<Server reply message>"] }
            Reply { num: 477, params } => {
                if let (Some(channel), Some(msg_477)) = (params.get(1), params.get(2)) {
                    let channel = ChanNameRef::new(channel);
                    ev_out.push(Event::Msg(wire::Msg {
                        tags: wire::Tags::default(),
                        source: source.clone(),
                        cmd: wire::Cmd::PRIVMSG {
                            ctcp: None,
                            is_notice: true,
                            msg: msg_477.clone(),
                            target: wire::MsgTarget::Chan(channel.to_owned()),
                        },
                    }));
                    if self.nickserv_ident.is_some() {
                        let create_message = |msg: String| Event::ChannelJoinError {
                            chan: channel.to_owned(),
                            msg,
                        };
                        if let Some(idx) = utils::find_idx(&self.chans, |c| c.name == *channel) {
                            let outbound_chan = self.outbound_chan.clone();
                            let chan = &mut self.chans[idx];
                            if let Some(retries) = chan.retry_join() {
                                let retry_msg = format!(
                                    "Attempting to rejoin {} in 10 seconds... ({}/{})",
                                    channel.display(),
                                    MAX_JOIN_RETRIES - retries,
                                    MAX_JOIN_RETRIES
                                );
                                ev_out.push(create_message(retry_msg));
                                if let Some(snd_irc_msg) = outbound_chan {
                                    let (snd_abort, rcv_abort) = tokio::sync::mpsc::channel(1);
                                    match &mut chan.join_state {
                                        JoinState::NotJoined => chan.set_joining(snd_abort),
                                        JoinState::Joining { stop_task, .. } => *stop_task = snd_abort,
                                        JoinState::Joined => {
                                            error!("Unexpected JoinState for channel.");
                                            return;
                                        }
                                    }
                                    tokio::task::spawn_local(retry_channel_join(
                                        channel.to_owned(),
                                        snd_irc_msg,
                                        rcv_abort,
                                    ));
                                } else {
                                    warn!("No outbound channel set; can't schedule channel rejoin.");
                                }
                            } else {
                                let no_retries_msg =
                                    format!("Unable to join {}.", channel.display());
                                ev_out.push(create_message(no_retries_msg));
                            }
                        } else {
                            warn!("Could not find channel in server state channel list.");
                        }
                    } else {
                        debug!("Received 477 reply but nickserv_ident is not configured.");
                    }
                } else {
                    warn!("Could not parse 477 reply: {:?}", cmd);
                }
            }

            // 302: Try to set usermask.
            Reply { num: 302, params } => {
                // 302 RPL_USERHOST
                // :ircd.stealth.net 302 yournick :syrk=+syrk@millennium.stealth.net
                let param = &params[1];
                match param.find('=') {
                    None => {
                        warn!("Could not parse 302 RPL_USERHOST to set usermask.");
                    }
                    Some(mut i) => {
                        if param.as_bytes().get(i + 1) == Some(&b'+')
                            || param.as_bytes().get(i + 1) == Some(&b'-')
                        {
                            i += 1;
                        }
                        let usermask = (&param[i..]).trim();
                        self.usermask = Some(usermask.to_owned());
                    }
                }
            }

            // RPL_WELCOME: nick accepted, NickServ auth, auto-join right away, then steady state.
            Reply { num: 001, .. } => {
                ev_out.push(Event::Connected);
                ev_out.push(Event::NickChange {
                    new_nick: self.current_nick.clone(),
                });
                self.nick_accepted = true;
                if let Some(ref pwd) = self.nickserv_ident {
                    line_out.push(wire::privmsg("NickServ", &format!("identify {}", pwd)));
                }
                self.handshake = HandshakeState::Joining;
                let chans: Vec<&ChanNameRef> = self.chans.iter().map(|c| c.name.as_ref()).collect();
                if !chans.is_empty() {
                    line_out.push(wire::join(chans.into_iter()));
                }
                self.handshake = HandshakeState::Running;
            }

            // RPL_YOURHOST: Set servername
            Reply { num: 002, params } => {
                match parse_servername(source, params) {
                    None => {
                        error!("Could not parse server name in 002 RPL_YOURHOST message.");
                    }
                    Some(servername) => {
                        self.servername = Some(servername);
                    }
                }
            }

            // ERR_NICKNAMEINUSE: Try another nick if we don't have a nick yet.
            Reply { num: 433, .. } => {
                if !self.nick_accepted {
                    let new_nick = self.get_next_nick().to_owned();
                    ev_out.push(Event::NickChange {
                        new_nick: new_nick.clone(),
                    });
                    line_out.push(wire::nick(&new_nick));
                }
            }

            // NICK message sent from the server, either for us or someone else.
            NICK {
                nick: new_nick,
                chans: _,
            } => {
                if source.nick.is_empty() {
                    return;
                }
                let old_nick = source.nick.clone();

                if old_nick == self.current_nick {
                    ev_out.push(Event::NickChange {
                        new_nick: new_nick.to_owned(),
                    });

                    match utils::find_idx(&self.nicks, |nick| nick == new_nick) {
                        None => {
                            self.nicks.push(new_nick.to_owned());
                            self.current_nick_idx = self.nicks.len() - 1;
                        }
                        Some(nick_idx) => {
                            self.current_nick_idx = nick_idx;
                        }
                    }

                    self.current_nick = new_nick.to_owned();

                    if let Some(ref pwd) = self.nickserv_ident {
                        line_out.push(wire::privmsg("NickServ", &format!("identify {}", pwd)));
                    }
                }

                if let Some(mut user) = self.users.remove(&old_nick) {
                    user.source.nick = new_nick.to_owned();
                    if !user.source.user.is_empty() || !user.source.host.is_empty() {
                        user.source.raw =
                            format!("{}!{}@{}", new_nick, user.source.user, user.source.host);
                    }
                    self.users.insert(new_nick.to_owned(), user);
                }

                for chan in &mut self.chans {
                    if let Some(member) = chan.members.remove(&old_nick) {
                        chan.members.insert(new_nick.to_owned(), member);
                        ev_out.push(Event::NickChanged {
                            chan: chan.name.to_owned(),
                            old_nick: old_nick.clone(),
                            new_nick: new_nick.to_owned(),
                        });
                    }
                }
            }

            // RPL_MOTDSTART: clear the MOTD buffer.
            Reply { num: 375, .. } => {
                self.motd_buf.clear();
            }

            // RPL_MOTD: buffer a MOTD line.
            Reply { num: 372, params } => {
                if let Some(line) = params.get(1) {
                    self.motd_buf.push(line.clone());
                }
            }

            // RPL_ENDOFMOTD: flush the MOTD, resend away status.
            Reply { num: 376, .. } => {
                for line in std::mem::take(&mut self.motd_buf) {
                    ev_out.push(Event::NewMessageFromServer { msg: line });
                }
                if self.away_status.is_some() {
                    line_out.push(wire::away(self.away_status.as_deref()));
                }
            }

            // SASL authentication / capability negotiation.
            CAP {
                client: _,
                subcommand,
                params,
            } => {
                match subcommand.as_ref() {
                    "ACK" => {
                        for cap in params.iter() {
                            let (name, val) = isupport::parse_token(cap);
                            self.capabilities.insert(name.to_owned(), val.map(str::to_owned));
                        }
                        if params.iter().any(|cap| cap.as_str() == "sasl") {
                            let mechanism = match self.server_info.sasl_auth.as_ref() {
                                Some(SASLAuth::External(_)) => "EXTERNAL",
                                _ => "PLAIN",
                            };
                            line_out.push(wire::authenticate(mechanism));
                            self.handshake = HandshakeState::AwaitSaslPlus;
                            // cap_end is sent once we see 903 (success) or 904-907 (failure).
                        } else {
                            line_out.push(wire::cap_end());
                            self.handshake = HandshakeState::AwaitWelcome;
                        }
                    }
                    "NAK" => {
                        line_out.push(wire::cap_end());
                        self.handshake = HandshakeState::AwaitWelcome;
                    }
                    "LS" => {
                        self.introduce(line_out);
                        // Request every capability we know how to use that the server offers.
                        let wanted = [
                            "sasl",
                            "message-tags",
                            "echo-message",
                            "server-time",
                            "batch",
                            "away-notify",
                            "multi-prefix",
                        ];
                        let offered: Vec<&str> = wanted
                            .iter()
                            .copied()
                            .filter(|cap| params.iter().any(|p| p.as_str() == *cap))
                            .collect();
                        if !offered.is_empty() {
                            line_out.push(wire::cap_req(&offered));
                            if !offered.contains(&"sasl") {
                                line_out.push(wire::cap_end());
                                self.handshake = HandshakeState::AwaitWelcome;
                            }
                            // Otherwise wait for CAP ACK/NAK before ending negotiation.
                        } else {
                            line_out.push(wire::cap_end());
                            self.handshake = HandshakeState::AwaitWelcome;
                        }
                    }
                    _ => {}
                }
            }

            AUTHENTICATE { ref param } => {
                if param.as_str() == "+" {
                    match self.server_info.sasl_auth.as_ref() {
                        Some(SASLAuth::Plain { username, password }) => {
                            let msg = format!("{}\x00{}\x00{}", username, username, password);
                            line_out.push(wire::authenticate(&base64::encode(&msg)));
                        }
                        Some(SASLAuth::External(_)) => {
                            line_out.push(wire::authenticate("+"));
                        }
                        None => {}
                    }
                    self.handshake = HandshakeState::AwaitSasl903;
                }
            }

            Reply { num: 903, .. } => {
                // RPL_SASLSUCCESS
                line_out.push(wire::cap_end());
                self.handshake = HandshakeState::AwaitWelcome;
            }

            Reply {
                num: 904..=907, ..
            } => {
                // ERR_SASLFAIL, ERR_SASLTOOLONG, ERR_SASLABORTED, ERR_SASLALREADY: give up on
                // SASL and continue with capability negotiation.
                warn!("SASL authentication failed ({:?})", cmd);
                line_out.push(wire::cap_end());
                self.handshake = HandshakeState::AwaitWelcome;
            }

            // RPL_ISUPPORT: remember every token, applying side effects for the ones we act on.
            // `-KEY` tokens (`isupport::parse_token` doesn't special-case the leading `-`) unset
            // a previously-seen entry instead of inserting one.
            Reply { num: 005, params } => {
                for token in params.iter().skip(1).filter(|t| !t.contains(' ')) {
                    let (key, val) = isupport::parse_token(token);
                    if let Some(bare) = key.strip_prefix('-') {
                        self.supported.remove(bare);
                        continue;
                    }
                    self.supported.insert(key.to_owned(), val.map(str::to_owned));
                    match (key, val) {
                        ("PREFIX", Some(v)) => {
                            if let Some(p) = isupport::parse_prefix(v) {
                                self.prefix = p;
                            }
                        }
                        ("CHANMODES", Some(v)) => {
                            if let Some(cm) = isupport::parse_chanmodes(v) {
                                self.chanmodes = cm;
                            }
                        }
                        ("NETWORK", Some(v)) => {
                            self.network = Some(v.to_owned());
                        }
                        _ => {}
                    }
                }
            }

            ERROR { .. } => {}

            // Ignore the rest
            _ => {}
        }
    }

    /// Returns nicks in a channel sorted by membership rank (highest prefix first), then
    /// alphabetically within a rank.
    fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        match utils::find_idx(&self.chans, |c| c.name == *chan) {
            None => {
                error!("Could not find channel index in get_chan_nicks.");
                vec![]
            }
            Some(chan_idx) => {
                let mut nicks: Vec<(String, usize)> = self.chans[chan_idx]
                    .members
                    .iter()
                    .map(|(nick, member)| (nick.clone(), self.member_rank(member)))
                    .collect();
                nicks.sort_unstable_by(|(nick_a, rank_a), (nick_b, rank_b)| {
                    rank_a
                        .cmp(rank_b)
                        .then_with(|| nick_a.to_lowercase().cmp(&nick_b.to_lowercase()))
                });
                nicks.into_iter().map(|(nick, _)| nick).collect()
            }
        }
    }

    /// Rank of a member's highest prefix symbol, lower is higher-ranked. Members with no
    /// recognized prefix sort last.
    fn member_rank(&self, member: &Member) -> usize {
        match member.highest_prefix {
            Some(symbol) => self
                .prefix
                .symbols
                .iter()
                .position(|s| *s == symbol)
                .unwrap_or(self.prefix.symbols.len()),
            None => self.prefix.symbols.len(),
        }
    }

    /// If channel is in Joining state cancel Joining task, otherwise sent part message
    fn leave_channel(&mut self, msg_chan: &mut Sender<Cmd>, chan: &ChanNameRef) {
        if let Some(idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
            match &mut self.chans[idx].join_state {
                JoinState::NotJoined => {}
                JoinState::Joining { stop_task, .. } => {
                    debug!("Aborting task to retry joining {}", chan.display());
                    let _ = stop_task.try_send(());
                }
                JoinState::Joined => msg_chan.try_send(Cmd::Msg(wire::part(chan))).unwrap(),
            }
        }
    }

    /// Should we send a `+typing=active` TAGMSG for `target` right now? Only if `message-tags`
    /// was negotiated, the channel is known, and we're a member of it; and then the first time,
    /// or at most once every `TYPING_ACTIVE_THROTTLE` after that.
    fn should_send_active_typing_update(&self, target: &str) -> bool {
        if !self.typing_allowed(target) {
            return false;
        }
        match self.last_typing_active.get(target) {
            None => true,
            Some(last) => last.elapsed() >= TYPING_ACTIVE_THROTTLE,
        }
    }

    fn mark_sent_active_typing_update(&mut self, target: &str) {
        self.last_typing_active
            .insert(target.to_owned(), Instant::now());
        self.typing_active.insert(target.to_owned());
    }

    /// Should we send a `+typing=done` TAGMSG for `target`? Only if we last told them we were
    /// actively typing (and the capability/membership gate still holds).
    fn should_send_done_typing_update(&self, target: &str) -> bool {
        self.typing_allowed(target) && self.typing_active.contains(target)
    }

    fn mark_sent_done_typing_update(&mut self, target: &str) {
        self.typing_active.remove(target);
        self.last_typing_active.remove(target);
    }

    fn typing_allowed(&self, target: &str) -> bool {
        if !self.capabilities.contains_key("message-tags") {
            return false;
        }
        let chan = ChanNameRef::new(target);
        match utils::find_idx(&self.chans, |c| c.name == *chan) {
            Some(idx) => self.chans[idx].members.contains_key(&self.current_nick),
            None => false,
        }
    }

    /// Kills all tasks that are trying to join channels
    fn kill_join_tasks(&mut self) {
        for chan in &mut self.chans {
            if let JoinState::Joining { stop_task } = &mut chan.join_state {
                let _ = stop_task.try_send(());
            }
        }
    }
}

async fn retry_channel_join(
    channel: ChanName,
    snd_irc_msg: Sender<String>,
    rcv_abort: Receiver<()>,
) {
    debug!("Attempting to re-join channel {}", channel.display());

    use tokio::time::{sleep, Duration};

    let mut delay = sleep(Duration::from_secs(10)).fuse();
    let mut rcv_abort = rcv_abort.fuse();

    select! {
        () = delay => {
            snd_irc_msg.try_send(wire::join(std::iter::once(channel.as_ref()))).unwrap();
        },
        _ = rcv_abort.next() => {
            // Channel tab was closed
        },
    };
}

const SERVERNAME_PREFIX: &str = "Your host is ";
const SERVERNAME_PREFIX_LEN: usize = SERVERNAME_PREFIX.len();

/// Parse server name from RPL_YOURHOST reply or fallback to using the source of the message. See
/// https://www.irc.com/dev/docs/refs/numerics/002.html for more info.
fn parse_servername(source: &Source, params: &[String]) -> Option<String> {
    parse_yourhost_msg(params).or_else(|| parse_server_source(source))
}

/// Try to parse servername in a 002 RPL_YOURHOST reply params.
fn parse_yourhost_msg(params: &[String]) -> Option<String> {
    let msg = params.get(1).or_else(|| params.get(0))?;
    if msg.len() >= SERVERNAME_PREFIX_LEN && &msg[..SERVERNAME_PREFIX_LEN] == SERVERNAME_PREFIX {
        let slice1 = &msg[SERVERNAME_PREFIX_LEN..];
        let servername_ends = slice1.find('[').or_else(|| slice1.find(','))?;
        Some((&slice1[..servername_ends]).to_owned())
    } else {
        None
    }
}

/// Get the server name from a message source, when it wasn't a full user mask.
fn parse_server_source(source: &Source) -> Option<String> {
    if source.nick.is_empty() && !source.host.is_empty() {
        Some(source.host.clone())
    } else {
        None
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_servername_1() {
        // IRC standard
        let source = Source {
            raw: "card.freenode.net".to_string(),
            nick: String::new(),
            user: String::new(),
            host: "card.freenode.net".to_string(),
        };
        let params = vec![
            "nickname".to_string(),
            "Your host is card.freenode.net[38.229.70.22/6697], running version ircd-seven-1.1.9"
                .to_string(),
        ];
        assert_eq!(
            parse_servername(&source, &params),
            Some("card.freenode.net".to_owned())
        );

        let source = Source {
            raw: "irc.eagle.y.se".to_string(),
            nick: String::new(),
            user: String::new(),
            host: "irc.eagle.y.se".to_string(),
        };
        let params = vec![
            "nickname".to_string(),
            "Your host is irc.eagle.y.se, running version UnrealIRCd-4.0.18".to_string(),
        ];
        assert_eq!(
            parse_servername(&source, &params),
            Some("irc.eagle.y.se".to_owned())
        );
    }

    #[test]
    fn test_parse_servername_2() {
        // Gitter variation
        let source = Source {
            raw: "irc.gitter.im".to_string(),
            nick: String::new(),
            user: String::new(),
            host: "irc.gitter.im".to_string(),
        };
        let params = vec!["nickname".to_string(), " 1.10.0".to_string()];
        assert_eq!(
            parse_servername(&source, &params),
            Some("irc.gitter.im".to_owned())
        );
    }

    fn test_server_info() -> ServerInfo {
        ServerInfo {
            addr: "irc.example.org".to_string(),
            port: 6667,
            tls: false,
            pass: None,
            realname: "test".to_string(),
            nicks: vec!["test".to_string()],
            auto_join: vec![],
            nickserv_ident: None,
            sasl_auth: None,
        }
    }

    fn user_source(nick: &str, user: &str, host: &str) -> Source {
        Source {
            raw: format!("{}!{}@{}", nick, user, host),
            nick: nick.to_owned(),
            user: user.to_owned(),
            host: host.to_owned(),
        }
    }

    #[test]
    fn test_names_reply_splits_prefixes_and_ranks_members() {
        let mut state = StateInner::new(test_server_info());
        let chan_name = ChanName::new("#test".to_string());
        state.chans.push(Chan::new(chan_name.clone()));

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: Source::default(),
            cmd: wire::Cmd::Reply {
                num: 353,
                params: vec![
                    "self".to_owned(),
                    "=".to_owned(),
                    "#test".to_owned(),
                    "@alice +bob carol".to_owned(),
                ],
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: Source::default(),
            cmd: wire::Cmd::Reply {
                num: 366,
                params: vec!["self".to_owned(), "#test".to_owned()],
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        assert_eq!(
            state.get_chan_nicks(&chan_name),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
        assert!(matches!(ev_out.last(), Some(Event::ChannelNames { .. })));
    }

    #[test]
    fn test_typing_throttle_gated_on_capability_and_membership() {
        let mut state = StateInner::new(test_server_info());

        // No `message-tags` negotiated yet: never send.
        assert!(!state.should_send_active_typing_update("#chan"));

        state
            .capabilities
            .insert("message-tags".to_owned(), None);
        let chan_name = ChanName::new("#chan".to_string());
        state.chans.push(Chan::new(chan_name.clone()));
        // Not a member yet: still gated off.
        assert!(!state.should_send_active_typing_update("#chan"));

        state.chans[0]
            .members
            .insert(state.current_nick.clone(), Member::default());

        assert!(state.should_send_active_typing_update("#chan"));
        state.mark_sent_active_typing_update("#chan");
        assert!(!state.should_send_active_typing_update("#chan"));

        assert!(state.should_send_done_typing_update("#chan"));
        state.mark_sent_done_typing_update("#chan");
        assert!(!state.should_send_done_typing_update("#chan"));
    }

    #[test]
    fn test_mode_application_updates_membership() {
        let mut state = StateInner::new(test_server_info());
        let chan_name = ChanName::new("#test".to_string());
        let mut chan = Chan::new(chan_name.clone());
        chan.members.insert("alice".to_owned(), Member::default());
        state.chans.push(chan);

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: Source {
                raw: "irc.example.org".to_owned(),
                nick: String::new(),
                user: String::new(),
                host: "irc.example.org".to_owned(),
            },
            cmd: wire::Cmd::MODE {
                target: "#test".to_string(),
                modestring: "+o".to_string(),
                args: vec!["alice".to_string()],
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        let member = state.chans[0].members.get("alice").unwrap();
        assert!(member.prefixes.contains(&'o'));
        assert_eq!(member.highest_prefix, Some('@'));
    }

    #[test]
    fn test_kick_removes_member_from_channel() {
        let mut state = StateInner::new(test_server_info());
        let chan_name = ChanName::new("#test".to_string());
        let mut chan = Chan::new(chan_name.clone());
        chan.members.insert("alice".to_owned(), Member::default());
        chan.members.insert("bob".to_owned(), Member::default());
        state.chans.push(chan);

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: user_source("bob", "bob", "example.org"),
            cmd: wire::Cmd::KICK {
                chan: chan_name.clone(),
                nick: "alice".to_string(),
                comment: None,
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        assert_eq!(state.get_chan_nicks(&chan_name), vec!["bob".to_string()]);
        assert!(matches!(
            ev_out.last(),
            Some(Event::ChannelKick { kicked_nick, .. }) if kicked_nick == "alice"
        ));
    }

    #[test]
    fn test_tagmsg_typing_active_emits_event_when_negotiated() {
        let mut state = StateInner::new(test_server_info());
        state
            .capabilities
            .insert("message-tags".to_owned(), None);
        let chan_name = ChanName::new("#test".to_string());
        let mut chan = Chan::new(chan_name.clone());
        chan.members
            .insert(state.current_nick.clone(), Member::default());
        chan.members.insert("alice".to_owned(), Member::default());
        state.chans.push(chan);

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut tags = wire::Tags::default();
        tags.0.push(("+typing".to_string(), Some("active".to_string())));
        let mut msg = Msg {
            tags,
            source: user_source("alice", "alice", "example.org"),
            cmd: wire::Cmd::TAGMSG {
                target: "#test".to_string(),
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        assert!(matches!(ev_out.last(), Some(Event::ChannelTyping { .. })));
        assert!(state.chans[0].members.get("alice").unwrap().is_typing);
    }

    #[test]
    fn test_tagmsg_typing_ignored_without_capability() {
        let mut state = StateInner::new(test_server_info());
        let chan_name = ChanName::new("#test".to_string());
        let mut chan = Chan::new(chan_name.clone());
        chan.members
            .insert(state.current_nick.clone(), Member::default());
        state.chans.push(chan);

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut tags = wire::Tags::default();
        tags.0.push(("+typing".to_string(), Some("active".to_string())));
        let mut msg = Msg {
            tags,
            source: user_source("alice", "alice", "example.org"),
            cmd: wire::Cmd::TAGMSG {
                target: "#test".to_string(),
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        assert!(ev_out.is_empty());
    }

    #[test]
    fn test_quit_removes_user_and_emits_typing_before_quit() {
        let mut state = StateInner::new(test_server_info());
        state
            .capabilities
            .insert("message-tags".to_owned(), None);
        let chan_name = ChanName::new("#test".to_string());
        let mut chan = Chan::new(chan_name.clone());
        let mut member = Member::default();
        member.is_typing = true;
        chan.members.insert("alice".to_owned(), member);
        state.chans.push(chan);
        state.users.insert("alice".to_owned(), User::default());

        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: user_source("alice", "alice", "example.org"),
            cmd: wire::Cmd::QUIT {
                msg: Some("bye".to_owned()),
                chans: Vec::new(),
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);

        assert!(matches!(ev_out[0], Event::ChannelTyping { .. }));
        assert!(matches!(ev_out[1], Event::Quit { .. }));
        assert!(!state.users.contains_key("alice"));
        assert!(state.chans[0].members.is_empty());
    }

    #[test]
    fn test_isupport_unset_token_removes_entry() {
        let mut state = StateInner::new(test_server_info());
        let mut ev_out = Vec::new();
        let mut line_out = Vec::new();
        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: Source::default(),
            cmd: wire::Cmd::Reply {
                num: 005,
                params: vec![
                    "self".to_owned(),
                    "EXCEPTS".to_owned(),
                    ":are supported by this server".to_owned(),
                ],
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);
        assert!(state.supported.contains_key("EXCEPTS"));

        let mut msg = Msg {
            tags: wire::Tags::default(),
            source: Source::default(),
            cmd: wire::Cmd::Reply {
                num: 005,
                params: vec![
                    "self".to_owned(),
                    "-EXCEPTS".to_owned(),
                    ":are supported by this server".to_owned(),
                ],
            },
        };
        state.update(&mut msg, &mut ev_out, &mut line_out);
        assert!(!state.supported.contains_key("EXCEPTS"));
    }
}
