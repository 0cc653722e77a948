#![allow(clippy::cognitive_complexity)]
#![allow(clippy::unneeded_field_pattern)]

//! IRC event handling

use crate::ui::UI;
use libcourier_common::{MsgTarget, TabStyle};
use libcourier_wire as wire;
use time::OffsetDateTime;

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub(crate) trait Client {
    fn get_serv_name(&self) -> &str;

    fn get_nick(&self) -> String;

    fn is_nick_accepted(&self) -> bool;
}

impl Client for libcourier_client::Client {
    fn get_serv_name(&self) -> &str {
        self.get_serv_name()
    }

    fn get_nick(&self) -> String {
        self.get_nick()
    }

    fn is_nick_accepted(&self) -> bool {
        self.is_nick_accepted()
    }
}

pub(crate) async fn task(
    rcv_ev: mpsc::Receiver<libcourier_client::Event>,
    ui: UI,
    client: Box<dyn Client>,
) {
    let mut rcv_ev = ReceiverStream::new(rcv_ev);
    while let Some(ev) = rcv_ev.next().await {
        handle_conn_ev(&ui, &*client, ev);
        ui.draw();
    }
}

fn handle_conn_ev(ui: &UI, client: &dyn Client, ev: libcourier_client::Event) {
    use libcourier_client::Event::*;
    match ev {
        ResolvingHost => {
            ui.add_client_msg(
                "Resolving host...",
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        Connecting(sock_addr) => {
            ui.add_client_msg(
                &format!("Connecting to {}", sock_addr),
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        Connected => {
            ui.add_client_msg(
                "Connected.",
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        Disconnected => {
            let serv = client.get_serv_name();
            ui.add_err_msg(
                &format!(
                    "Disconnected. Will try to reconnect in {} seconds.",
                    libcourier_client::RECONNECT_SECS
                ),
                now(),
                &MsgTarget::AllServTabs { serv },
            );
            ui.clear_nicks(serv);
        }
        IoErr(err) => {
            ui.add_err_msg(
                &format!("Connection error: {}", err),
                now(),
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        ConnectionClosed => {
            ui.add_err_msg(
                "Connection closed on the remote end",
                now(),
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        TlsErr(err) => {
            ui.add_err_msg(
                &format!("TLS error: {}", err),
                now(),
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        CantResolveAddr => {
            ui.add_err_msg(
                "Can't resolve address",
                now(),
                &MsgTarget::AllServTabs {
                    serv: client.get_serv_name(),
                },
            );
        }
        NickChange { new_nick } => {
            ui.set_nick(client.get_serv_name(), &new_nick);
        }
        Msg(msg) => {
            handle_irc_msg(ui, client, msg);
        }
        WireError(err) => {
            ui.add_err_msg(
                &format!("Wire protocol error: {}", err),
                now(),
                &MsgTarget::Server {
                    serv: client.get_serv_name(),
                },
            );
        }
        ChannelJoinError { chan, msg } => ui.add_client_msg(
            &msg,
            &MsgTarget::Chan {
                serv: client.get_serv_name(),
                chan: &chan,
            },
        ),
        Ctcp {
            nick,
            is_reply: true,
            text,
            ..
        } => {
            let serv = client.get_serv_name();
            ui.add_client_msg(
                &format!("CTCP reply from {}: {}", nick, text),
                &MsgTarget::Server { serv },
            );
        }
        Ctcp { .. } => {
            // Requests other than VERSION (already answered by the client) aren't shown.
        }
        ChannelJoined { chan, nick } => {
            let serv = client.get_serv_name();
            if nick == client.get_nick() {
                ui.new_chan_tab(serv, &chan);
            } else {
                let ts = Some(now());
                let chan_target = MsgTarget::Chan { serv, chan: &chan };
                ui.add_nick(&nick, ts, &chan_target);
                if ui.user_tab_exists(serv, &nick) {
                    ui.add_nick(&nick, ts, &MsgTarget::User { serv, nick: &nick });
                }
                ui.set_tab_style(TabStyle::JoinOrPart, &chan_target);
            }
        }
        ChannelPart { chan, nick } => {
            let serv = client.get_serv_name();
            if nick != client.get_nick() {
                let chan_target = MsgTarget::Chan { serv, chan: &chan };
                ui.remove_nick(&nick, Some(now()), &chan_target);
                ui.set_tab_style(TabStyle::JoinOrPart, &chan_target);
            }
        }
        ChannelKick {
            chan,
            kicked_nick,
            reason,
            ..
        } => {
            let serv = client.get_serv_name();
            if kicked_nick != client.get_nick() {
                let chan_target = MsgTarget::Chan { serv, chan: &chan };
                ui.remove_nick(&kicked_nick, Some(now()), &chan_target);
                let msg = match reason {
                    Some(reason) => format!("{} got kicked: {}", kicked_nick, reason),
                    None => format!("{} got kicked", kicked_nick),
                };
                ui.add_client_msg(&msg, &chan_target);
                ui.set_tab_style(TabStyle::JoinOrPart, &chan_target);
            }
        }
        Quit { chan, nick, .. } => {
            let serv = client.get_serv_name();
            ui.remove_nick(&nick, Some(now()), &MsgTarget::Chan { serv, chan: &chan });
            if ui.user_tab_exists(serv, &nick) {
                ui.remove_nick(&nick, Some(now()), &MsgTarget::User { serv, nick: &nick });
            }
        }
        GoneAway { .. } | BackFromAway { .. } => {
            // Away status isn't shown per-member in this UI.
        }
        NickChanged {
            chan,
            old_nick,
            new_nick,
        } => {
            let serv = client.get_serv_name();
            ui.rename_nick(
                &old_nick,
                &new_nick,
                now(),
                &MsgTarget::Chan { serv, chan: &chan },
            );
            if ui.user_tab_exists(serv, &old_nick) {
                ui.rename_nick(
                    &old_nick,
                    &new_nick,
                    now(),
                    &MsgTarget::User {
                        serv,
                        nick: &old_nick,
                    },
                );
            }
        }
        NewMessage { .. } | NewMessageFromServer { .. } => {
            // Chat text is rendered from the raw `Msg` event above, which carries the
            // is_notice/CTCP detail this typed event doesn't.
        }
        ChannelTopic { chan, topic } => {
            ui.set_topic(&topic, now(), client.get_serv_name(), &chan);
        }
        ChannelTopicWhoTime { .. } => {
            // No widget for topic-setter/time in this UI.
        }
        ChannelNames { chan, nicks } => {
            let serv = client.get_serv_name();
            let chan_target = MsgTarget::Chan { serv, chan: &chan };
            for nick in nicks {
                ui.add_nick(&nick, None, &chan_target);
            }
        }
        ChannelMode { .. } => {
            // Membership and channel mode changes are tracked by the client state; nothing to
            // show in the UI.
        }
        ChannelTyping { .. } => {
            // No typing indicator in this UI.
        }
    }
}

fn handle_irc_msg(ui: &UI, client: &dyn Client, msg: wire::Msg) {
    use wire::Cmd::*;

    let wire::Msg { source, cmd, .. } = msg;
    let ts = now();
    let serv = client.get_serv_name();
    match cmd {
        PRIVMSG {
            target,
            msg,
            is_notice,
            ctcp,
        } => {
            if source.nick.is_empty() && source.host.is_empty() {
                debug!("PRIVMSG without a usable source: {:?}", msg);
                return;
            }

            // Sender to be shown in the UI
            let sender = source.display();

            if ctcp == Some(wire::CTCP::Version) {
                let msg_target = if ui.user_tab_exists(serv, sender) {
                    MsgTarget::User { serv, nick: sender }
                } else {
                    MsgTarget::Server { serv }
                };
                ui.add_client_msg(
                    &format!("Received version request from {}", sender),
                    &msg_target,
                );
                return;
            }

            let is_action = ctcp == Some(wire::CTCP::Action);
            let from_server = source.nick.is_empty();

            match target {
                wire::MsgTarget::Chan(chan) => {
                    let ui_msg_target = MsgTarget::Chan { serv, chan: &chan };
                    // highlight the message if it mentions us
                    if msg.contains(&client.get_nick()) {
                        ui.add_privmsg(sender, &msg, ts, &ui_msg_target, true, is_action);
                        ui.set_tab_style(TabStyle::Highlight, &ui_msg_target);
                        let mentions_target = MsgTarget::Server { serv: "mentions" };
                        ui.add_msg(
                            &format!("{} in {}:{}: {}", sender, serv, chan.display(), msg),
                            ts,
                            &mentions_target,
                        );
                        ui.set_tab_style(TabStyle::Highlight, &mentions_target);
                    } else {
                        ui.add_privmsg(sender, &msg, ts, &ui_msg_target, false, is_action);
                        ui.set_tab_style(TabStyle::NewMsg, &ui_msg_target);
                    }
                }
                wire::MsgTarget::User(target) => {
                    // If the sender is a server we show the message in the server tab. Otherwise
                    // we show it in a private tab.
                    //
                    // Some bouncers send PRIVMSGs from users with ambiguous prefix without a
                    // `user@host` part so we treat ambiguity as nick. See #247.
                    if from_server {
                        let msg_target = MsgTarget::Server { serv };
                        ui.add_privmsg(serv, &msg, ts, &msg_target, false, is_action);
                        if target == client.get_nick() {
                            ui.set_tab_style(TabStyle::Highlight, &msg_target);
                        } else {
                            ui.set_tab_style(TabStyle::NewMsg, &msg_target);
                        }
                    } else if target == client.get_nick() {
                        // Message is sent to us. Show NOTICE messages in server tabs if we
                        // don't have a tab for the sender already (see #21).
                        let msg_target = if is_notice && !ui.user_tab_exists(serv, sender) {
                            MsgTarget::Server { serv }
                        } else {
                            MsgTarget::User { serv, nick: sender }
                        };
                        ui.add_privmsg(sender, &msg, ts, &msg_target, false, is_action);
                        ui.set_tab_style(TabStyle::Highlight, &msg_target);
                    } else {
                        // PRIVMSG not sent to us. This case can happen in a few cases:
                        //
                        // - When using a bouncer, see #271. When multiple clients connect
                        //   to the same bouncer and one of them sends a PRIVMSG, the
                        //   message is relayed to the other clients. Example:
                        //
                        //       <our_nick> PRIVMSG <target> :...
                        //
                        //   In this case (when the sender is us) we show the message in
                        //   the target's tab and our nick as the sender.
                        //
                        // - When the message target is a "host mask" (e.g. message was
                        //   sent to all users matching a mask), see #278. Example:
                        //
                        //       <some prefix> PRIVMSG $$* :...
                        //
                        //    In this case (when the sender is not us) we show the message
                        //    in the target's tab as the prefix as the sender.
                        if sender == client.get_nick() {
                            // Case (1). Don't highlight the tab as `Highlight`: the message
                            // was sent by us so the tab probably doesn't need that much
                            // attention. Highlight as `NewMsg` instead.
                            let msg_target = MsgTarget::User {
                                serv,
                                nick: &target,
                            };
                            ui.add_privmsg(
                                &client.get_nick(),
                                &msg,
                                ts,
                                &msg_target,
                                false,
                                is_action,
                            );
                            ui.set_tab_style(TabStyle::NewMsg, &msg_target);
                        } else {
                            // Case (2)
                            let msg_target = MsgTarget::User { serv, nick: sender };
                            ui.add_privmsg(sender, &msg, ts, &msg_target, false, is_action);
                            ui.set_tab_style(TabStyle::Highlight, &msg_target);
                        }
                    }
                }
            }
        }

        // Channel membership/topic changes are surfaced as typed events (see
        // `handle_conn_ev`); nothing left to do here.
        JOIN { .. } | PART { .. } | QUIT { .. } | NICK { .. } | TOPIC { .. } | KICK { .. } => {}

        Reply { num: 433, .. } => {
            // ERR_NICKNAMEINUSE. If the nick is accepted once then the error is for a nick change
            // request from the user, so show an error message. Otherwise don't show an error
            // message, the client will be silently searching for an available nick.
            if client.is_nick_accepted() {
                ui.add_err_msg(
                    "Nickname is already in use",
                    now(),
                    &MsgTarget::AllServTabs { serv },
                );
            }
        }

        PING { .. } | PONG { .. } => {
            // Ignore
        }

        ERROR { msg } => {
            ui.add_err_msg(&msg, now(), &MsgTarget::AllServTabs { serv });
        }

        CAP {
            client: _,
            subcommand,
            params,
        } => match subcommand.as_ref() {
            "NAK" => {
                if params.iter().any(|cap| cap.as_str() == "sasl") {
                    let msg_target = MsgTarget::Server { serv };
                    ui.add_err_msg(
                        "Server rejected using SASL authenication capability",
                        now(),
                        &msg_target,
                    );
                }
            }
            "LS" => {
                if !params.iter().any(|cap| cap.as_str() == "sasl") {
                    let msg_target = MsgTarget::Server { serv };
                    ui.add_err_msg(
                        "Server does not support SASL authenication",
                        now(),
                        &msg_target,
                    );
                }
            }
            "ACK" => {}
            cmd => {
                debug!("Ignoring CAP subcommand {}: params={:?}", cmd, params);
            }
        },

        AUTHENTICATE { .. } => {
            // Ignore
        }

        MODE { .. } => {
            // Membership and channel mode changes are tracked by the client state; nothing to
            // show in the UI.
        }

        BATCH { .. } => {
            // Batch framing is transparent to the UI; contents arrive as ordinary messages.
        }

        TAGMSG { .. } => {
            // Typing notifications are surfaced as `Event::ChannelTyping`, not as a wire message.
        }

        Reply { num: n, params } => {
            let n_params = params.len();
            if (
                n <= 003 // RPL_WELCOME, RPL_YOURHOST, RPL_CREATED
                    || n == 251 // RPL_LUSERCLIENT
                    || n == 255 // RPL_LUSERME
                    || n == 372 // RPL_MOTD
                    || n == 375 // RPL_MOTDSTART
                    || n == 376
                // RPL_ENDOFMOTD
            ) && n_params == 2
            {
                let msg = &params[1];
                ui.add_msg(msg, now(), &MsgTarget::Server { serv });
            } else if n == 4 // RPL_MYINFO
                    || n == 5 // RPL_BOUNCE
                    || (252..=254).contains(&n)
            // RPL_LUSEROP, RPL_LUSERUNKNOWN, RPL_LUSERCHANNELS
            {
                let msg = params.into_iter().collect::<Vec<String>>().join(" ");
                ui.add_msg(&msg, now(), &MsgTarget::Server { serv });
            } else if (n == 265 || n == 266 || n == 250) && n_params > 0 {
                let msg = &params[n_params - 1];
                ui.add_msg(msg, now(), &MsgTarget::Server { serv });
            }
            // RPL_UNAWAY or RPL_NOWAWAY
            else if (n == 305 || n == 306) && n_params > 1 {
                let msg = &params[1];
                ui.add_client_msg(msg, &MsgTarget::AllServTabs { serv });
            }
            // ERR_NOSUCHNICK
            else if n == 401 && n_params > 2 {
                let nick = &params[1];
                let msg = &params[2];
                ui.add_client_msg(msg, &MsgTarget::User { serv, nick });
            // RPL_AWAY
            } else if n == 301 && n_params > 2 {
                let nick = &params[1];
                let msg = &params[2];
                ui.add_client_msg(
                    &format!("{} is away: {}", nick, msg),
                    &MsgTarget::User { serv, nick },
                );
            } else if !source.nick.is_empty() || !source.host.is_empty() {
                let msg_serv = source.display();
                let msg_target = MsgTarget::Server { serv };
                ui.add_privmsg(
                    msg_serv,
                    &params.join(" "),
                    now(),
                    &msg_target,
                    false,
                    false,
                );
                ui.set_tab_style(TabStyle::NewMsg, &msg_target);
            } else {
                debug!(
                    "Ignoring numeric reply {}: source={:?}, params={:?}",
                    n, source, params
                );
            }
        }

        Other { cmd, params } => {
            if source.nick.is_empty() && !source.host.is_empty() {
                let msg_serv = source.display();
                let msg_target = MsgTarget::Server { serv };
                ui.add_privmsg(
                    msg_serv,
                    &params.join(" "),
                    now(),
                    &msg_target,
                    false,
                    false,
                );
                ui.set_tab_style(TabStyle::NewMsg, &msg_target);
            } else {
                debug!(
                    "Ignoring command {}: source={:?}, params={:?}",
                    cmd, source, params
                );
            }
        }
    }
}
