/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Client-side packet rewriting.
//!
//! | Preference | Packet | Change |
//! |---|---|---|
//! | `fake_supporter` | `Privileges` | set supporter bit |
//! | `fake_supporter` | own `UserPresence` | set supporter bit (mode kept) |
//! | `fake_country` | own `UserPresence` | replace country byte |
//!
//! "Own" is the user id from a `LoginReply` in the same response, or else
//! the id the session tracker holds for the request's token.

use tracing::{debug, info};

use crate::bancho::{BanchoPacket, PacketStream, PRIVILEGE_SUPPORTER};
use crate::config::Preferences;

/// What [`apply`] did to a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// User id from a successful `LoginReply` in this response.
    pub login_user: Option<i32>,
    /// Number of packets modified.
    pub modified: usize,
}

/// Rewrite `stream` in place according to `prefs`.
pub fn apply(prefs: &Preferences, session_user: Option<i32>, stream: &mut PacketStream) -> RewriteOutcome {
    let login_user = stream.packets.iter().find_map(|p| match p {
        BanchoPacket::LoginReply(id) if *id > 0 => Some(*id),
        _ => None,
    });
    let own_user = login_user.or(session_user);
    let mut modified = 0usize;

    for packet in &mut stream.packets {
        match packet {
            BanchoPacket::LoginReply(id) if *id <= 0 => {
                info!(code = *id, "Login rejected by server");
            }
            BanchoPacket::Privileges(bits) if prefs.fake_supporter => {
                let patched = *bits | PRIVILEGE_SUPPORTER;
                if patched != *bits {
                    debug!(from = *bits, to = patched, "Adding supporter privilege");
                    *bits = patched;
                    modified += 1;
                }
            }
            BanchoPacket::UserPresence(presence) if Some(presence.user_id) == own_user => {
                let before = presence.clone();
                if prefs.fake_supporter {
                    presence.set_privileges(presence.privileges() | PRIVILEGE_SUPPORTER as u8);
                }
                if let Some(country) = prefs.fake_country {
                    presence.country = country.code();
                }
                if *presence != before {
                    debug!(
                        user_id = presence.user_id,
                        country = presence.country,
                        privileges = presence.privileges(),
                        "Patched own presence"
                    );
                    modified += 1;
                }
            }
            BanchoPacket::SendMessage(message) => {
                debug!(
                    sender = %message.sender,
                    recipient = %message.recipient,
                    "Chat message"
                );
            }
            _ => {}
        }
    }

    RewriteOutcome {
        login_user,
        modified,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bancho::{OsuMessage, UserPresence};
    use crate::config::Country;

    fn presence(user_id: i32, country: u8) -> BanchoPacket {
        BanchoPacket::UserPresence(UserPresence {
            user_id,
            username: format!("user{user_id}"),
            utc_offset: 24,
            country,
            privileges_and_mode: (3 << 5) | 1,
            ..Default::default()
        })
    }

    fn stream(packets: Vec<BanchoPacket>) -> PacketStream {
        PacketStream::new(packets)
    }

    fn prefs(fake_supporter: bool, fake_country: Option<&str>) -> Preferences {
        Preferences {
            fake_supporter,
            fake_country: fake_country.and_then(Country::from_alpha2),
            ..Default::default()
        }
    }

    #[test]
    fn supporter_bit_added_when_enabled() {
        let mut s = stream(vec![BanchoPacket::Privileges(1)]);
        let out = apply(&prefs(true, None), None, &mut s);
        assert_eq!(s.packets, vec![BanchoPacket::Privileges(5)]);
        assert_eq!(out.modified, 1);
    }

    #[test]
    fn supporter_bit_untouched_when_disabled() {
        let mut s = stream(vec![BanchoPacket::Privileges(1)]);
        let out = apply(&prefs(false, None), None, &mut s);
        assert_eq!(s.packets, vec![BanchoPacket::Privileges(1)]);
        assert_eq!(out.modified, 0);
    }

    #[test]
    fn existing_supporter_is_not_counted_as_modified() {
        let mut s = stream(vec![BanchoPacket::Privileges(5)]);
        assert_eq!(apply(&prefs(true, None), None, &mut s).modified, 0);
    }

    #[test]
    fn login_reply_identifies_own_presence() {
        let mut s = stream(vec![
            BanchoPacket::LoginReply(1001),
            presence(1001, 55),
            presence(2002, 55),
        ]);
        let out = apply(&prefs(true, Some("JP")), None, &mut s);

        assert_eq!(out.login_user, Some(1001));
        match (&s.packets[1], &s.packets[2]) {
            (BanchoPacket::UserPresence(own), BanchoPacket::UserPresence(other)) => {
                assert_eq!(own.country, 111);
                assert_eq!(own.privileges(), 0b101);
                assert_eq!(own.mode(), 3);
                assert_eq!(other.country, 55);
                assert_eq!(other.privileges(), 1);
            }
            _ => panic!("unexpected packet layout"),
        }
    }

    #[test]
    fn session_user_used_without_login_reply() {
        let mut s = stream(vec![presence(7, 1)]);
        let out = apply(&prefs(false, Some("de")), Some(7), &mut s);
        assert_eq!(out.login_user, None);
        assert_eq!(out.modified, 1);
        assert!(matches!(&s.packets[0], BanchoPacket::UserPresence(p) if p.country == 56));
    }

    #[test]
    fn unknown_user_presence_is_left_alone() {
        let mut s = stream(vec![presence(7, 1)]);
        let out = apply(&prefs(true, Some("de")), None, &mut s);
        assert_eq!(out.modified, 0);
        assert_eq!(s.packets, vec![presence(7, 1)]);
    }

    #[test]
    fn failed_login_reply_is_not_a_user() {
        let mut s = stream(vec![BanchoPacket::LoginReply(-1), presence(-1, 1)]);
        let out = apply(&prefs(true, Some("de")), None, &mut s);
        assert_eq!(out.login_user, None);
        assert_eq!(out.modified, 0);
    }

    #[test]
    fn untouched_packets_keep_source_bytes_after_rewrite() {
        // Another user's presence whose username is written as 0x0b 0x00.
        let mut other = vec![83, 0, 0, 21, 0, 0, 0];
        other.extend_from_slice(&2002i32.to_le_bytes());
        other.extend_from_slice(&[0x0b, 0x00, 24, 55, 1]);
        other.extend_from_slice(&[0; 12]);
        let mut body = BanchoPacket::Privileges(1).to_bytes();
        body.extend_from_slice(&other);

        let mut s = crate::bancho::decode_stream(&body).unwrap();
        let out = apply(&prefs(true, Some("jp")), Some(1001), &mut s);
        assert_eq!(out.modified, 1);

        let mut expected = BanchoPacket::Privileges(5).to_bytes();
        expected.extend_from_slice(&other);
        assert_eq!(s.encode(), expected);
    }

    #[test]
    fn other_packets_pass_through() {
        let packets = vec![
            BanchoPacket::Other {
                id: 24,
                data: vec![0x0b, 1, b'!'],
            },
            BanchoPacket::SendMessage(OsuMessage {
                sender: "BanchoBot".into(),
                text: "welcome".into(),
                recipient: "#osu".into(),
                sender_id: 3,
            }),
        ];
        let mut s = stream(packets.clone());
        apply(&prefs(true, Some("us")), Some(3), &mut s);
        assert_eq!(s.packets, packets);
    }
}
