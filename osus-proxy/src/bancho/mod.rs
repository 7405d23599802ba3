/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bancho packet codec.
//!
//! A bancho response body is a flat sequence of packets:
//!
//! ```text
//! ┌────────┬─────────────┬────────────┬──────────────────────┐
//! │ id u16 │ compress u8 │ length u32 │ payload (length B)   │  × N
//! └────────┴─────────────┴────────────┴──────────────────────┘
//!   all integers little-endian
//! ```
//!
//! Only the packets the proxy rewrites (or needs to read) are parsed into
//! typed variants.  Everything else is carried as [`BanchoPacket::Other`] and
//! re-emitted byte for byte.  A known packet whose payload does not parse
//! cleanly also falls back to `Other`, so a server speaking a slightly
//! different layout never gets its data mangled.

pub mod error;
pub mod io;

pub use error::CodecError;
pub use io::{OsuMessage, OsuWriter, PacketReader};

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the fixed packet header in bytes.
pub const HEADER_LEN: usize = 7;

/// Server → client packet ids the proxy understands.
pub mod ids {
    pub const LOGIN_REPLY: u16 = 5;
    pub const SEND_MESSAGE: u16 = 7;
    pub const PRIVILEGES: u16 = 71;
    pub const USER_PRESENCE: u16 = 83;
}

/// Client privilege bit for osu!supporter.
pub const PRIVILEGE_SUPPORTER: u32 = 1 << 2;

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u16,
    /// Legacy compression flag; always written as `0`.
    pub compression: u8,
    pub length: u32,
}

impl PacketHeader {
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        let mut buf = &bytes[..];
        Self {
            id: buf.get_u16_le(),
            compression: buf.get_u8(),
            length: buf.get_u32_le(),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut buf = &mut out[..];
        buf.put_u16_le(self.id);
        buf.put_u8(self.compression);
        buf.put_u32_le(self.length);
        out
    }
}

// ── UserPresence ──────────────────────────────────────────────────────────────

/// Payload of the `UserPresence` packet (id 83).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserPresence {
    pub user_id: i32,
    pub username: String,
    /// UTC offset in hours, biased by +24.
    pub utc_offset: u8,
    /// osu! numeric country code, see [`crate::config::Country`].
    pub country: u8,
    /// Low 5 bits: bancho privileges.  High 3 bits: game mode.
    pub privileges_and_mode: u8,
    pub longitude: f32,
    pub latitude: f32,
    pub global_rank: i32,
}

impl UserPresence {
    const PRIVILEGE_MASK: u8 = 0b0001_1111;

    pub fn privileges(&self) -> u8 {
        self.privileges_and_mode & Self::PRIVILEGE_MASK
    }

    pub fn mode(&self) -> u8 {
        self.privileges_and_mode >> 5
    }

    /// Replace the privilege bits while keeping the game mode.
    pub fn set_privileges(&mut self, privileges: u8) {
        self.privileges_and_mode =
            (self.privileges_and_mode & !Self::PRIVILEGE_MASK) | (privileges & Self::PRIVILEGE_MASK);
    }

    fn read(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            user_id: r.read_i32()?,
            username: r.read_osu_string()?,
            utc_offset: r.read_u8()?,
            country: r.read_u8()?,
            privileges_and_mode: r.read_u8()?,
            longitude: r.read_f32()?,
            latitude: r.read_f32()?,
            global_rank: r.read_i32()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.put_i32_le(self.user_id);
        out.put_osu_string(&self.username);
        out.put_u8(self.utc_offset);
        out.put_u8(self.country);
        out.put_u8(self.privileges_and_mode);
        out.put_f32_le(self.longitude);
        out.put_f32_le(self.latitude);
        out.put_i32_le(self.global_rank);
    }
}

// ── BanchoPacket ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BanchoPacket {
    /// Login result: the user id on success, a negative code on failure.
    LoginReply(i32),
    SendMessage(OsuMessage),
    Privileges(u32),
    UserPresence(UserPresence),
    Other { id: u16, data: Vec<u8> },
}

impl BanchoPacket {
    /// Decode a packet from its header and exactly `header.length` payload
    /// bytes.
    ///
    /// Typed parsing is best-effort: on failure, or when the payload is
    /// longer than the typed layout, the raw bytes are kept as `Other`.
    pub fn decode(header: &PacketHeader, payload: &[u8]) -> Self {
        match Self::decode_typed(header.id, payload) {
            Some(Ok(packet)) => packet,
            Some(Err(e)) => {
                debug!(id = header.id, error = %e, "Typed decode failed, keeping raw payload");
                Self::raw(header.id, payload)
            }
            None => Self::raw(header.id, payload),
        }
    }

    fn raw(id: u16, payload: &[u8]) -> Self {
        Self::Other {
            id,
            data: payload.to_vec(),
        }
    }

    fn decode_typed(id: u16, payload: &[u8]) -> Option<Result<Self, CodecError>> {
        let mut r = PacketReader::new(payload);
        let parsed = match id {
            ids::LOGIN_REPLY => r.read_i32().map(Self::LoginReply),
            ids::SEND_MESSAGE => r.read_osu_message().map(Self::SendMessage),
            ids::PRIVILEGES => r.read_u32().map(Self::Privileges),
            ids::USER_PRESENCE => UserPresence::read(&mut r).map(Self::UserPresence),
            _ => return None,
        };
        Some(parsed.and_then(|packet| {
            if r.is_empty() {
                Ok(packet)
            } else {
                Err(CodecError::UnreadPayload {
                    id,
                    unread: r.remaining(),
                })
            }
        }))
    }

    pub fn id(&self) -> u16 {
        use BanchoPacket as BP;
        match self {
            BP::LoginReply(_) => ids::LOGIN_REPLY,
            BP::SendMessage(_) => ids::SEND_MESSAGE,
            BP::Privileges(_) => ids::PRIVILEGES,
            BP::UserPresence(_) => ids::USER_PRESENCE,
            BP::Other { id, .. } => *id,
        }
    }

    /// Serialise the payload only (no header).
    pub fn encode_payload(&self) -> Vec<u8> {
        use BanchoPacket as BP;

        let mut out = Vec::new();
        match self {
            BP::LoginReply(user_id) => out.put_i32_le(*user_id),
            BP::SendMessage(message) => out.put_osu_message(message),
            BP::Privileges(bits) => out.put_u32_le(*bits),
            BP::UserPresence(presence) => presence.write(&mut out),
            BP::Other { data, .. } => out.put_slice(data),
        }
        out
    }

    /// Serialise header + payload.  The length is always recomputed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let header = PacketHeader {
            id: self.id(),
            compression: 0,
            length: payload.len() as u32,
        };

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.put_slice(&header.to_bytes());
        out.put_slice(&payload);
        out
    }
}

// ── Stream ────────────────────────────────────────────────────────────────────

/// A decoded response body.
///
/// Each decoded packet remembers the frame it came from.  [`encode`] copies
/// that frame verbatim unless the packet was changed, so unmodified packets
/// keep their exact wire form (e.g. a `0x0b 0x00` empty string).
///
/// [`encode`]: PacketStream::encode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketStream {
    pub packets: Vec<BanchoPacket>,
    /// Bytes after the last complete packet that were too short to hold a
    /// header.  Preserved verbatim on re-encode.
    pub trailing: Vec<u8>,
    frames: Vec<SourceFrame>,
}

#[derive(Debug, Clone, PartialEq)]
struct SourceFrame {
    packet: BanchoPacket,
    bytes: Vec<u8>,
}

impl PacketStream {
    /// A stream built in memory, with no source frames.
    pub fn new(packets: Vec<BanchoPacket>) -> Self {
        Self {
            packets,
            ..Default::default()
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, packet) in self.packets.iter().enumerate() {
            match self.frames.get(i) {
                Some(frame) if frame.packet == *packet => out.put_slice(&frame.bytes),
                _ => out.put_slice(&packet.to_bytes()),
            }
        }
        out.put_slice(&self.trailing);
        out
    }
}

/// Split a bancho body into packets.
///
/// # Errors
/// [`CodecError::Truncated`] when a header declares more payload than the
/// body holds.
pub fn decode_stream(bytes: &[u8]) -> Result<PacketStream, CodecError> {
    let mut stream = PacketStream::default();
    let mut r = PacketReader::new(bytes);

    loop {
        let remaining = r.remaining();
        if remaining == 0 {
            break;
        }
        if remaining < HEADER_LEN {
            let leftover = r.read_slice(remaining)?;
            warn!(
                count = remaining,
                bytes = %hex::encode(leftover),
                "Encountered leftover bytes after last packet"
            );
            stream.trailing = leftover.to_vec();
            break;
        }

        let offset = r.position();
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(r.read_slice(HEADER_LEN)?);
        let header = PacketHeader::from_bytes(header_bytes);

        let declared = header.length as usize;
        if declared > r.remaining() {
            return Err(CodecError::Truncated {
                id: header.id,
                offset,
                declared,
                available: r.remaining(),
            });
        }
        let payload = r.read_slice(declared)?;
        let packet = BanchoPacket::decode(&header, payload);
        stream.frames.push(SourceFrame {
            packet: packet.clone(),
            bytes: bytes[offset..r.position()].to_vec(),
        });
        stream.packets.push(packet);
    }

    Ok(stream)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
