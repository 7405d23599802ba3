/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the bancho packet codec.
//!
//! Every variant carries the offsets and sizes involved so a `tracing` event
//! can describe the failure without re-parsing the buffer.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A read needed more bytes than the buffer had left.
    #[error("unexpected end of data at offset {offset}: needed {needed} byte(s), {remaining} left")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// A ULEB128 value did not fit into 64 bits.
    #[error("ULEB128 value at offset {offset} overflows u64")]
    VarintOverflow { offset: usize },

    /// An osu! string started with a marker other than `0x00` / `0x0b`.
    #[error("invalid string marker 0x{marker:02x} at offset {offset}")]
    InvalidStringMarker { offset: usize, marker: u8 },

    /// An osu! string payload was not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// A typed payload parsed cleanly but left bytes unread.
    #[error("packet {id} payload has {unread} unread byte(s) after typed decode")]
    UnreadPayload { id: u16, unread: usize },

    /// A packet header declared more payload than the stream contains.
    #[error("packet {id} at offset {offset} declares {declared} byte(s) but only {available} remain")]
    Truncated {
        id: u16,
        offset: usize,
        declared: usize,
        available: usize,
    },
}
