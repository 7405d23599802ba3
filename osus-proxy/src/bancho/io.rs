/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Little-endian primitives used by the bancho wire format.
//!
//! [`PacketReader`] is a bounds-checked cursor on top of [`bytes::Buf`];
//! every read checks what is left first and returns a [`CodecError`] instead
//! of letting `Buf` panic.  Writing goes through the [`OsuWriter`] extension
//! trait, available on any [`bytes::BufMut`].

use bytes::{Buf, BufMut};

use super::error::CodecError;

const LEB128_CONTINUATION: u8 = 1 << 7;

/// Marker byte preceding a present osu! string.
pub const STRING_PRESENT: u8 = 0x0b;
/// Marker byte for an absent (empty) osu! string.
pub const STRING_ABSENT: u8 = 0x00;

// ── OsuMessage ────────────────────────────────────────────────────────────────

/// A chat message as carried by `SendMessage` packets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OsuMessage {
    pub sender: String,
    pub text: String,
    pub recipient: String,
    pub sender_id: i32,
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Forward-only cursor over a byte slice.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Current read offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if needed > self.buf.remaining() {
            return Err(CodecError::UnexpectedEof {
                offset: self.position(),
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(n)?;
        let (out, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Unsigned LEB128.  A value wider than 64 bits is
    /// [`CodecError::VarintOverflow`].
    pub fn read_uleb128(&mut self) -> Result<u64, CodecError> {
        let start = self.position();
        let mut result = 0u64;
        let mut shift = 0u32;

        loop {
            let byte = self.read_u8()?;
            let bits = u64::from(byte & !LEB128_CONTINUATION);

            // The tenth byte may only contribute the single remaining bit.
            if shift > 63 || (shift == 63 && bits > 1) {
                return Err(CodecError::VarintOverflow { offset: start });
            }
            result |= bits << shift;

            if byte & LEB128_CONTINUATION == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// osu! string: `0x00` → empty, `0x0b` + ULEB128 length + UTF-8 bytes.
    pub fn read_osu_string(&mut self) -> Result<String, CodecError> {
        let offset = self.position();
        match self.read_u8()? {
            STRING_ABSENT => Ok(String::new()),
            STRING_PRESENT => {
                let len = self.read_uleb128()?;
                let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof {
                    offset: self.position(),
                    needed: usize::MAX,
                    remaining: self.remaining(),
                })?;
                let bytes = self.read_slice(len)?;
                String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset })
            }
            marker => Err(CodecError::InvalidStringMarker { offset, marker }),
        }
    }

    pub fn read_osu_message(&mut self) -> Result<OsuMessage, CodecError> {
        Ok(OsuMessage {
            sender: self.read_osu_string()?,
            text: self.read_osu_string()?,
            recipient: self.read_osu_string()?,
            sender_id: self.read_i32()?,
        })
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// bancho-specific writers on top of [`BufMut`].  Fixed-width fields use
/// `BufMut`'s own `put_*_le` methods.
pub trait OsuWriter: BufMut {
    fn put_uleb128(&mut self, mut value: u64) {
        loop {
            let mut byte = (value as u8) & !LEB128_CONTINUATION;
            value >>= 7;
            if value != 0 {
                byte |= LEB128_CONTINUATION;
            }
            self.put_u8(byte);
            if value == 0 {
                return;
            }
        }
    }

    fn put_osu_string(&mut self, value: &str) {
        if value.is_empty() {
            self.put_u8(STRING_ABSENT);
        } else {
            self.put_u8(STRING_PRESENT);
            self.put_uleb128(value.len() as u64);
            self.put_slice(value.as_bytes());
        }
    }

    fn put_osu_message(&mut self, value: &OsuMessage) {
        self.put_osu_string(&value.sender);
        self.put_osu_string(&value.text);
        self.put_osu_string(&value.recipient);
        self.put_i32_le(value.sender_id);
    }
}

impl<B: BufMut> OsuWriter for B {}

// ── Tests ─────────────────────────────────────────────────────────────────────
