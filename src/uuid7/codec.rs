// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Encoding / decoding of 128-bit **UUIDv7** identifiers.
//!
//! The byte layout follows draft-ietf-uuidrev-rfc4122bis §5.7:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       unix_ts_ms (48 bits)                    |
//! |            ...        | ver=7 |       sequence (12 bits)      |
//! |var|                 pseudo-random (62 bits)                   |
//! |                       ...                                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The random tail is not drawn from an RNG: it is the SHA-256 digest of the
//! generator seed with the timestamp written into the seed's six time slots
//! and the sequence XORed into the two bytes after them. Given the same
//! (seed, ts, seq) the whole value is reproducible, which is what lets the
//! hub re-derive a client-claimed id from the seed it issued.

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Wire length of a UUID in bytes.
pub const UUID_LEN: usize = 16;

/// Length of the generator seed material (6 time slots + 74 random bytes).
pub const SEED_LEN: usize = 80;

/// Number of leading seed bytes reserved for the millisecond timestamp.
pub(crate) const TIME_SLOTS: usize = 6;

/// SHA-256 as a plain byte-in/byte-out function.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A time-ordered 128-bit identifier.
///
/// `Ord` compares raw bytes, which coincides with lexicographic order of the
/// 36-char lowercase hex form, so id comparisons and string comparisons
/// agree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid7([u8; UUID_LEN]);

impl Uuid7 {
    pub const fn from_bytes(bytes: [u8; UUID_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; UUID_LEN] {
        &self.0
    }

    /// Milliseconds carried in bytes 0..5 (big-endian).
    pub fn timestamp_millis(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&self.0[..TIME_SLOTS]);
        u64::from_be_bytes(buf)
    }

    /// The 12-bit sequence counter in the low nibble of byte 6 and byte 7.
    pub fn sequence(&self) -> u16 {
        (u16::from(self.0[6] & 0x0F) << 8) | u16::from(self.0[7])
    }

    /// Checks the version nibble (7) and the variant bits (0b10).
    pub fn is_v7(&self) -> bool {
        self.0[6] >> 4 == 0x7 && self.0[8] >> 6 == 0b10
    }
}

/// Assembles a UUIDv7 from seed material, timestamp and sequence.
///
/// Pure over its inputs; truncates `ts` to 48 bits and `seq` to 12.
pub(crate) fn build(seed: &[u8; SEED_LEN], ts: u64, seq: u16) -> Uuid7 {
    let ts_bytes = encode_ts48(ts);
    let seq = seq & 0x0FFF;

    let mut material = *seed;
    material[..TIME_SLOTS].copy_from_slice(&ts_bytes);
    material[TIME_SLOTS] ^= (seq >> 8) as u8;
    material[TIME_SLOTS + 1] ^= (seq & 0xFF) as u8;
    let digest = sha256(&material);

    let mut out = [0u8; UUID_LEN];
    out[..TIME_SLOTS].copy_from_slice(&ts_bytes);
    out[6] = 0x70 | (seq >> 8) as u8;
    out[7] = (seq & 0xFF) as u8;
    out[8..].copy_from_slice(&digest[..8]);
    out[8] = 0b1000_0000 | (out[8] & 0x3F);

    Uuid7(out)
}

fn encode_ts48(ts: u64) -> [u8; TIME_SLOTS] {
    let be = (ts & 0xFFFF_FFFF_FFFF).to_be_bytes();
    let mut out = [0u8; TIME_SLOTS];
    out.copy_from_slice(&be[2..]);
    out
}

impl fmt::Display for Uuid7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uuid7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid7({self})")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseUuidError {
    #[error("expected 36 characters, got {0}")]
    Length(usize),
    #[error("expected '-' at position {0}")]
    MissingDash(usize),
    #[error("invalid hex digit at position {0}")]
    InvalidDigit(usize),
}

impl FromStr for Uuid7 {
    type Err = ParseUuidError;

    /// Strict 36-character hex-with-dashes parser. Dashes are accepted only
    /// at positions 8, 13, 18 and 23; everything else must be a hex digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.as_bytes();
        if raw.len() != 36 {
            return Err(ParseUuidError::Length(raw.len()));
        }

        let mut out = [0u8; UUID_LEN];
        let mut nibbles = 0usize;
        for (pos, &c) in raw.iter().enumerate() {
            if matches!(pos, 8 | 13 | 18 | 23) {
                if c != b'-' {
                    return Err(ParseUuidError::MissingDash(pos));
                }
                continue;
            }
            let digit = match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => return Err(ParseUuidError::InvalidDigit(pos)),
            };
            out[nibbles / 2] = (out[nibbles / 2] << 4) | digit;
            nibbles += 1;
        }

        Ok(Self(out))
    }
}
