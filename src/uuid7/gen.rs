// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use tokio::sync::Mutex;

use crate::{
    utils::{generate_seed, now_millis},
    uuid7::codec::{self, SEED_LEN, Uuid7},
};

/// Sequence values occupy 12 bits; reaching this rolls the timestamp forward.
const SEQ_LIMIT: u16 = 1 << 12;

/// Deterministic UUIDv7 generator inputs.
///
/// A decoded client bundle and the hub's own minter share this shape: an
/// 80-byte seed whose first 6 bytes are zeroed time slots, a `not_before`
/// floor and the (ts, seq) pair of the last mint.
#[derive(Clone)]
pub struct GenState {
    pub not_before: u64,
    pub last_gen_ts: u64,
    pub last_gen_seq: u16,
    seed: [u8; SEED_LEN],
}

impl GenState {
    pub fn new(seed: [u8; SEED_LEN], not_before: u64) -> Self {
        Self {
            not_before,
            last_gen_ts: not_before,
            last_gen_seq: 0,
            seed,
        }
    }

    /// Fresh random generator floored at the current wall clock.
    pub fn random() -> Self {
        Self::new(generate_seed(), now_millis())
    }

    /// Deterministic mint: identical (seed, ts, seq) give identical bytes.
    /// Does not advance the generator.
    pub fn mint_at(&self, ts: u64, seq: u16) -> Uuid7 {
        codec::build(&self.seed, ts, seq)
    }

    /// Mints the next id from the wall clock, never moving backwards.
    ///
    /// Same-millisecond mints bump the sequence; a sequence overflow advances
    /// the timestamp by one millisecond and resets it.
    pub fn mint(&mut self) -> Uuid7 {
        let now = now_millis().max(self.not_before);
        let mut ts = now.max(self.last_gen_ts);
        let seq = if ts == self.last_gen_ts {
            let next = self.last_gen_seq + 1;
            if next >= SEQ_LIMIT {
                ts += 1;
                0
            } else {
                next
            }
        } else {
            0
        };

        self.last_gen_ts = ts;
        self.last_gen_seq = seq;
        self.mint_at(ts, seq)
    }

    /// Re-derives the id a client claims to have minted, from the (ts, seq)
    /// the claim itself carries. Byte-equality with the claim proves the
    /// issued seed was used.
    pub fn reconstruct(&self, claimed: &Uuid7) -> Uuid7 {
        self.mint_at(claimed.timestamp_millis(), claimed.sequence())
    }
}

impl fmt::Debug for GenState {
    // Seed material stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenState")
            .field("not_before", &self.not_before)
            .field("last_gen_ts", &self.last_gen_ts)
            .field("last_gen_seq", &self.last_gen_seq)
            .finish_non_exhaustive()
    }
}

/// Process-wide authoritative minter: auto client ids, initial
/// `last_action_id`s and server-side overrides all come from here.
#[derive(Debug)]
pub struct Minter {
    state: Mutex<GenState>,
}

impl Minter {
    pub fn new(state: GenState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn random() -> Self {
        Self::new(GenState::random())
    }

    pub async fn mint(&self) -> Uuid7 {
        self.state.lock().await.mint()
    }
}
