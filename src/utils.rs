// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::uuid7::SEED_LEN;

/// Milliseconds since the Unix epoch. UUIDv7 carries 48 bits of this; the
/// codec truncates on encode.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Draws fresh seed material for a UUIDv7 generator. The first 6 bytes are
/// the time slots and come back zeroed, same as a decoded client bundle.
pub fn generate_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    rand::rngs::OsRng.fill_bytes(&mut seed);

    for b in &mut seed[..6] {
        *b = 0;
    }

    seed
}
