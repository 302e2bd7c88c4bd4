// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod codec;
pub mod r#gen;

pub use codec::{ParseUuidError, SEED_LEN, UUID_LEN, Uuid7, sha256};
pub use r#gen::{GenState, Minter};
