// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod cfg;
pub mod contract;
pub mod hub;
pub mod keys;
pub mod models;
pub mod utils;
pub mod uuid7;
