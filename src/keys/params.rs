// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Result, ensure};
use rand::RngCore;

use crate::{
    keys::keypair::ServerKeypair,
    models::params::SignedGenParams,
    utils::now_millis,
    uuid7::{GenState, SEED_LEN},
};

/// Bytes at the front of `init_bytes` carrying the notBefore timestamp.
const TS_PREFIX: usize = 6;

/// Mints and checks signed generation-parameter bundles.
///
/// The hub hands each client a signed seed; any UUIDv7 the client later
/// presents can be re-derived from that seed and the (ts, seq) embedded in
/// the id itself. Byte-equality of the reconstruction is a proof of origin
/// without per-action signatures.
#[derive(Debug, Clone)]
pub struct ParamService {
    keypair: Arc<ServerKeypair>,
}

impl ParamService {
    pub fn new(keypair: Arc<ServerKeypair>) -> Self {
        Self { keypair }
    }

    /// Draws 80 random bytes, stamps the current millisecond into the first
    /// six and signs the base-64 text of the result.
    pub fn mint_signed(&self) -> SignedGenParams {
        let mut init = [0u8; SEED_LEN];
        rand::rngs::OsRng.fill_bytes(&mut init);

        let ts = (now_millis() & 0xFFFF_FFFF_FFFF).to_be_bytes();
        init[..TS_PREFIX].copy_from_slice(&ts[2..]);

        let bundle = SignedGenParams {
            init_bytes: init.to_vec(),
            signature: Vec::new(),
        };
        let signature = self.keypair.sign(bundle.init_text().as_bytes());

        SignedGenParams {
            signature,
            ..bundle
        }
    }

    /// Checks the signature over the base-64 text of `init_bytes`.
    pub fn verify(&self, bundle: &SignedGenParams) -> bool {
        bundle.init_bytes.len() == SEED_LEN
            && self
                .keypair
                .verify(bundle.init_text().as_bytes(), &bundle.signature)
    }

    /// Splits a bundle into the notBefore floor and the generator seed the
    /// client's minter runs under (time slots zeroed).
    pub fn decode(&self, bundle: &SignedGenParams) -> Result<GenState> {
        ensure!(
            bundle.init_bytes.len() == SEED_LEN,
            "generation parameters must hold {SEED_LEN} bytes, got {}",
            bundle.init_bytes.len()
        );

        let mut ts_buf = [0u8; 8];
        ts_buf[2..].copy_from_slice(&bundle.init_bytes[..TS_PREFIX]);
        let not_before = u64::from_be_bytes(ts_buf);

        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&bundle.init_bytes);
        for b in &mut seed[..TS_PREFIX] {
            *b = 0;
        }

        Ok(GenState::new(seed, not_before))
    }
}
