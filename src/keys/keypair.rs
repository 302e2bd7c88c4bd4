// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, fs, path::Path};

use anyhow::{Context, Result};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{
        DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
        LineEnding,
    },
    signature::{Keypair, SignatureEncoding, Signer, Verifier},
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::info;

/// On-disk cache format: both halves as PEM inside one JSON document.
#[derive(Debug, Serialize, Deserialize)]
struct KeypairFile {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

/// The process-wide RSA keypair backing signed generation parameters.
///
/// Loaded once at startup and immutable afterwards; signing and verification
/// are safe from any task.
pub struct ServerKeypair {
    private: RsaPrivateKey,
    signing: SigningKey<Sha256>,
    verifying: VerifyingKey<Sha256>,
}

impl ServerKeypair {
    pub const DEFAULT_BITS: usize = 4096;

    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
            .context("failed to generate RSA keypair")?;
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let signing = SigningKey::<Sha256>::new(private.clone());
        let verifying = signing.verifying_key();
        Self {
            private,
            signing,
            verifying,
        }
    }

    /// Reads the cache file, or generates a fresh keypair and persists it
    /// when the file does not exist yet.
    pub fn load_or_generate(path: &Path, bits: usize) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        info!("no keypair cache at {path:?}, generating {bits}-bit RSA keypair");
        let keypair = Self::generate(bits)?;
        keypair.persist(path)?;
        Ok(keypair)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read keypair cache {path:?}"))?;
        let file: KeypairFile = serde_json::from_str(&raw)
            .with_context(|| format!("malformed keypair cache {path:?}"))?;

        let private = RsaPrivateKey::from_pkcs8_pem(&file.private_key)
            .context("failed to parse private key PEM")?;
        // The cached public half must belong to the private half.
        let public = RsaPublicKey::from_public_key_pem(&file.public_key)
            .context("failed to parse public key PEM")?;
        anyhow::ensure!(
            public == RsaPublicKey::from(&private),
            "keypair cache {path:?} holds mismatched halves"
        );

        Ok(Self::from_private(private))
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let private_pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .context("failed to encode private key PEM")?;
        let public_pem = RsaPublicKey::from(&self.private)
            .to_public_key_pem(LineEnding::LF)
            .context("failed to encode public key PEM")?;

        let file = KeypairFile {
            public_key: public_pem,
            private_key: private_pem.to_string(),
        };
        let body = serde_json::to_string_pretty(&file)?;
        fs::write(path, body)
            .with_context(|| format!("failed to write keypair cache {path:?}"))?;
        Ok(())
    }

    /// RSA-SHA256 (PKCS#1 v1.5) signature over `msg`.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing.sign(msg).to_vec()
    }

    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(sig) = Signature::try_from(sig) else {
            return false;
        };
        self.verifying.verify(msg, &sig).is_ok()
    }
}

impl fmt::Debug for ServerKeypair {
    // Key material stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeypair").finish_non_exhaustive()
    }
}
