// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Signed UUIDv7 generation parameters handed to a client on `connect`.
///
/// `init_bytes` is 80 bytes: a big-endian millisecond timestamp in the first
/// six, random seed material in the rest. The signature covers the standard
/// base-64 *text* of `init_bytes`, so clients can store and echo the bundle
/// without touching raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedGenParams {
    #[serde(rename = "initBytesBase64", with = "base64_bytes")]
    pub init_bytes: Vec<u8>,
    #[serde(rename = "signatureBase64", with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedGenParams {
    /// The exact text the signature covers.
    pub fn init_text(&self) -> String {
        STANDARD.encode(&self.init_bytes)
    }
}

/// RFC 4648 §4 base-64 <-> raw bytes for wire fields.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(de)?;
        STANDARD.decode(&text).map_err(D::Error::custom)
    }
}
