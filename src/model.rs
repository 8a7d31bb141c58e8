//! Data model for signed, hash-chained blocks.
//!
//! Blocks are plain values: hashing, signing and verification are pure
//! functions, and signing a block yields a new value rather than mutating one.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::crypto::{sign_bytes, verify_bytes};
use crate::error::LedgerError;

/// `previousHash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain.
    pub index: u64,
    /// ISO-8601 UTC timestamp with millisecond precision.
    pub timestamp: String,
    /// Opaque application payload.
    pub data: Value,
    /// Hash of the preceding block, `"0"` for genesis.
    pub previous_hash: String,
    /// SHA-256 hex over `index || timestamp || data || previous_hash`.
    pub hash: String,
    /// Ed25519 signature (hex) over `hash`; `None` until signed.
    pub signature: Option<String>,
}

impl Block {
    /// Build an unsigned block and compute its hash.
    pub fn create(
        index: u64,
        timestamp: impl Into<String>,
        data: Value,
        previous_hash: impl Into<String>,
    ) -> Self {
        let timestamp = timestamp.into();
        let previous_hash = previous_hash.into();
        let hash = compute_hash(index, &timestamp, &data, &previous_hash);
        Self {
            index,
            timestamp,
            data,
            previous_hash,
            hash,
            signature: None,
        }
    }

    /// The fixed first block of every chain, signed with `signing`.
    pub fn genesis(timestamp: impl Into<String>, signing: &SigningKey) -> Self {
        Self::create(
            0,
            timestamp,
            json!({ "message": "Genesis Block" }),
            GENESIS_PREVIOUS_HASH,
        )
        .sign(signing)
    }

    /// Consume the block and return it carrying a signature over its hash.
    pub fn sign(self, signing: &SigningKey) -> Self {
        let signature = sign_hash(signing, &self.hash);
        Self {
            signature: Some(signature),
            ..self
        }
    }

    /// True iff a signature is present and verifies over `hash`.
    pub fn verify(&self, verifying: &VerifyingKey) -> bool {
        verify_hash(verifying, &self.hash, self.signature.as_deref())
    }

    /// Hash recomputed from the block's current fields.
    pub fn recomputed_hash(&self) -> String {
        compute_hash(self.index, &self.timestamp, &self.data, &self.previous_hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Compact JSON of `data` with object keys in sorted order.
pub fn canonical_data(data: &Value) -> String {
    data.to_string()
}

/// Block hash over the undelimited concatenation of its header fields.
///
/// Field boundaries are not encoded, so distinct inputs can collide
/// (`index 1` + `"1..."` vs `index 11` + `"..."`). Kept for compatibility
/// with existing chain files.
pub fn compute_hash(index: u64, timestamp: &str, data: &Value, previous_hash: &str) -> String {
    let index = index.to_string();
    let data = canonical_data(data);
    hash_concat(&[
        index.as_bytes(),
        timestamp.as_bytes(),
        data.as_bytes(),
        previous_hash.as_bytes(),
    ])
}

/// Sign the UTF-8 bytes of a hex hash and return the signature as hex.
pub fn sign_hash(signing: &SigningKey, hash: &str) -> String {
    hex::encode(sign_bytes(signing, hash.as_bytes()).to_bytes())
}

/// Verify a hex signature over a hex hash. Missing or undecodable signatures fail.
pub fn verify_hash(verifying: &VerifyingKey, hash: &str, signature: Option<&str>) -> bool {
    let Some(sig_hex) = signature else {
        return false;
    };
    let Ok(raw) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&raw) else {
        return false;
    };
    verify_bytes(verifying, hash.as_bytes(), &sig)
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_timestamp() -> Result<String, LedgerError> {
    Ok(OffsetDateTime::now_utc().format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))?)
}
