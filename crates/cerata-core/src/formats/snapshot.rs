//! Framed postcard encoding.
//!
//! ```text
//! ┌────────┬─────────┬──────────────┬─────────────────────┐
//! │ "CRTA" │ version │ checksum (8) │ postcard payload    │
//! └────────┴─────────┴──────────────┴─────────────────────┘
//! ```
//!
//! The checksum covers the payload only. It is FNV-1a 64 by default, or the
//! first 8 bytes of BLAKE3 with the `crypto-hash` feature. Frames written
//! under one setting do not verify under the other.

use crate::error::{CerataError, Result};
use crate::standard::{StandardLens, StandardRecord};
use crate::trial::TrialSnapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Frame magic.
pub const MAGIC: [u8; 4] = *b"CRTA";

/// Current frame version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1 + 8;

/// Everything needed to resume a trial manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub standard: StandardLens,
    /// Replaced standards, oldest first.
    pub history: Vec<StandardRecord>,
    /// All trials, ordered by id.
    pub trials: Vec<TrialSnapshot>,
    /// Id the next created trial receives.
    pub next_trial_id: u64,
}

impl ManagerSnapshot {
    /// Encode as a checksummed frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_frame(self)
    }

    /// Decode and verify a frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_frame(bytes)
    }
}

/// Encode any serializable value as a frame.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&checksum(&payload));
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Verify and decode a frame.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(CerataError::Format(format!(
            "frame too short: {} bytes, header needs {HEADER_LEN}",
            bytes.len()
        )));
    }
    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(CerataError::Format("bad magic".to_string()));
    }
    let (version, rest) = rest.split_at(1);
    if version[0] != FORMAT_VERSION {
        return Err(CerataError::Format(format!(
            "unsupported version {} (expected {FORMAT_VERSION})",
            version[0]
        )));
    }
    let (stored, payload) = rest.split_at(8);
    if stored != checksum(payload) {
        return Err(CerataError::Format("checksum mismatch".to_string()));
    }
    Ok(postcard::from_bytes(payload)?)
}

#[cfg(not(feature = "crypto-hash"))]
fn checksum(payload: &[u8]) -> [u8; 8] {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in payload {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash.to_le_bytes()
}

#[cfg(feature = "crypto-hash")]
fn checksum(payload: &[u8]) -> [u8; 8] {
    let digest = blake3::hash(payload);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest.as_bytes()[..8]);
    out
}

// =============================================================================
// TESTS
// =============================================================================
