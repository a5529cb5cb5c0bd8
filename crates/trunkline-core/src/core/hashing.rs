// crates/trunkline-core/src/core/hashing.rs
// ============================================================================
// Module: Trunkline Hashing
// Description: Canonical JSON serialization and SHA-256 digests.
// Purpose: Derive stable identifiers from structured payloads.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Derived event identifiers must be identical for identical payloads across
//! processes and retries, so hashing always goes through canonical JSON
//! (RFC 8785) before digesting. Digests are lowercase hex SHA-256.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonical serialization failure.
#[derive(Debug, Clone, Error)]
#[error("canonical json serialization failed: {0}")]
pub struct HashError(String);

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Serializes a value to canonical JSON bytes (RFC 8785).
///
/// # Errors
///
/// Returns [`HashError`] when the value cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError(err.to_string()))
}

/// Returns the lowercase hex SHA-256 digest of the given bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let hi = char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0');
        let lo = char::from_digit(u32::from(byte & 0x0f), 16).unwrap_or('0');
        out.push(hi);
        out.push(lo);
    }
    out
}

/// Hashes a value's canonical JSON form into a lowercase hex digest.
///
/// # Errors
///
/// Returns [`HashError`] when the value cannot be serialized.
pub fn hash_canonical_json<T: Serialize>(value: &T) -> Result<String, HashError> {
    Ok(sha256_hex(&canonical_json_bytes(value)?))
}
