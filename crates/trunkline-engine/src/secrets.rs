// crates/trunkline-engine/src/secrets.rs
// ============================================================================
// Module: Credential Vault Seam
// Description: Interface to the external credential-encryption primitive.
// Purpose: Decrypt agent credentials at synthesis time without owning crypto.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Agent credentials rest as ciphertext. The encryption primitive is an
//! external collaborator; the engine only needs its `decrypt` half, and only
//! at CCML synthesis time. Implementations must never log plaintext, and the
//! engine never persists what comes back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential decryption failure.
///
/// # Invariants
/// - Messages never embed ciphertext or plaintext material.
#[derive(Debug, Clone, Error)]
#[error("credential decryption failed: {0}")]
pub struct SecretError(pub String);

// ============================================================================
// SECTION: Vault
// ============================================================================

/// Decryption half of the external credential primitive.
pub trait CredentialVault: Send + Sync {
    /// Decrypts one ciphertext value.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError`] when the ciphertext cannot be opened.
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError>;
}

/// Identity vault for deployments with encryption handled upstream and for
/// tests.
///
/// # Invariants
/// - Returns its input unchanged and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughVault;

impl CredentialVault for PassthroughVault {
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
        Ok(ciphertext.to_string())
    }
}
