//! Authenticated encryption of secret configuration values.
//!
//! A `SecretVault` wraps the resolved master key and turns short plaintext
//! strings into self-contained opaque strings: the fresh per-call nonce is
//! bundled into the output, so callers never track nonces themselves.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::crypto;
use crate::error::CredvaultError;
use crate::keys::MasterKey;

/// Encrypts and decrypts secrets with the process master key.
///
/// The vault owns its key for the process lifetime. It is constructed once at
/// startup and passed to consumers; nothing mutates the key in place.
pub struct SecretVault {
    master: MasterKey,
}

impl SecretVault {
    /// Build a vault around a resolved master key.
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Encrypt a plaintext string into an opaque, self-contained value.
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice never yields identical output.
    ///
    /// The empty string is returned unchanged. Optional configuration fields
    /// pass through untouched rather than producing a ciphertext of nothing;
    /// this policy applies only to the empty string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredvaultError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let sealed = crypto::encrypt(self.master.as_bytes(), plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with `DecryptionFailure` when the value is malformed, was
    /// tampered with, or was not produced under the current key. No partial
    /// plaintext is ever returned.
    ///
    /// The empty string is returned unchanged, mirroring `encrypt`.
    pub fn decrypt(&self, value: &str) -> Result<String, CredvaultError> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let sealed = STANDARD
            .decode(value)
            .map_err(|_| CredvaultError::DecryptionFailure)?;
        let plaintext = crypto::decrypt(self.master.as_bytes(), &sealed)?;
        String::from_utf8(plaintext).map_err(|_| CredvaultError::DecryptionFailure)
    }
}
