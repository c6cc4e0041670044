//! Low-level cryptographic operations.
//!
//! This module is the only place in the crate that imports `ring`. All other
//! modules encrypt, hash, and draw randomness exclusively through the
//! functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **Credential digest**: SHA-256, hex-encoded

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CredvaultError;

/// The AEAD algorithm used throughout credvault.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the master key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Fill `buf` with cryptographically secure random bytes.
///
/// Uses `ring::rand::SystemRandom` — the only source of randomness in the
/// crate. May block briefly on system entropy; never falls back to a
/// non-cryptographic generator.
pub fn random_bytes(buf: &mut [u8]) -> Result<(), CredvaultError> {
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| CredvaultError::RandomnessFailure)
}

/// Encrypt a plaintext payload using AES-256-GCM.
///
/// A fresh nonce is drawn for every call and prepended to the ciphertext, so
/// callers never track nonces themselves; decryption extracts it again.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext + GCM tag ]
/// ```
pub fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CredvaultError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CredvaultError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    random_bytes(&mut nonce_bytes)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    // `seal_in_place_append_tag` encrypts the buffer in place and appends
    // the GCM authentication tag.
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CredvaultError::EncryptionFailure)?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut in_out);
    Ok(output)
}

/// Decrypt a ciphertext payload produced by [`encrypt`].
///
/// A wrong key, a tampered ciphertext, or an input too short to carry a
/// nonce all fail the GCM authentication check and return
/// `DecryptionFailure`. The caller receives no partial plaintext.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CredvaultError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CredvaultError::DecryptionFailure);
    }

    let nonce_bytes: [u8; NONCE_LEN] = ciphertext[..NONCE_LEN]
        .try_into()
        .map_err(|_| CredvaultError::DecryptionFailure)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CredvaultError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);

    let mut payload = ciphertext[NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut payload)
        .map_err(|_| CredvaultError::DecryptionFailure)?;

    Ok(plaintext.to_vec())
}

/// Produce fresh raw key material.
///
/// The only function in the crate that creates key bytes from scratch. It
/// backs `generate_master_key()` in the public API and fresh key file
/// creation in `keys::MasterKeyProvider`.
pub fn generate_random_key() -> Result<[u8; KEY_LEN], CredvaultError> {
    let mut key = [0u8; KEY_LEN];
    random_bytes(&mut key)?;
    Ok(key)
}

/// SHA-256 digest of `data`, lowercase hex.
///
/// Used for credential hashing. No per-key salt: credentials are high-entropy
/// machine-generated strings, not user-chosen passwords, so precomputation
/// attacks are not a practical concern.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_random_key().unwrap();
        let sealed = encrypt(&key, b"payload").unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_decrypt_rejects_tampering() {
        let key = generate_random_key().unwrap();
        let mut sealed = encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &sealed),
            Err(CredvaultError::DecryptionFailure)
        ));
    }

    #[test]
    fn test_decrypt_rejects_short_input() {
        let key = generate_random_key().unwrap();
        assert!(decrypt(&key, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256("abc"), FIPS 180-2 appendix B.1.
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
