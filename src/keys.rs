//! Master key resolution and ownership.
//!
//! This module owns two responsibilities:
//! 1. Resolving the process-wide master key from an operator override, a
//!    persisted key file, or freshly generated material.
//! 2. Holding key material in a type that is opaque, non-cloneable, and
//!    zeroised on drop.
//!
//! ## Resolution order
//!
//! ```text
//! operator override  ->  persisted key file  ->  generate + persist
//! ```
//!
//! When the override is present, the key file path is never created or even
//! touched. The key source stays auditable: an environment that manages the
//! key externally will never find a silently created file on disk.
//!
//! The key is encoded as standard base64 of the 32 raw bytes (44 characters)
//! wherever it appears in text form — override value or key file body.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info};
use zeroize::Zeroize;

use crate::crypto::{self, KEY_LEN};
use crate::error::CredvaultError;

/// Environment variable checked by [`MasterKeyProvider::from_env`].
pub const MASTER_KEY_ENV: &str = "CREDVAULT_MASTER_KEY";

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// The single symmetric key backing all vault operations for a process.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop. Memory is overwritten before deallocation.
/// - Resolved once at startup and treated as immutable shared state for the
///   process lifetime. Rotation means provisioning a new provider and
///   re-encrypting existing values out-of-band.
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Construct a `MasterKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Borrow the raw key bytes for encrypt/decrypt operations.
    ///
    /// This method is `pub(crate)` — raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        // Overwrite key material before the memory is deallocated.
        self.bytes.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Resolves the master key for a process.
///
/// Constructed explicitly at startup and passed to consumers; there is no
/// lazily-initialized global instance.
pub struct MasterKeyProvider {
    override_value: Option<String>,
    key_file: PathBuf,
}

impl MasterKeyProvider {
    /// Build a provider with an explicit override value and key file path.
    ///
    /// `override_value` is typically sourced from process configuration; when
    /// present it takes absolute priority and `key_file` is left untouched.
    pub fn new(override_value: Option<String>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            override_value,
            key_file: key_file.into(),
        }
    }

    /// Build a provider that reads the override from [`MASTER_KEY_ENV`].
    ///
    /// An empty variable counts as absent.
    pub fn from_env(key_file: impl Into<PathBuf>) -> Self {
        let override_value = std::env::var(MASTER_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self::new(override_value, key_file)
    }

    /// Resolve the master key.
    ///
    /// Deterministic per process unless explicitly rotated. An unreadable or
    /// corrupt key file is fatal: the process must not start with an unusable
    /// key, so the error is returned rather than papered over with fresh
    /// material.
    pub fn resolve(&self) -> Result<MasterKey, CredvaultError> {
        if let Some(encoded) = &self.override_value {
            debug!("using master key from operator override");
            return decode_key(encoded.trim());
        }

        if self.key_file.exists() {
            debug!("loading master key from {}", self.key_file.display());
            let text = fs::read_to_string(&self.key_file).map_err(|err| {
                CredvaultError::KeyFileUnreadable(format!(
                    "{}: {}",
                    self.key_file.display(),
                    err
                ))
            })?;
            return decode_key(text.trim()).map_err(|_| {
                CredvaultError::KeyFileUnreadable(format!(
                    "{}: not a valid base64-encoded {}-byte key",
                    self.key_file.display(),
                    KEY_LEN
                ))
            });
        }

        info!(
            "generating new master key, persisting to {}",
            self.key_file.display()
        );
        let bytes = crypto::generate_random_key()?;
        if let Some(parent) = self.key_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        write_owner_only(&self.key_file, &STANDARD.encode(bytes))?;
        Ok(MasterKey::from_bytes(bytes))
    }
}

fn decode_key(encoded: &str) -> Result<MasterKey, CredvaultError> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| CredvaultError::InvalidKey)?;
    let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|_| CredvaultError::InvalidKey)?;
    Ok(MasterKey::from_bytes(bytes))
}

/// Create the key file with owner-only permissions (0600).
///
/// `create_new` so a concurrently created file is never truncated.
#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents.as_bytes())
}
