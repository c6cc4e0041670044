//! Error types for credvault.
//!
//! Every variant is a distinct failure mode in the credential core. Messages
//! are intentionally minimal — they signal *what* failed without revealing
//! cryptographic state or which part of a credential check rejected a caller.

use std::fmt;

/// The single error type for all credvault operations.
#[derive(Debug)]
pub enum CredvaultError {
    /// Master key material was invalid (wrong length, malformed encoding).
    InvalidKey,

    /// Encryption failed. The underlying `ring` operation returned an error.
    EncryptionFailure,

    /// Decryption failed. This includes: wrong key, tampered ciphertext,
    /// corrupted authentication tag, or input that was never a ciphertext.
    /// Always recoverable by the caller.
    DecryptionFailure,

    /// The system's random number generator failed to produce bytes.
    RandomnessFailure,

    /// The persisted master key file exists but cannot be read or decoded.
    /// Fatal at startup: the process must not run with an unusable key.
    KeyFileUnreadable(String),

    /// No identity could be resolved from the request context.
    Unauthenticated,

    /// The resolved identity does not hold the required role.
    Forbidden,

    /// A role string outside the known set (user, admin, readonly).
    InvalidRole(String),

    /// A permissions string outside the known set (full, readonly, chat_only).
    InvalidPermissions(String),

    /// An underlying store operation failed. Propagated unmodified.
    Storage(rusqlite::Error),

    /// A filesystem operation on the key file failed.
    Io(std::io::Error),
}

impl fmt::Display for CredvaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid master key material"),
            Self::EncryptionFailure => write!(f, "encryption failed"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::KeyFileUnreadable(detail) => write!(f, "key file unreadable: {}", detail),
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::Forbidden => write!(f, "admin access required"),
            Self::InvalidRole(role) => write!(f, "invalid role: {}", role),
            Self::InvalidPermissions(value) => write!(f, "invalid permissions: {}", value),
            Self::Storage(err) => write!(f, "store operation failed: {}", err),
            Self::Io(err) => write!(f, "io operation failed: {}", err),
        }
    }
}

impl std::error::Error for CredvaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CredvaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err)
    }
}

impl From<std::io::Error> for CredvaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
