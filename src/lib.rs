//! # credvault
//!
//! Credential and secret management core.
//!
//! Three concerns live here:
//! - **Secret vault** — authenticated encryption of operator-supplied secret
//!   strings under a single process-wide master key.
//! - **Access keys** — issuance, verification, and revocation of bearer
//!   credentials, with expiry and an append-only usage audit trail.
//! - **Role gate** — admission of privileged operations restricted to
//!   identities holding the `admin` role.
//!
//! The crate exposes no network surface of its own. Collaborating layers
//! construct a [`store::AccessKeyStore`], a [`vault::SecretVault`], an
//! [`access::AccessKeyManager`], and a [`auth::RoleGate`] once at startup and
//! pass them to request handlers; nothing here is a process-wide singleton.
//!
//! ## Public API
//!
//! The public surface of this crate is intentionally narrow. Only the types
//! and functions exposed by the modules below are intended for use by
//! callers. Everything else is `pub(crate)` at most.

// Module declarations.
pub(crate) mod crypto;
pub mod error;
pub mod keys;
pub mod vault;
pub mod store;
pub mod access;
pub mod auth;

use keys::MasterKey;

/// Generate a cryptographically secure master key.
///
/// Produces fresh key material without persisting it anywhere — useful for
/// tests and for environments that manage the key externally. Processes that
/// want the resolve-or-generate-and-persist behavior go through
/// [`keys::MasterKeyProvider`] instead.
pub fn generate_master_key() -> Result<MasterKey, error::CredvaultError> {
    let bytes = crypto::generate_random_key()?;
    Ok(MasterKey::from_bytes(bytes))
}
