//! Access key issuance, verification, revocation, and usage audit.
//!
//! A credential is a bearer string `{tag}{random}`: the tag marks the issuing
//! environment (`sk_live_` / `sk_test_`) and the random segment is 24 bytes
//! from the system CSPRNG, URL-safe base64 encoded (192 bits of entropy).
//! Only the SHA-256 digest of the full string is ever persisted; the string
//! itself is returned exactly once at creation and is unrecoverable after
//! that call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto;
use crate::error::CredvaultError;
use crate::store::{AccessKeyRecord, AccessKeyStore};

/// Number of random bytes in a credential's secret segment (192 bits).
const KEY_RANDOM_LEN: usize = 24;

/// Length of the non-secret leading fragment kept for display.
const DISPLAY_PREFIX_LEN: usize = 12;

/// Issuing environment, encoded as the credential's leading tag so a leaked
/// test key can never be mistaken for a production one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnvironment {
    Live,
    Test,
}

impl KeyEnvironment {
    fn tag(self) -> &'static str {
        match self {
            Self::Live => "sk_live_",
            Self::Test => "sk_test_",
        }
    }
}

/// What a verified key is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permissions {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "readonly")]
    ReadOnly,
    #[serde(rename = "chat_only")]
    ChatOnly,
}

impl Permissions {
    /// The string stored in the `permissions` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ReadOnly => "readonly",
            Self::ChatOnly => "chat_only",
        }
    }

    /// Parse a stored permissions string.
    pub fn parse(value: &str) -> Result<Self, CredvaultError> {
        match value {
            "full" => Ok(Self::Full),
            "readonly" => Ok(Self::ReadOnly),
            "chat_only" => Ok(Self::ChatOnly),
            other => Err(CredvaultError::InvalidPermissions(other.to_string())),
        }
    }
}

/// Everything returned from key creation.
///
/// `key` is the only copy of the full credential string that will ever exist;
/// callers must hand it to the operator immediately or lose it.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub id: String,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub permissions: Permissions,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Metadata for one issued key, safe to list and serialize.
///
/// Carries neither the credential digest nor the full string — the digest
/// stays inside the store layer and the string was never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyMetadata {
    pub id: String,
    pub name: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub permissions: Permissions,
    /// Whether the key would pass verification at the time it was read:
    /// not revoked and not past its expiry.
    pub is_active: bool,
}

impl AccessKeyMetadata {
    fn from_record(record: AccessKeyRecord, now: DateTime<Utc>) -> Self {
        let expired = record.expires_at.is_some_and(|at| at <= now);
        Self {
            id: record.id,
            name: record.name,
            key_prefix: record.key_prefix,
            created_at: record.created_at,
            expires_at: record.expires_at,
            revoked_at: record.revoked_at,
            created_by: record.created_by,
            permissions: record.permissions,
            is_active: record.revoked_at.is_none() && !expired,
        }
    }
}

/// One authentication attempt or action taken under a key. Append-only:
/// never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyUsageEvent {
    pub key_id: String,
    pub endpoint: String,
    pub method: String,
    pub caller_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_status: Option<u16>,
}

/// Issuance, verification, and audit logic over an [`AccessKeyStore`].
///
/// Constructed once at startup around a store handle and passed to
/// consumers. Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct AccessKeyManager {
    store: AccessKeyStore,
}

impl AccessKeyManager {
    pub fn new(store: AccessKeyStore) -> Self {
        Self { store }
    }

    /// Issue a new access key.
    ///
    /// A negative or zero `expires_in_days` is legal and produces an already
    /// expired key; `None` means the key never expires. Store errors
    /// propagate unmodified.
    pub fn create_key(
        &self,
        name: &str,
        created_by: &str,
        permissions: Permissions,
        expires_in_days: Option<i64>,
        environment: KeyEnvironment,
    ) -> Result<IssuedKey, CredvaultError> {
        let full_key = generate_key_string(environment)?;
        let key_hash = crypto::sha256_hex(full_key.as_bytes());
        let key_prefix = display_prefix(&full_key);

        let now = Utc::now();
        let expires_at = expires_in_days.map(|days| now + Duration::days(days));

        let record = AccessKeyRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            key_hash,
            key_prefix: key_prefix.clone(),
            created_at: now,
            expires_at,
            revoked_at: None,
            created_by: created_by.to_string(),
            permissions,
        };
        self.store.insert_key(&record)?;

        Ok(IssuedKey {
            id: record.id,
            name: record.name,
            key: full_key,
            key_prefix,
            permissions,
            expires_at,
        })
    }

    /// Check a candidate credential string.
    ///
    /// Unknown, revoked, and expired credentials all collapse to `None` at
    /// this boundary — the caller learns only "not valid" — but each case is
    /// logged with its specific reason for audit. Storage failures are also
    /// masked to `None` here (and only here), so a store outage reads as a
    /// rejected credential rather than an admitted one.
    pub fn verify_key(&self, candidate: &str) -> Option<AccessKeyMetadata> {
        let key_hash = crypto::sha256_hex(candidate.as_bytes());
        let record = match self.store.find_by_hash(&key_hash) {
            Ok(found) => found,
            Err(err) => {
                error!("credential lookup failed: {}", err);
                return None;
            }
        };
        let record = match record {
            Some(record) => record,
            None => {
                warn!("rejected credential: no matching key");
                return None;
            }
        };

        if record.revoked_at.is_some() {
            warn!("rejected credential for key {}: revoked", record.id);
            return None;
        }

        let now = Utc::now();
        if let Some(expires_at) = record.expires_at {
            if expires_at <= now {
                warn!("rejected credential for key {}: expired", record.id);
                return None;
            }
        }

        Some(AccessKeyMetadata::from_record(record, now))
    }

    /// Revoke a key. Idempotent: revoking an already-revoked key succeeds
    /// and leaves the original revocation timestamp in place.
    pub fn revoke_key(&self, id: &str) -> Result<(), CredvaultError> {
        self.store.mark_revoked(id, Utc::now())
    }

    /// Metadata for every issued key, newest first.
    pub fn list_keys(&self) -> Result<Vec<AccessKeyMetadata>, CredvaultError> {
        let now = Utc::now();
        let records = self.store.list_keys()?;
        Ok(records
            .into_iter()
            .map(|record| AccessKeyMetadata::from_record(record, now))
            .collect())
    }

    /// Append one usage event for a key.
    ///
    /// A failed append is logged as a warning and swallowed: the primary
    /// request the event describes must not fail over its own audit trail.
    pub fn log_usage(
        &self,
        key_id: &str,
        endpoint: &str,
        method: &str,
        caller_address: Option<&str>,
        user_agent: Option<&str>,
        response_status: Option<u16>,
    ) {
        let event = AccessKeyUsageEvent {
            key_id: key_id.to_string(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            caller_address: caller_address.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
            timestamp: Utc::now(),
            response_status,
        };
        if let Err(err) = self.store.append_usage(&event) {
            warn!("failed to record usage for key {}: {}", key_id, err);
        }
    }

    /// Usage events for one key, most recent first.
    pub fn get_key_usage(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<AccessKeyUsageEvent>, CredvaultError> {
        self.store.usage_for_key(id, limit)
    }
}

fn generate_key_string(environment: KeyEnvironment) -> Result<String, CredvaultError> {
    let mut random = [0u8; KEY_RANDOM_LEN];
    crypto::random_bytes(&mut random)?;
    Ok(format!(
        "{}{}",
        environment.tag(),
        URL_SAFE_NO_PAD.encode(random)
    ))
}

fn display_prefix(full_key: &str) -> String {
    format!("{}...", &full_key[..DISPLAY_PREFIX_LEN])
}
