//! Durable storage for access keys, usage events, and identity roles.
//!
//! Backed by an embedded SQLite database. Every operation on this store is a
//! single atomic SQL interaction; multi-step guarantees (insert-if-absent,
//! revoke-once) are expressed as constraints and conditional statements, not
//! read-then-write sequences, so concurrent callers need no extra locking.
//!
//! The schema is managed by explicit, versioned migrations applied once at
//! open time. Nothing on a read path ever alters the schema.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::access::{AccessKeyUsageEvent, Permissions};
use crate::auth::{Identity, Role};
use crate::error::CredvaultError;

/// Schema migrations, applied in order. `PRAGMA user_version` records the
/// last applied entry; each pending entry runs inside its own transaction.
const MIGRATIONS: &[&str] = &[
    // v1: access keys and their append-only usage trail. The UNIQUE
    // constraint on key_hash doubles as the lookup index for verification.
    "CREATE TABLE access_keys (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        key_hash    TEXT NOT NULL UNIQUE,
        key_prefix  TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        expires_at  TEXT,
        revoked_at  TEXT,
        created_by  TEXT NOT NULL,
        permissions TEXT NOT NULL DEFAULT 'full'
    );
    CREATE TABLE access_key_usage (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        key_id          TEXT NOT NULL REFERENCES access_keys(id),
        endpoint        TEXT NOT NULL,
        method          TEXT NOT NULL,
        caller_address  TEXT,
        user_agent      TEXT,
        timestamp       TEXT NOT NULL,
        response_status INTEGER
    );
    CREATE INDEX idx_access_key_usage_key_id ON access_key_usage(key_id);",
    // v2: identity roles. The role column exists from the start; it is never
    // added dynamically on a read path.
    "CREATE TABLE identities (
        name       TEXT PRIMARY KEY,
        role       TEXT NOT NULL DEFAULT 'user',
        created_at TEXT NOT NULL
    );",
];

/// One persisted access key row. The full credential string is never stored,
/// only its digest; this type stays inside the crate so the digest is never
/// part of the public surface.
#[derive(Debug, Clone)]
pub(crate) struct AccessKeyRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) key_hash: String,
    pub(crate) key_prefix: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) revoked_at: Option<DateTime<Utc>>,
    pub(crate) created_by: String,
    pub(crate) permissions: Permissions,
}

/// Durable table of issued access keys, their usage log, and identity roles.
///
/// Cheap to clone; clones share one connection. `Send + Sync`: any number of
/// request-scoped calls may run concurrently, serialized at the connection.
#[derive(Clone)]
pub struct AccessKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl AccessKeyStore {
    /// Open (or create) the database at `path` and bring the schema up to
    /// date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CredvaultError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database. Intended for tests.
    pub fn open_in_memory() -> Result<Self, CredvaultError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection mutex poisoned")
    }

    // -----------------------------------------------------------------------
    // Access keys
    // -----------------------------------------------------------------------

    /// Insert a new key row. Digest uniqueness is enforced by the UNIQUE
    /// constraint, making this an atomic insert-if-absent.
    pub(crate) fn insert_key(&self, record: &AccessKeyRecord) -> Result<(), CredvaultError> {
        self.conn().execute(
            "INSERT INTO access_keys
                (id, name, key_hash, key_prefix, created_at, expires_at, revoked_at, created_by, permissions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.name,
                record.key_hash,
                record.key_prefix,
                record.created_at,
                record.expires_at,
                record.revoked_at,
                record.created_by,
                record.permissions.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Look up a key row by credential digest.
    pub(crate) fn find_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<AccessKeyRecord>, CredvaultError> {
        let record = self
            .conn()
            .query_row(
                "SELECT id, name, key_hash, key_prefix, created_at, expires_at, revoked_at,
                        created_by, permissions
                 FROM access_keys WHERE key_hash = ?1",
                params![key_hash],
                row_to_key,
            )
            .optional()?;
        Ok(record)
    }

    /// Set `revoked_at` if it is not already set. The first revocation
    /// timestamp is final; later calls are no-ops, so revocation is
    /// idempotent and never cleared or moved.
    pub(crate) fn mark_revoked(
        &self,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<(), CredvaultError> {
        self.conn().execute(
            "UPDATE access_keys SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
            params![when, id],
        )?;
        Ok(())
    }

    /// All key rows, newest first.
    pub(crate) fn list_keys(&self) -> Result<Vec<AccessKeyRecord>, CredvaultError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, key_hash, key_prefix, created_at, expires_at, revoked_at,
                    created_by, permissions
             FROM access_keys ORDER BY created_at DESC",
        )?;
        let records = stmt
            .query_map([], row_to_key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Usage log (append-only)
    // -----------------------------------------------------------------------

    /// Append one usage event. Events are never updated or deleted.
    pub(crate) fn append_usage(&self, event: &AccessKeyUsageEvent) -> Result<(), CredvaultError> {
        self.conn().execute(
            "INSERT INTO access_key_usage
                (key_id, endpoint, method, caller_address, user_agent, timestamp, response_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.key_id,
                event.endpoint,
                event.method,
                event.caller_address,
                event.user_agent,
                event.timestamp,
                event.response_status,
            ],
        )?;
        Ok(())
    }

    /// Usage events for one key, most recent first. Ties on the stored
    /// timestamp fall back to insertion order.
    pub(crate) fn usage_for_key(
        &self,
        key_id: &str,
        limit: usize,
    ) -> Result<Vec<AccessKeyUsageEvent>, CredvaultError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key_id, endpoint, method, caller_address, user_agent, timestamp, response_status
             FROM access_key_usage WHERE key_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let events = stmt
            .query_map(params![key_id, limit as i64], |row| {
                Ok(AccessKeyUsageEvent {
                    key_id: row.get(0)?,
                    endpoint: row.get(1)?,
                    method: row.get(2)?,
                    caller_address: row.get(3)?,
                    user_agent: row.get(4)?,
                    timestamp: row.get(5)?,
                    response_status: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Identity roles
    // -----------------------------------------------------------------------

    /// Register a new identity. The very first identity in the table becomes
    /// `admin`, every later one `user`. The role choice and the insert are a
    /// single statement, so two concurrent first registrations cannot both
    /// observe an empty table and both become admin.
    pub(crate) fn register_identity(&self, name: &str) -> Result<Identity, CredvaultError> {
        let role: String = self.conn().query_row(
            "INSERT INTO identities (name, role, created_at)
             VALUES (
                ?1,
                CASE WHEN (SELECT COUNT(*) FROM identities) = 0 THEN 'admin' ELSE 'user' END,
                ?2
             )
             RETURNING role",
            params![name, Utc::now()],
            |row| row.get(0),
        )?;
        Ok(Identity {
            name: name.to_string(),
            role: Role::parse(&role)?,
        })
    }

    /// Role of a registered identity, or `None` for an unknown name.
    pub(crate) fn role_of(&self, name: &str) -> Result<Option<Role>, CredvaultError> {
        let role: Option<String> = self
            .conn()
            .query_row(
                "SELECT role FROM identities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match role {
            Some(value) => Ok(Some(Role::parse(&value)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the role of an identity. Unknown names are a no-op, matching
    /// the update-returns-success contract of the role endpoints above this
    /// layer.
    pub(crate) fn set_role(&self, name: &str, role: Role) -> Result<(), CredvaultError> {
        self.conn().execute(
            "UPDATE identities SET role = ?1 WHERE name = ?2",
            params![role.as_str(), name],
        )?;
        Ok(())
    }
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessKeyRecord> {
    Ok(AccessKeyRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        revoked_at: row.get(6)?,
        created_by: row.get(7)?,
        permissions: parse_permissions(8, row.get(8)?)?,
    })
}

fn parse_permissions(col: usize, value: String) -> rusqlite::Result<Permissions> {
    Permissions::parse(&value).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn migrate(conn: &mut Connection) -> Result<(), CredvaultError> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!("applied schema migration v{}", version);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str, hash: &str) -> AccessKeyRecord {
        AccessKeyRecord {
            id: id.to_string(),
            name: "sample".to_string(),
            key_hash: hash.to_string(),
            key_prefix: "sk_live_abcd...".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            created_by: "tests".to_string(),
            permissions: Permissions::Full,
        }
    }

    #[test]
    fn test_migrations_reach_latest_version() {
        let store = AccessKeyStore::open_in_memory().unwrap();
        let version: i64 = store
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_migrations_are_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");

        let store = AccessKeyStore::open(&path).unwrap();
        store.insert_key(&sample_record("k1", "h1")).unwrap();
        drop(store);

        // Reopening must not re-run migrations or lose rows.
        let store = AccessKeyStore::open(&path).unwrap();
        assert_eq!(store.list_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_hash_is_rejected() {
        let store = AccessKeyStore::open_in_memory().unwrap();
        store.insert_key(&sample_record("k1", "same-hash")).unwrap();

        let result = store.insert_key(&sample_record("k2", "same-hash"));
        assert!(matches!(result, Err(CredvaultError::Storage(_))));
    }

    #[test]
    fn test_mark_revoked_keeps_first_timestamp() {
        let store = AccessKeyStore::open_in_memory().unwrap();
        store.insert_key(&sample_record("k1", "h1")).unwrap();

        let first = Utc::now();
        store.mark_revoked("k1", first).unwrap();
        store
            .mark_revoked("k1", first + chrono::Duration::hours(1))
            .unwrap();

        let record = store.find_by_hash("h1").unwrap().unwrap();
        assert_eq!(record.revoked_at, Some(first));
    }

    #[test]
    fn test_first_identity_is_admin_then_user() {
        let store = AccessKeyStore::open_in_memory().unwrap();

        let first = store.register_identity("alice").unwrap();
        let second = store.register_identity("bob").unwrap();

        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.role, Role::User);
        assert_eq!(store.role_of("alice").unwrap(), Some(Role::Admin));
        assert_eq!(store.role_of("missing").unwrap(), None);
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let store = AccessKeyStore::open_in_memory().unwrap();
        store.register_identity("alice").unwrap();
        assert!(store.register_identity("alice").is_err());
    }
}
