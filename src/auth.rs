//! Role-based admission of privileged operations.
//!
//! Identities are owned by the collaborating session subsystem; this module
//! only reads and writes their `role` attribute. Mapping a request context to
//! an identity name is delegated to a [`SessionResolver`] implementation —
//! the gate never inspects the request context itself, it applies the role
//! predicate once a name is known.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::CredvaultError;
use crate::store::AccessKeyStore;

/// Access level attached to an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "user")]
    User,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "readonly")]
    ReadOnly,
}

impl Role {
    /// The string stored in the `role` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::ReadOnly => "readonly",
        }
    }

    /// Parse a stored role string.
    pub fn parse(value: &str) -> Result<Self, CredvaultError> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "readonly" => Ok(Self::ReadOnly),
            other => Err(CredvaultError::InvalidRole(other.to_string())),
        }
    }
}

/// An identity as seen by the gate: a name and its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub role: Role,
}

/// The seam to the collaborating session subsystem.
///
/// Implementations map whatever the request layer hands around (headers,
/// cookies, session tokens) to an identity name. Returning `None` means the
/// request carries no usable session.
pub trait SessionResolver {
    /// The per-request value the collaborating layer passes in.
    type Context;

    /// Resolve the acting identity name for a request, if any.
    fn current_identity(&self, ctx: &Self::Context) -> Option<String>;
}

/// Gates privileged operations behind the `admin` role.
pub struct RoleGate<R> {
    store: AccessKeyStore,
    resolver: R,
}

impl<R: SessionResolver> RoleGate<R> {
    /// Build a gate over a store handle and a session resolver.
    ///
    /// Constructed once at startup and passed to consumers; there is no
    /// process-wide instance.
    pub fn new(store: AccessKeyStore, resolver: R) -> Self {
        Self { store, resolver }
    }

    /// Register a new identity name.
    ///
    /// The first identity ever registered becomes `admin`, so the system is
    /// never left without an administrator; every later one starts as `user`.
    pub fn register_identity(&self, name: &str) -> Result<Identity, CredvaultError> {
        let identity = self.store.register_identity(name)?;
        info!(
            "registered identity {} with role {}",
            identity.name,
            identity.role.as_str()
        );
        Ok(identity)
    }

    /// Role of a registered identity, or `None` for an unknown name.
    pub fn role_of(&self, name: &str) -> Result<Option<Role>, CredvaultError> {
        self.store.role_of(name)
    }

    /// Whether `name` is a registered identity holding the `admin` role.
    pub fn is_admin(&self, name: &str) -> Result<bool, CredvaultError> {
        Ok(self.role_of(name)? == Some(Role::Admin))
    }

    /// Resolve the acting identity and require the `admin` role.
    ///
    /// Fails with `Unauthenticated` when the resolver yields no name or the
    /// name is not a registered identity, and with `Forbidden` when the
    /// resolved role is anything other than `admin`.
    pub fn require_admin(&self, ctx: &R::Context) -> Result<Identity, CredvaultError> {
        let name = self
            .resolver
            .current_identity(ctx)
            .ok_or(CredvaultError::Unauthenticated)?;
        let role = self
            .store
            .role_of(&name)?
            .ok_or(CredvaultError::Unauthenticated)?;
        if role != Role::Admin {
            warn!("denied admin access for {}: role is {}", name, role.as_str());
            return Err(CredvaultError::Forbidden);
        }
        Ok(Identity { name, role })
    }

    /// Non-failing variant of [`require_admin`](Self::require_admin) for
    /// callers that render an alternate view (a redirect, a login page)
    /// instead of an error response. Storage errors still propagate.
    pub fn require_admin_or_none(
        &self,
        ctx: &R::Context,
    ) -> Result<Option<Identity>, CredvaultError> {
        let name = match self.resolver.current_identity(ctx) {
            Some(name) => name,
            None => return Ok(None),
        };
        match self.store.role_of(&name)? {
            Some(Role::Admin) => Ok(Some(Identity {
                name,
                role: Role::Admin,
            })),
            _ => Ok(None),
        }
    }

    /// Change the role of `target`, acting as `acting`.
    ///
    /// Only an `admin` acting identity may change roles, and an admin may
    /// not demote their own account; both violations fail with `Forbidden`.
    pub fn set_role(&self, acting: &str, target: &str, role: Role) -> Result<(), CredvaultError> {
        if !self.is_admin(acting)? {
            warn!("denied role change by non-admin {}", acting);
            return Err(CredvaultError::Forbidden);
        }
        if acting == target && role != Role::Admin {
            warn!("denied self-demotion by admin {}", acting);
            return Err(CredvaultError::Forbidden);
        }
        self.store.set_role(target, role)?;
        info!("set role {} for identity {}", role.as_str(), target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test resolver: the context is the identity name itself, if any.
    struct DirectResolver;

    impl SessionResolver for DirectResolver {
        type Context = Option<String>;

        fn current_identity(&self, ctx: &Self::Context) -> Option<String> {
            ctx.clone()
        }
    }

    fn gate() -> RoleGate<DirectResolver> {
        RoleGate::new(AccessKeyStore::open_in_memory().unwrap(), DirectResolver)
    }

    #[test]
    fn test_require_admin_without_identity() {
        assert!(matches!(
            gate().require_admin(&None),
            Err(CredvaultError::Unauthenticated)
        ));
    }

    #[test]
    fn test_require_admin_with_unknown_identity() {
        assert!(matches!(
            gate().require_admin(&Some("ghost".to_string())),
            Err(CredvaultError::Unauthenticated)
        ));
    }

    #[test]
    fn test_require_admin_role_check() {
        let gate = gate();
        gate.register_identity("alice").unwrap();
        gate.register_identity("bob").unwrap();

        let identity = gate.require_admin(&Some("alice".to_string())).unwrap();
        assert_eq!(identity.role, Role::Admin);

        assert!(matches!(
            gate.require_admin(&Some("bob".to_string())),
            Err(CredvaultError::Forbidden)
        ));
    }

    #[test]
    fn test_require_admin_or_none_never_fails_on_role() {
        let gate = gate();
        gate.register_identity("alice").unwrap();
        gate.register_identity("bob").unwrap();

        assert!(gate.require_admin_or_none(&None).unwrap().is_none());
        assert!(gate
            .require_admin_or_none(&Some("bob".to_string()))
            .unwrap()
            .is_none());
        assert_eq!(
            gate.require_admin_or_none(&Some("alice".to_string()))
                .unwrap()
                .unwrap()
                .name,
            "alice"
        );
    }

    #[test]
    fn test_set_role_requires_admin() {
        let gate = gate();
        gate.register_identity("alice").unwrap();
        gate.register_identity("bob").unwrap();

        assert!(matches!(
            gate.set_role("bob", "alice", Role::ReadOnly),
            Err(CredvaultError::Forbidden)
        ));

        gate.set_role("alice", "bob", Role::Admin).unwrap();
        assert_eq!(gate.role_of("bob").unwrap(), Some(Role::Admin));
    }

    #[test]
    fn test_admin_cannot_demote_own_account() {
        let gate = gate();
        gate.register_identity("alice").unwrap();

        assert!(matches!(
            gate.set_role("alice", "alice", Role::User),
            Err(CredvaultError::Forbidden)
        ));
        // Re-asserting their own admin role is allowed.
        gate.set_role("alice", "alice", Role::Admin).unwrap();
        assert_eq!(gate.role_of("alice").unwrap(), Some(Role::Admin));
    }

    #[test]
    fn test_role_wire_strings() {
        for role in [Role::User, Role::Admin, Role::ReadOnly] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert!(matches!(
            Role::parse("superuser"),
            Err(CredvaultError::InvalidRole(_))
        ));
    }
}
