//! Tests for role-gated admission of privileged operations.

use credvault::auth::{Role, RoleGate, SessionResolver};
use credvault::error::CredvaultError;
use credvault::store::AccessKeyStore;

/// Stand-in for the collaborating session subsystem: the request context is
/// just an optional identity name.
struct StubSessions;

impl SessionResolver for StubSessions {
    type Context = Option<String>;

    fn current_identity(&self, ctx: &Self::Context) -> Option<String> {
        ctx.clone()
    }
}

fn gate() -> RoleGate<StubSessions> {
    RoleGate::new(AccessKeyStore::open_in_memory().unwrap(), StubSessions)
}

fn ctx(name: &str) -> Option<String> {
    Some(name.to_string())
}

#[test]
fn test_first_identity_bootstraps_as_admin() {
    let gate = gate();

    // A fresh system must never be left without an administrator.
    let first = gate.register_identity("alice").unwrap();
    let second = gate.register_identity("bob").unwrap();

    assert_eq!(first.role, Role::Admin);
    assert_eq!(second.role, Role::User);
}

#[test]
fn test_require_admin_distinguishes_unauthenticated_from_forbidden() {
    let gate = gate();
    gate.register_identity("alice").unwrap();
    gate.register_identity("bob").unwrap();

    // No resolvable identity at all.
    assert!(matches!(
        gate.require_admin(&None),
        Err(CredvaultError::Unauthenticated)
    ));

    // Resolvable but not registered.
    assert!(matches!(
        gate.require_admin(&ctx("mallory")),
        Err(CredvaultError::Unauthenticated)
    ));

    // Registered but not admin.
    assert!(matches!(
        gate.require_admin(&ctx("bob")),
        Err(CredvaultError::Forbidden)
    ));

    // Admin passes and gets their identity back.
    let identity = gate.require_admin(&ctx("alice")).unwrap();
    assert_eq!(identity.name, "alice");
    assert_eq!(identity.role, Role::Admin);
}

#[test]
fn test_require_admin_or_none_is_the_quiet_variant() {
    let gate = gate();
    gate.register_identity("alice").unwrap();
    gate.register_identity("bob").unwrap();

    assert!(gate.require_admin_or_none(&None).unwrap().is_none());
    assert!(gate.require_admin_or_none(&ctx("bob")).unwrap().is_none());

    let identity = gate.require_admin_or_none(&ctx("alice")).unwrap().unwrap();
    assert_eq!(identity.name, "alice");
}

#[test]
fn test_only_admins_change_roles() {
    let gate = gate();
    gate.register_identity("alice").unwrap();
    gate.register_identity("bob").unwrap();
    gate.register_identity("carol").unwrap();

    assert!(matches!(
        gate.set_role("bob", "carol", Role::ReadOnly),
        Err(CredvaultError::Forbidden)
    ));
    assert_eq!(gate.role_of("carol").unwrap(), Some(Role::User));

    gate.set_role("alice", "carol", Role::ReadOnly).unwrap();
    assert_eq!(gate.role_of("carol").unwrap(), Some(Role::ReadOnly));
}

#[test]
fn test_promoted_admin_can_act() {
    let gate = gate();
    gate.register_identity("alice").unwrap();
    gate.register_identity("bob").unwrap();

    gate.set_role("alice", "bob", Role::Admin).unwrap();

    // Once promoted, bob passes the gate and may change roles himself.
    gate.require_admin(&ctx("bob")).unwrap();
    gate.set_role("bob", "alice", Role::ReadOnly).unwrap();
    assert_eq!(gate.role_of("alice").unwrap(), Some(Role::ReadOnly));
}

#[test]
fn test_admin_cannot_remove_own_admin_role() {
    let gate = gate();
    gate.register_identity("alice").unwrap();

    assert!(matches!(
        gate.set_role("alice", "alice", Role::User),
        Err(CredvaultError::Forbidden)
    ));
    assert_eq!(gate.role_of("alice").unwrap(), Some(Role::Admin));
}
