//! Integration tests for the policy file adapter driving a live enforcer.

use std::fs;
use std::sync::Arc;

use warden_core::adapter::{AdapterError, FileAdapter};
use warden_core::policy::{Action, Enforcer, EnforcerOptions, Identifier, Relation};
use warden_core::AuthzError;

const POLICY: &str = "\
# containment: tool -> mcp -> agent
g2, mcp11, agent1
g2, tool111, mcp11

# grants
p, qa-group, mcp11, call

# keys
g, bob, qa-group
";

fn allowed(enforcer: &Enforcer, principal: &str, resource: &str) -> bool {
    enforcer
        .enforce(
            &Identifier::new(principal),
            &Identifier::new(resource),
            &Action::call(),
        )
        .unwrap()
}

#[test]
fn test_enforcer_loads_policy_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, POLICY).unwrap();

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert!(allowed(&enforcer, "bob", "tool111"));
    assert!(!allowed(&enforcer, "bob", "agent1"));
}

#[test]
fn test_mutations_rewrite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, POLICY).unwrap();

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    enforcer.add_containment("tool112", "mcp11").unwrap();
    enforcer
        .remove_grouping(Relation::Resource, "tool111", "mcp11")
        .unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(
        contents,
        "p, qa-group, mcp11, call\ng, bob, qa-group\ng2, mcp11, agent1\ng2, tool112, mcp11\n"
    );

    // A second engine over the same file sees the new state.
    let restarted =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert!(allowed(&restarted, "bob", "tool112"));
    assert!(!allowed(&restarted, "bob", "tool111"));
}

#[test]
fn test_missing_file_starts_empty_and_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh").join("policy.csv");

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert!(enforcer.rules().is_empty());

    enforcer.add_membership("bob", "qa-group").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "g, bob, qa-group\n");
}

#[test]
fn test_malformed_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, "g2, mcp11, agent1\np, qa-group, mcp11\n").unwrap();

    let err = Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        AuthzError::Adapter(AdapterError::Malformed { line: 2, .. })
    ));
}

#[test]
fn test_cyclic_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, "g, a, b\ng, b, c\ng, c, a\n").unwrap();

    let err = Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default())
        .unwrap_err();
    match err {
        AuthzError::InvalidPolicy { rule, .. } => assert_eq!(rule.to_string(), "g, c, a"),
        other => panic!("expected InvalidPolicy, got {other}"),
    }
}

#[test]
fn test_reload_after_external_edit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, POLICY).unwrap();

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert!(allowed(&enforcer, "bob", "tool111"));

    fs::write(&path, "g2, tool111, mcp11\n").unwrap();
    enforcer.reload().unwrap();
    assert!(!allowed(&enforcer, "bob", "tool111"));

    // A broken edit keeps the last good policy.
    fs::write(&path, "nonsense\n").unwrap();
    assert!(enforcer.reload().is_err());
    assert_eq!(enforcer.rules().len(), 1);
}

#[test]
fn test_unstorable_identifier_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    fs::write(&path, POLICY).unwrap();

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    let before = enforcer.rules();

    let err = enforcer
        .add_permission("team,a", "mcp11", "call")
        .unwrap_err();
    assert!(matches!(
        err,
        AuthzError::Persistence(AdapterError::Rejected(_))
    ));
    let err = enforcer.add_membership("eve\nevil", "qa-group").unwrap_err();
    assert!(matches!(err, AuthzError::Persistence(_)));

    assert_eq!(enforcer.rules(), before);
    assert_eq!(fs::read_to_string(&path).unwrap(), POLICY);

    let restarted =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert_eq!(restarted.rules(), before);
    assert!(!allowed(&restarted, "team,a", "tool111"));
}

#[test]
fn test_padded_identifier_rejected_before_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");

    let enforcer =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    let err = enforcer.add_membership(" bob", "qa-group").unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));
    assert!(enforcer.principals().is_empty());
    assert!(!path.exists());

    enforcer.add_membership("bob", "qa-group").unwrap();
    let restarted =
        Enforcer::new(Arc::new(FileAdapter::new(&path)), EnforcerOptions::default()).unwrap();
    assert_eq!(restarted.principals(), enforcer.principals());
}
