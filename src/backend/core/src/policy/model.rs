//! Policy data model: identifiers, relations, tuples, and mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque name of a principal, group, or resource node.
///
/// The same string may appear in either hierarchy; its role is decided by the
/// [`Relation`] it is queried through, never by its spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short stable digest used in logs in place of the raw value.
    ///
    /// Principals are usually API keys, so they never reach a log line verbatim
    /// when redaction is on.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }

    /// Fail with `InvalidArgument` when the identifier is blank.
    pub fn ensure_present(&self, what: &str) -> Result<()> {
        if self.is_empty() {
            return Err(AuthzError::InvalidArgument(format!("{} must not be empty", what)));
        }
        Ok(())
    }

    /// Like [`ensure_present`](Self::ensure_present), and also rejects
    /// surrounding whitespace, which a policy file cannot keep.
    pub fn ensure_storable(&self, what: &str) -> Result<()> {
        self.ensure_present(what)?;
        ensure_unpadded(&self.0, what)
    }
}

fn ensure_unpadded(value: &str, what: &str) -> Result<()> {
    if value.trim() != value {
        return Err(AuthzError::InvalidArgument(format!(
            "{} must not have leading or trailing whitespace: {:?}",
            what, value
        )));
    }
    Ok(())
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

/// The action part of a grant, e.g. `call`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The action every tool invocation is checked against.
    pub fn call() -> Self {
        Self::new("call")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ensure_present(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(AuthzError::InvalidArgument("action must not be empty".into()));
        }
        Ok(())
    }

    pub fn ensure_storable(&self) -> Result<()> {
        self.ensure_present()?;
        ensure_unpadded(&self.0, "action")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for Action {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Action> for Action {
    fn from(a: &Action) -> Self {
        a.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Relations
// ═══════════════════════════════════════════════════════════════════════════════

/// The two grouping relations the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Principal → group membership (`g`).
    Principal,
    /// Resource child → resource parent containment (`g2`).
    Resource,
}

impl Relation {
    /// Name used in persisted policy rules.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Principal => "g",
            Self::Resource => "g2",
        }
    }

    pub fn all() -> [Relation; 2] {
        [Self::Principal, Self::Resource]
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "g" => Ok(Self::Principal),
            "g2" => Ok(Self::Resource),
            other => Err(AuthzError::InvalidArgument(format!(
                "unknown relation '{}'",
                other
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tuples
// ═══════════════════════════════════════════════════════════════════════════════

/// `child` belongs to (or is contained in) `parent` within `relation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingTuple {
    pub relation: Relation,
    pub child: Identifier,
    pub parent: Identifier,
}

impl GroupingTuple {
    pub fn new(
        relation: Relation,
        child: impl Into<Identifier>,
        parent: impl Into<Identifier>,
    ) -> Self {
        Self {
            relation,
            child: child.into(),
            parent: parent.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.child.ensure_storable("grouping child")?;
        self.parent.ensure_storable("grouping parent")
    }
}

impl fmt::Display for GroupingTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.relation, self.child, self.parent)
    }
}

/// `subject` (group or principal) may perform `action` on `resource` and
/// everything contained beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionTuple {
    pub subject: Identifier,
    pub resource: Identifier,
    pub action: Action,
}

impl PermissionTuple {
    pub fn new(
        subject: impl Into<Identifier>,
        resource: impl Into<Identifier>,
        action: impl Into<Action>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.subject.ensure_storable("permission subject")?;
        self.resource.ensure_storable("permission resource")?;
        self.action.ensure_storable()
    }
}

impl fmt::Display for PermissionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p, {}, {}, {}", self.subject, self.resource, self.action)
    }
}

/// A stored policy line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRule {
    Grouping(GroupingTuple),
    Permission(PermissionTuple),
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grouping(t) => t.fmt(f),
            Self::Permission(t) => t.fmt(f),
        }
    }
}

impl From<GroupingTuple> for PolicyRule {
    fn from(t: GroupingTuple) -> Self {
        Self::Grouping(t)
    }
}

impl From<PermissionTuple> for PolicyRule {
    fn from(t: PermissionTuple) -> Self {
        Self::Permission(t)
    }
}

/// One mutation of the policy; the unit of persistence and rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PolicyChange {
    AddGrouping(GroupingTuple),
    RemoveGrouping(GroupingTuple),
    AddPermission(PermissionTuple),
    RemovePermission(PermissionTuple),
}

impl PolicyChange {
    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddGrouping(_) => "add_grouping",
            Self::RemoveGrouping(_) => "remove_grouping",
            Self::AddPermission(_) => "add_permission",
            Self::RemovePermission(_) => "remove_permission",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AddGrouping(t) | Self::RemoveGrouping(t) => t.validate(),
            Self::AddPermission(t) | Self::RemovePermission(t) => t.validate(),
        }
    }
}

impl fmt::Display for PolicyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddGrouping(t) => write!(f, "+ {}", t),
            Self::RemoveGrouping(t) => write!(f, "- {}", t),
            Self::AddPermission(t) => write!(f, "+ {}", t),
            Self::RemovePermission(t) => write!(f, "- {}", t),
        }
    }
}

/// Epoch of the whole policy, advanced by every effective mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRevision {
    pub epoch: u64,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRevision {
    pub fn initial() -> Self {
        Self {
            epoch: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn advance(&mut self) {
        self.epoch += 1;
        self.updated_at = Utc::now();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
