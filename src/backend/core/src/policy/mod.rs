//! Hierarchical authorization policy.
//!
//! A policy is three relations:
//!
//! - `p, subject, resource, action`: a grant
//! - `g, principal, group`: membership, possibly nested (groups of groups)
//! - `g2, child, parent`: resource containment, e.g. `tool → mcp → agent`
//!
//! A grant on a container covers everything beneath it, and a grant held by a
//! group covers every member beneath it. Grants never flow upward.
//!
//! # Example
//!
//! ```rust
//! use warden_core::policy::{Action, Enforcer, Identifier};
//!
//! let enforcer = Enforcer::in_memory();
//! enforcer.add_containment("tool111", "mcp11").unwrap();
//! enforcer.add_permission("qa-group", "mcp11", "call").unwrap();
//! enforcer.add_membership("bob", "qa-group").unwrap();
//!
//! let allowed = enforcer
//!     .enforce(&Identifier::new("bob"), &Identifier::new("tool111"), &Action::call())
//!     .unwrap();
//! assert!(allowed);
//! ```

pub mod enforcer;
pub mod grouping;
pub mod model;
pub mod permission;
pub mod report;
pub mod resolver;

pub use enforcer::{Decision, EnforceRequest, Enforcer, EnforcerOptions};
pub use grouping::{GroupingIndex, RelationGraph};
pub use model::{
    Action, GroupingTuple, Identifier, PermissionTuple, PolicyChange, PolicyRevision, PolicyRule,
    Relation,
};
pub use permission::PermissionIndex;
pub use report::{
    AccessMatrix, HierarchyReporter, LeafRule, NodeKind, ResourceTree, RootFilter, TreeNode,
};
pub use resolver::HierarchyResolver;
