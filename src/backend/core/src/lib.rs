#![allow(clippy::result_large_err)]
//! # Warden Core
//!
//! Hierarchical authorization decisions for API keys calling agent tools.
//!
//! ## Architecture
//!
//! - **Grouping Index**: principal → group membership and resource containment, kept acyclic
//! - **Hierarchy Resolver**: cached transitive ancestor sets per relation
//! - **Permission Index**: direct `(subject, resource, action)` grants
//! - **Enforcer**: allow/deny decisions, mutations with persist-or-rollback
//! - **Hierarchy Reporter**: tree views and access matrices
//! - **Adapters**: policy persistence (in-memory, policy file)
//! - **Telemetry**: structured logging and decision metrics

pub mod adapter;
pub mod config;
pub mod error;
pub mod policy;
pub mod telemetry;

pub use error::{AuthzError, ErrorCode, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapter::{AdapterError, FileAdapter, MemoryAdapter, PolicyAdapter};
    pub use crate::config::Config;
    pub use crate::error::{AuthzError, ErrorCode, Result};
    pub use crate::policy::{
        AccessMatrix, Action, Decision, EnforceRequest, Enforcer, EnforcerOptions,
        GroupingTuple, HierarchyReporter, Identifier, LeafRule, PermissionTuple, PolicyRule,
        Relation, ResourceTree, RootFilter, TreeNode,
    };
}
