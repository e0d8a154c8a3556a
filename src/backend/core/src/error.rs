//! Error handling for Warden Core.
//!
//! This module provides:
//! - The [`AuthzError`] type returned by every fallible engine operation
//! - Stable, machine-readable [`ErrorCode`]s for consumers
//! - Error logging with tracing and metrics integration
//!
//! Enforcement against unknown identifiers and removal of missing tuples are
//! normal paths and never produce an error.

use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::adapter::AdapterError;
use crate::policy::model::{Identifier, PolicyRule, Relation};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Warden operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Hierarchy Errors (1000-1099)
    GroupingCycle,
    CycleDetected,

    // Persistence Errors (2000-2099)
    PersistenceFailed,
    PolicyLoadFailed,
    InvalidPolicy,

    // Validation Errors (4100-4199)
    InvalidArgument,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::GroupingCycle => 1000,
            Self::CycleDetected => 1001,

            Self::PersistenceFailed => 2000,
            Self::PolicyLoadFailed => 2001,
            Self::InvalidPolicy => 2002,

            Self::InvalidArgument => 4100,
        }
    }

    /// Stable string form, used as a metrics label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GroupingCycle => "GROUPING_CYCLE",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::PolicyLoadFailed => "POLICY_LOAD_FAILED",
            Self::InvalidPolicy => "INVALID_POLICY",
            Self::InvalidArgument => "INVALID_ARGUMENT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from the authorization engine.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A grouping insert would make a node its own ancestor. The index is unchanged.
    #[error("grouping {child} -> {parent} would create a cycle in relation {relation}")]
    Cycle {
        relation: Relation,
        child: Identifier,
        parent: Identifier,
    },

    /// A walk over stored tuples revisited a node on its own path.
    #[error("cycle detected in relation {relation} while resolving {node}")]
    CycleDetected { relation: Relation, node: Identifier },

    /// The persistence gateway rejected a write; the mutation was rolled back.
    #[error("policy persistence failed: {0}")]
    Persistence(#[source] AdapterError),

    /// The persistence gateway could not supply the stored policy.
    #[error("policy load failed: {0}")]
    Adapter(#[source] AdapterError),

    /// A stored rule violates an index invariant.
    #[error("invalid stored policy rule '{rule}': {source}")]
    InvalidPolicy {
        rule: PolicyRule,
        #[source]
        source: Box<AuthzError>,
    },

    /// Malformed caller input, such as an empty identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AuthzError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Cycle { .. } => ErrorCode::GroupingCycle,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::Persistence(_) => ErrorCode::PersistenceFailed,
            Self::Adapter(_) => ErrorCode::PolicyLoadFailed,
            Self::InvalidPolicy { .. } => ErrorCode::InvalidPolicy,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only transient gateway I/O qualifies; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(source) | Self::Adapter(source) => source.is_transient(),
            _ => false,
        }
    }

    /// Log this error and count it.
    pub fn log(&self) {
        let code = self.code();
        counter!("warden_errors_total", "code" => code.as_str()).increment(1);

        match self {
            Self::Persistence(_) | Self::Adapter(_) | Self::InvalidPolicy { .. } => {
                error!(code = %code, error = %self, "Policy storage error");
            }
            _ => {
                warn!(code = %code, error = %self, "Policy operation rejected");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
