//! Persistence gateway for policy tuples.
//!
//! The engine talks to storage only through [`PolicyAdapter`]: the full rule
//! set is loaded once at startup (or on reload), and every effective mutation
//! is handed to [`PolicyAdapter::persist`] before the caller sees success.
//!
//! Two adapters ship with the crate:
//! - [`MemoryAdapter`]: keeps rules in process; supports write-failure injection
//! - [`FileAdapter`]: a line-oriented policy file (`p, …` / `g, …` / `g2, …`)

mod file;

pub use file::FileAdapter;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::policy::model::{PolicyChange, PolicyRule};

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors reported by a persistence gateway.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("policy storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed policy line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("policy write rejected: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Whether the same call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Adapter Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Load/persist contract between the engine and durable storage.
pub trait PolicyAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Supply every stored rule.
    fn load_policy(&self) -> Result<Vec<PolicyRule>, AdapterError>;

    /// Durably record `change`. `rules` is the complete rule set after it.
    fn persist(&self, change: &PolicyChange, rules: &[PolicyRule]) -> Result<(), AdapterError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Memory Adapter
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process adapter.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    rules: Mutex<Vec<PolicyRule>>,
    writes: AtomicUsize,
    failures_pending: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing rule set.
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    /// Reject the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Number of accepted writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current stored rules.
    pub fn stored(&self) -> Vec<PolicyRule> {
        self.rules.lock().clone()
    }
}

impl PolicyAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_policy(&self) -> Result<Vec<PolicyRule>, AdapterError> {
        Ok(self.rules.lock().clone())
    }

    fn persist(&self, change: &PolicyChange, rules: &[PolicyRule]) -> Result<(), AdapterError> {
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AdapterError::Rejected(format!("write refused: {}", change)));
        }

        *self.rules.lock() = rules.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
