//! Permission index: direct `(subject, resource, action)` grants.
//!
//! This is a pure set-membership store. Walking either hierarchy is the
//! enforcer's job.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::model::{Action, Identifier, PermissionTuple};
use crate::error::Result;

/// Grants keyed subject → resource → actions, plus insertion order for listings.
#[derive(Debug, Clone, Default)]
pub struct PermissionIndex {
    grants: HashMap<Identifier, HashMap<Identifier, HashSet<Action>>>,
    order: Vec<PermissionTuple>,
}

impl PermissionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a grant; returns `false` if it was already present.
    pub fn add(
        &mut self,
        subject: impl Into<Identifier>,
        resource: impl Into<Identifier>,
        action: impl Into<Action>,
    ) -> Result<bool> {
        let tuple = PermissionTuple::new(subject, resource, action);
        tuple.validate()?;
        Ok(self.insert_at(self.order.len(), tuple))
    }

    /// Delete a grant, returning the list position it occupied.
    pub fn remove(&mut self, subject: &str, resource: &str, action: &str) -> Option<usize> {
        let actions = self.grants.get_mut(subject)?.get_mut(resource)?;
        if !actions.remove(action) {
            return None;
        }
        self.compact(subject, resource);

        let position = self.order.iter().position(|t| {
            t.subject.as_str() == subject
                && t.resource.as_str() == resource
                && t.action.as_str() == action
        })?;
        self.order.remove(position);

        debug!(subject = %subject, resource = %resource, action = %action, "Permission removed");
        Some(position)
    }

    /// Exact-tuple containment check.
    pub fn matches(&self, subject: &str, resource: &str, action: &str) -> bool {
        self.grants
            .get(subject)
            .and_then(|resources| resources.get(resource))
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }

    /// All grants in insertion order.
    pub fn list(&self) -> &[PermissionTuple] {
        &self.order
    }

    /// Grants held directly by `subject`.
    pub fn list_for_subject(&self, subject: &str) -> Vec<PermissionTuple> {
        self.order
            .iter()
            .filter(|t| t.subject.as_str() == subject)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert at a list position; used directly when undoing a removal.
    pub(crate) fn insert_at(&mut self, position: usize, tuple: PermissionTuple) -> bool {
        let inserted = self
            .grants
            .entry(tuple.subject.clone())
            .or_default()
            .entry(tuple.resource.clone())
            .or_default()
            .insert(tuple.action.clone());
        if !inserted {
            return false;
        }

        debug!(
            subject = %tuple.subject,
            resource = %tuple.resource,
            action = %tuple.action,
            "Permission added"
        );
        let position = position.min(self.order.len());
        self.order.insert(position, tuple);
        true
    }

    fn compact(&mut self, subject: &str, resource: &str) {
        if let Some(resources) = self.grants.get_mut(subject) {
            if resources.get(resource).is_some_and(|a| a.is_empty()) {
                resources.remove(resource);
            }
            if resources.is_empty() {
                self.grants.remove(subject);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
