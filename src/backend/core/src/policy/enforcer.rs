//! Enforcement engine for evaluating hierarchical authorization decisions.
//!
//! The enforcer answers the question:
//! "May principal P perform action A on resource R?"
//!
//! It is allowed iff some group of P (or P itself) holds a grant for A on R or
//! on any container above R. Nothing else grants access.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::grouping::GroupingIndex;
use super::model::{
    Action, GroupingTuple, Identifier, PermissionTuple, PolicyChange, PolicyRevision, PolicyRule,
    Relation,
};
use super::permission::PermissionIndex;
use super::report::{leaf_resources, AccessMatrix, HierarchyReporter, LeafRule, ResourceTree};
use super::resolver::HierarchyResolver;
use crate::adapter::{MemoryAdapter, PolicyAdapter};
use crate::error::{AuthzError, Result};
use crate::telemetry::metrics::{DecisionMetrics, MutationMetrics};

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of an enforcement check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Allowed by `grant`, held by the principal or one of its groups on the
    /// resource or one of its containers.
    Allow { grant: PermissionTuple },
    /// No grant applies.
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    /// The grant that allowed the request, if any.
    pub fn grant(&self) -> Option<&PermissionTuple> {
        match self {
            Self::Allow { grant } => Some(grant),
            Self::Deny => None,
        }
    }
}

/// One request for [`Enforcer::batch_enforce`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforceRequest {
    pub principal: Identifier,
    pub resource: Identifier,
    pub action: Action,
}

impl EnforceRequest {
    pub fn new(
        principal: impl Into<Identifier>,
        resource: impl Into<Identifier>,
        action: impl Into<Action>,
    ) -> Self {
        Self {
            principal: principal.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// Engine switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcerOptions {
    /// Memoize ancestor closures between mutations.
    pub cache_closures: bool,
    /// Log principal fingerprints instead of raw identifiers.
    pub redact_principals: bool,
}

impl Default for EnforcerOptions {
    fn default() -> Self {
        Self {
            cache_closures: true,
            redact_principals: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy State
// ═══════════════════════════════════════════════════════════════════════════════

/// How to take back an applied change.
enum Undo {
    RemoveGrouping(GroupingTuple),
    RestoreGrouping(usize, GroupingTuple),
    RemovePermission(PermissionTuple),
    RestorePermission(usize, PermissionTuple),
}

#[derive(Debug)]
struct PolicyState {
    grouping: GroupingIndex,
    permissions: PermissionIndex,
    revision: PolicyRevision,
}

impl PolicyState {
    fn empty() -> Self {
        Self {
            grouping: GroupingIndex::new(),
            permissions: PermissionIndex::new(),
            revision: PolicyRevision::initial(),
        }
    }

    /// Index stored rules, rejecting any that break an index invariant.
    fn from_rules(rules: Vec<PolicyRule>) -> Result<Self> {
        let mut state = Self::empty();
        for rule in rules {
            let outcome = match &rule {
                PolicyRule::Grouping(t) => state
                    .grouping
                    .add(t.relation, &t.child, &t.parent)
                    .map(|_| ()),
                PolicyRule::Permission(t) => state
                    .permissions
                    .add(&t.subject, &t.resource, &t.action)
                    .map(|_| ()),
            };
            if let Err(source) = outcome {
                return Err(AuthzError::InvalidPolicy {
                    rule,
                    source: Box::new(source),
                });
            }
        }
        Ok(state)
    }

    /// Apply a change. `None` means it was a no-op.
    fn apply(&mut self, change: &PolicyChange) -> Result<Option<Undo>> {
        let undo = match change {
            PolicyChange::AddGrouping(t) => self
                .grouping
                .relation_mut(t.relation)
                .add(&t.child, &t.parent)?
                .then(|| Undo::RemoveGrouping(t.clone())),
            PolicyChange::RemoveGrouping(t) => self
                .grouping
                .relation_mut(t.relation)
                .remove(t.child.as_str(), t.parent.as_str())
                .map(|position| Undo::RestoreGrouping(position, t.clone())),
            PolicyChange::AddPermission(t) => self
                .permissions
                .insert_at(self.permissions.len(), t.clone())
                .then(|| Undo::RemovePermission(t.clone())),
            PolicyChange::RemovePermission(t) => self
                .permissions
                .remove(t.subject.as_str(), t.resource.as_str(), t.action.as_str())
                .map(|position| Undo::RestorePermission(position, t.clone())),
        };
        Ok(undo)
    }

    fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveGrouping(t) => {
                self.grouping
                    .relation_mut(t.relation)
                    .remove(t.child.as_str(), t.parent.as_str());
            }
            Undo::RestoreGrouping(position, t) => {
                self.grouping
                    .relation_mut(t.relation)
                    .restore(position, &t.child, &t.parent);
            }
            Undo::RemovePermission(t) => {
                self.permissions
                    .remove(t.subject.as_str(), t.resource.as_str(), t.action.as_str());
            }
            Undo::RestorePermission(position, t) => {
                self.permissions.insert_at(position, t);
            }
        }
    }

    /// Full rule set: permissions, then memberships, then containment.
    fn rules(&self) -> Vec<PolicyRule> {
        let mut rules = Vec::with_capacity(self.permissions.len() + self.grouping.len());
        rules.extend(self.permissions.list().iter().cloned().map(PolicyRule::from));
        for relation in Relation::all() {
            rules.extend(
                self.grouping
                    .list(relation)
                    .iter()
                    .cloned()
                    .map(PolicyRule::from),
            );
        }
        rules
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcer
// ═══════════════════════════════════════════════════════════════════════════════

/// Thread-safe decision engine over the grouping and permission indexes.
///
/// Share it through `Arc`. Reads run concurrently; a mutation holds the write
/// lock until its change is persisted (or rolled back), so no reader ever sees
/// a change the gateway has not accepted.
pub struct Enforcer {
    state: RwLock<PolicyState>,
    resolver: HierarchyResolver,
    adapter: Arc<dyn PolicyAdapter>,
    options: EnforcerOptions,
}

impl fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Enforcer")
            .field("adapter", &self.adapter.name())
            .field("groupings", &state.grouping.len())
            .field("permissions", &state.permissions.len())
            .field("epoch", &state.revision.epoch)
            .field("options", &self.options)
            .finish()
    }
}

impl Enforcer {
    /// Build an enforcer and load the stored policy through `adapter`.
    pub fn new(adapter: Arc<dyn PolicyAdapter>, options: EnforcerOptions) -> Result<Self> {
        let rules = adapter.load_policy().map_err(AuthzError::Adapter)?;
        let count = rules.len();
        let state = PolicyState::from_rules(rules)?;

        info!(
            adapter = adapter.name(),
            rules = count,
            groupings = state.grouping.len(),
            permissions = state.permissions.len(),
            "Policy loaded"
        );

        Ok(Self {
            state: RwLock::new(state),
            resolver: HierarchyResolver::with_caching(options.cache_closures),
            adapter,
            options,
        })
    }

    /// An empty enforcer backed by a fresh [`MemoryAdapter`].
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(PolicyState::empty()),
            resolver: HierarchyResolver::new(),
            adapter: Arc::new(MemoryAdapter::new()),
            options: EnforcerOptions::default(),
        }
    }

    pub fn options(&self) -> EnforcerOptions {
        self.options
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `principal` may perform `action` on `resource`.
    ///
    /// Unknown identifiers are simply denied; blank ones fail with
    /// `InvalidArgument`.
    pub fn enforce(
        &self,
        principal: &Identifier,
        resource: &Identifier,
        action: &Action,
    ) -> Result<bool> {
        Ok(self.enforce_ex(principal, resource, action)?.is_allowed())
    }

    /// Like [`enforce`](Self::enforce), but an allow carries the matching grant.
    pub fn enforce_ex(
        &self,
        principal: &Identifier,
        resource: &Identifier,
        action: &Action,
    ) -> Result<Decision> {
        validate_request(principal, resource, action)?;

        let timer = DecisionMetrics::start();
        let decision = {
            let state = self.state.read();
            self.decide(&state, principal, resource, action)
        };
        let decision = match decision {
            Ok(decision) => decision,
            Err(e) => {
                e.log();
                return Err(e);
            }
        };
        let elapsed = timer.finish(decision.is_allowed());

        debug!(
            principal = %self.principal_label(principal),
            resource = %resource,
            action = %action,
            allowed = decision.is_allowed(),
            grant = decision.grant().map(|g| g.to_string()).unwrap_or_default(),
            elapsed_us = (elapsed * 1_000_000.0) as u64,
            "Enforcement decision"
        );
        Ok(decision)
    }

    /// Evaluate many requests against one consistent snapshot.
    pub fn batch_enforce(&self, requests: &[EnforceRequest]) -> Result<Vec<bool>> {
        for r in requests {
            validate_request(&r.principal, &r.resource, &r.action)?;
        }

        let state = self.state.read();
        let mut results = Vec::with_capacity(requests.len());
        for r in requests {
            let timer = DecisionMetrics::start();
            let allowed = self
                .decide(&state, &r.principal, &r.resource, &r.action)?
                .is_allowed();
            timer.finish(allowed);
            results.push(allowed);
        }

        debug!(requests = requests.len(), "Batch enforcement");
        Ok(results)
    }

    /// Search the principal set × resource set for a matching grant.
    ///
    /// The principal and its nearest groups are tried first, and within each
    /// the resource itself before its containers, so the reported grant is the
    /// most specific one.
    fn decide(
        &self,
        state: &PolicyState,
        principal: &Identifier,
        resource: &Identifier,
        action: &Action,
    ) -> Result<Decision> {
        let groups = self
            .resolver
            .ancestors_of(&state.grouping, Relation::Principal, principal.as_str())?;
        let containers = self
            .resolver
            .ancestors_of(&state.grouping, Relation::Resource, resource.as_str())?;

        for subject in std::iter::once(principal).chain(groups.iter()) {
            for node in std::iter::once(resource).chain(containers.iter()) {
                if state
                    .permissions
                    .matches(subject.as_str(), node.as_str(), action.as_str())
                {
                    return Ok(Decision::Allow {
                        grant: PermissionTuple::new(subject, node, action),
                    });
                }
            }
        }
        Ok(Decision::Deny)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Derived queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Every group `principal` belongs to, directly or transitively.
    pub fn groups_for(&self, principal: &Identifier) -> Result<Vec<Identifier>> {
        principal.ensure_present("principal")?;
        let state = self.state.read();
        let groups = self
            .resolver
            .ancestors_of(&state.grouping, Relation::Principal, principal.as_str())?;
        Ok(groups.to_vec())
    }

    /// Every grant held by `principal` or any of its groups.
    pub fn implicit_permissions_for(&self, principal: &Identifier) -> Result<Vec<PermissionTuple>> {
        principal.ensure_present("principal")?;
        let state = self.state.read();
        let groups = self
            .resolver
            .ancestors_of(&state.grouping, Relation::Principal, principal.as_str())?;

        let subjects: HashSet<&str> = std::iter::once(principal)
            .chain(groups.iter())
            .map(Identifier::as_str)
            .collect();
        Ok(state
            .permissions
            .list()
            .iter()
            .filter(|t| subjects.contains(t.subject.as_str()))
            .cloned()
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record `child → parent` in `relation`. `Ok(false)` if already present.
    pub fn add_grouping(
        &self,
        relation: Relation,
        child: impl Into<Identifier>,
        parent: impl Into<Identifier>,
    ) -> Result<bool> {
        self.apply(PolicyChange::AddGrouping(GroupingTuple::new(
            relation, child, parent,
        )))
    }

    /// Delete `child → parent`. `Ok(false)` if it was not present.
    pub fn remove_grouping(
        &self,
        relation: Relation,
        child: impl Into<Identifier>,
        parent: impl Into<Identifier>,
    ) -> Result<bool> {
        self.apply(PolicyChange::RemoveGrouping(GroupingTuple::new(
            relation, child, parent,
        )))
    }

    /// Put `principal` in `group`.
    pub fn add_membership(
        &self,
        principal: impl Into<Identifier>,
        group: impl Into<Identifier>,
    ) -> Result<bool> {
        self.add_grouping(Relation::Principal, principal, group)
    }

    /// Place resource `child` inside `parent`.
    pub fn add_containment(
        &self,
        child: impl Into<Identifier>,
        parent: impl Into<Identifier>,
    ) -> Result<bool> {
        self.add_grouping(Relation::Resource, child, parent)
    }

    pub fn add_permission(
        &self,
        subject: impl Into<Identifier>,
        resource: impl Into<Identifier>,
        action: impl Into<Action>,
    ) -> Result<bool> {
        self.apply(PolicyChange::AddPermission(PermissionTuple::new(
            subject, resource, action,
        )))
    }

    pub fn remove_permission(
        &self,
        subject: impl Into<Identifier>,
        resource: impl Into<Identifier>,
        action: impl Into<Action>,
    ) -> Result<bool> {
        self.apply(PolicyChange::RemovePermission(PermissionTuple::new(
            subject, resource, action,
        )))
    }

    fn apply(&self, change: PolicyChange) -> Result<bool> {
        let result = self.try_apply(&change);
        match &result {
            Ok(true) => MutationMetrics::record(change.kind(), "applied"),
            Ok(false) => MutationMetrics::record(change.kind(), "noop"),
            Err(AuthzError::Persistence(_)) => {
                MutationMetrics::record(change.kind(), "rolled_back");
            }
            Err(_) => MutationMetrics::record(change.kind(), "rejected"),
        }
        if let Err(e) = &result {
            e.log();
        }
        result
    }

    /// Apply, persist, and roll back on a gateway failure, all under the
    /// write lock.
    fn try_apply(&self, change: &PolicyChange) -> Result<bool> {
        change.validate()?;

        let mut state = self.state.write();
        let Some(undo) = state.apply(change)? else {
            debug!(change = %self.change_label(change), "Policy unchanged");
            return Ok(false);
        };

        let rules = state.rules();
        if let Err(source) = self.adapter.persist(change, &rules) {
            state.undo(undo);
            self.invalidate_for(change);
            warn!(
                adapter = self.adapter.name(),
                change = %self.change_label(change),
                error = %source,
                "Persistence failed, change rolled back"
            );
            return Err(AuthzError::Persistence(source));
        }

        state.revision.advance();
        self.invalidate_for(change);

        info!(
            change = %self.change_label(change),
            epoch = state.revision.epoch,
            "Policy updated"
        );
        Ok(true)
    }

    fn invalidate_for(&self, change: &PolicyChange) {
        if let PolicyChange::AddGrouping(t) | PolicyChange::RemoveGrouping(t) = change {
            self.resolver.invalidate(t.relation);
        }
    }

    /// Replace the in-memory policy with what the gateway currently holds.
    ///
    /// On failure the previous policy stays in effect.
    pub fn reload(&self) -> Result<()> {
        let fresh = self
            .adapter
            .load_policy()
            .map_err(AuthzError::Adapter)
            .and_then(PolicyState::from_rules);
        let mut fresh = match fresh {
            Ok(fresh) => fresh,
            Err(e) => {
                e.log();
                return Err(e);
            }
        };

        let mut state = self.state.write();
        fresh.revision = state.revision;
        fresh.revision.advance();
        *state = fresh;
        // Relation versions restart on a fresh index; stamps must not collide.
        self.resolver.clear();

        info!(
            adapter = self.adapter.name(),
            groupings = state.grouping.len(),
            permissions = state.permissions.len(),
            epoch = state.revision.epoch,
            "Policy reloaded"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listings
    // ─────────────────────────────────────────────────────────────────────────

    pub fn revision(&self) -> PolicyRevision {
        self.state.read().revision
    }

    pub fn list_groupings(&self, relation: Relation) -> Vec<GroupingTuple> {
        self.state.read().grouping.list(relation).to_vec()
    }

    pub fn list_groupings_for(&self, relation: Relation, child: &Identifier) -> Vec<GroupingTuple> {
        self.state
            .read()
            .grouping
            .list_for_child(relation, child.as_str())
    }

    pub fn list_permissions(&self) -> Vec<PermissionTuple> {
        self.state.read().permissions.list().to_vec()
    }

    pub fn list_permissions_for(&self, subject: &Identifier) -> Vec<PermissionTuple> {
        self.state
            .read()
            .permissions
            .list_for_subject(subject.as_str())
    }

    /// Distinct members of the principal relation, first-seen order.
    pub fn principals(&self) -> Vec<Identifier> {
        self.state
            .read()
            .grouping
            .relation(Relation::Principal)
            .subjects()
    }

    /// Every rule in persisted order.
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.state.read().rules()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Reconstruct the hierarchy of `relation`.
    pub fn hierarchy(&self, relation: Relation, reporter: &HierarchyReporter) -> Result<ResourceTree> {
        let state = self.state.read();
        reporter.build(relation, state.grouping.list(relation))
    }

    /// Decide `action` for every principal against every leaf resource.
    pub fn access_matrix(&self, action: &Action, leaf_rule: &LeafRule) -> Result<AccessMatrix> {
        action.ensure_present()?;
        let state = self.state.read();

        let principals = state.grouping.relation(Relation::Principal).subjects();
        let resources = leaf_resources(state.grouping.relation(Relation::Resource), leaf_rule);

        let mut allowed = Vec::with_capacity(principals.len());
        for principal in &principals {
            let mut row = Vec::with_capacity(resources.len());
            for resource in &resources {
                row.push(self.decide(&state, principal, resource, action)?.is_allowed());
            }
            allowed.push(row);
        }

        Ok(AccessMatrix {
            action: action.clone(),
            principals,
            resources,
            allowed,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Log labels
    // ─────────────────────────────────────────────────────────────────────────

    fn principal_label(&self, principal: &Identifier) -> String {
        if self.options.redact_principals {
            principal.fingerprint()
        } else {
            principal.to_string()
        }
    }

    /// Membership tuples name principals, so their child gets the same
    /// treatment as a decision's principal.
    fn change_label(&self, change: &PolicyChange) -> String {
        match change {
            PolicyChange::AddGrouping(t) | PolicyChange::RemoveGrouping(t)
                if t.relation == Relation::Principal && self.options.redact_principals =>
            {
                let sign = if matches!(change, PolicyChange::AddGrouping(_)) {
                    '+'
                } else {
                    '-'
                };
                format!("{} {}, {}, {}", sign, t.relation, self.principal_label(&t.child), t.parent)
            }
            _ => change.to_string(),
        }
    }
}

fn validate_request(principal: &Identifier, resource: &Identifier, action: &Action) -> Result<()> {
    principal.ensure_present("principal")?;
    resource.ensure_present("resource")?;
    action.ensure_present()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s)
    }

    fn call() -> Action {
        Action::call()
    }

    fn scenario() -> Enforcer {
        let enforcer = Enforcer::in_memory();
        enforcer.add_containment("tool111", "mcp11").unwrap();
        enforcer.add_containment("mcp11", "agent1").unwrap();
        enforcer.add_permission("qa-group", "mcp11", "call").unwrap();
        enforcer.add_membership("bob", "qa-group").unwrap();
        enforcer
    }

    #[test]
    fn test_inherited_grant_allows_descendant() {
        let enforcer = scenario();
        assert!(enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());
        assert!(enforcer.enforce(&id("bob"), &id("mcp11"), &call()).unwrap());
    }

    #[test]
    fn test_grant_never_flows_upward() {
        let enforcer = scenario();
        assert!(!enforcer.enforce(&id("bob"), &id("agent1"), &call()).unwrap());
    }

    #[test]
    fn test_unknown_identifiers_denied() {
        let enforcer = scenario();
        assert!(!enforcer.enforce(&id("mallory"), &id("tool111"), &call()).unwrap());
        assert!(!enforcer.enforce(&id("bob"), &id("tool999"), &call()).unwrap());
        assert!(!enforcer
            .enforce(&id("bob"), &id("tool111"), &Action::new("delete"))
            .unwrap());
    }

    #[test]
    fn test_blank_input_rejected() {
        let enforcer = scenario();
        assert!(matches!(
            enforcer.enforce(&id(""), &id("tool111"), &call()),
            Err(AuthzError::InvalidArgument(_))
        ));
        assert!(matches!(
            enforcer.enforce(&id("bob"), &id("tool111"), &Action::new(" ")),
            Err(AuthzError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_enforce_ex_reports_matching_grant() {
        let enforcer = scenario();
        let decision = enforcer.enforce_ex(&id("bob"), &id("tool111"), &call()).unwrap();
        assert_eq!(
            decision.grant(),
            Some(&PermissionTuple::new("qa-group", "mcp11", "call"))
        );

        let decision = enforcer.enforce_ex(&id("bob"), &id("agent1"), &call()).unwrap();
        assert!(decision.is_denied());
    }

    #[test]
    fn test_most_specific_grant_reported() {
        let enforcer = scenario();
        enforcer.add_permission("bob", "tool111", "call").unwrap();

        let decision = enforcer.enforce_ex(&id("bob"), &id("tool111"), &call()).unwrap();
        assert_eq!(
            decision.grant(),
            Some(&PermissionTuple::new("bob", "tool111", "call"))
        );
    }

    #[test]
    fn test_removal_reverses_grant() {
        let enforcer = scenario();
        assert!(enforcer.remove_grouping(Relation::Resource, "tool111", "mcp11").unwrap());
        assert!(!enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());

        assert!(enforcer.add_containment("tool111", "mcp11").unwrap());
        assert!(enforcer.remove_permission("qa-group", "mcp11", "call").unwrap());
        assert!(!enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());
    }

    #[test]
    fn test_mutations_are_idempotent() {
        let enforcer = scenario();
        let epoch = enforcer.revision().epoch;

        assert!(!enforcer.add_containment("tool111", "mcp11").unwrap());
        assert!(!enforcer.add_permission("qa-group", "mcp11", "call").unwrap());
        assert!(!enforcer.remove_permission("qa-group", "agent1", "call").unwrap());
        assert!(!enforcer.remove_grouping(Relation::Principal, "bob", "dev-group").unwrap());
        assert_eq!(enforcer.revision().epoch, epoch);
    }

    #[test]
    fn test_cycle_rejected_without_change() {
        let enforcer = scenario();
        let before = enforcer.rules();

        let result = enforcer.add_containment("agent1", "tool111");
        assert!(matches!(result, Err(AuthzError::Cycle { .. })));
        assert_eq!(enforcer.rules(), before);
    }

    #[test]
    fn test_persistence_failure_rolls_back() {
        let adapter = Arc::new(MemoryAdapter::new());
        let enforcer = Enforcer::new(adapter.clone(), EnforcerOptions::default()).unwrap();
        enforcer.add_permission("qa-group", "mcp11", "call").unwrap();
        enforcer.add_permission("dev-group", "agent1", "call").unwrap();
        let before = enforcer.rules();
        let stored = adapter.stored();

        adapter.fail_next_writes(1);
        let result = enforcer.remove_permission("qa-group", "mcp11", "call");
        assert!(matches!(result, Err(AuthzError::Persistence(_))));

        // Same content and same order, in memory and in storage.
        assert_eq!(enforcer.rules(), before);
        assert_eq!(adapter.stored(), stored);
    }

    #[test]
    fn test_rolled_back_grouping_is_not_served_from_cache() {
        let adapter = Arc::new(MemoryAdapter::new());
        let enforcer = Enforcer::new(adapter.clone(), EnforcerOptions::default()).unwrap();
        enforcer.add_permission("qa-group", "mcp11", "call").unwrap();
        enforcer.add_membership("bob", "qa-group").unwrap();
        assert!(!enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());

        adapter.fail_next_writes(1);
        assert!(enforcer.add_containment("tool111", "mcp11").is_err());
        assert!(!enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());
    }

    #[test]
    fn test_unknown_identifiers_leave_cache_empty() {
        let enforcer = scenario();
        for i in 0..1_000 {
            let key = id(&format!("sk-unknown-{}", i));
            let tool = id(&format!("tool-unknown-{}", i));
            assert!(!enforcer.enforce(&key, &tool, &call()).unwrap());
        }
        assert_eq!(enforcer.resolver.cached(Relation::Principal), 0);
        assert_eq!(enforcer.resolver.cached(Relation::Resource), 0);

        assert!(enforcer.enforce(&id("bob"), &id("tool111"), &call()).unwrap());
        assert_eq!(enforcer.resolver.cached(Relation::Principal), 1);
        assert_eq!(enforcer.resolver.cached(Relation::Resource), 1);
    }

    #[test]
    fn test_noop_mutation_not_persisted() {
        let adapter = Arc::new(MemoryAdapter::new());
        let enforcer = Enforcer::new(adapter.clone(), EnforcerOptions::default()).unwrap();
        enforcer.add_membership("bob", "qa-group").unwrap();
        enforcer.add_membership("bob", "qa-group").unwrap();
        enforcer.remove_grouping(Relation::Principal, "eve", "qa-group").unwrap();
        assert_eq!(adapter.writes(), 1);
    }

    #[test]
    fn test_load_rejects_cyclic_policy() {
        let adapter = Arc::new(MemoryAdapter::with_rules(vec![
            GroupingTuple::new(Relation::Resource, "a", "b").into(),
            GroupingTuple::new(Relation::Resource, "b", "a").into(),
        ]));
        let result = Enforcer::new(adapter, EnforcerOptions::default());
        assert!(matches!(result, Err(AuthzError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_reload_picks_up_external_changes() {
        let adapter = Arc::new(MemoryAdapter::new());
        let enforcer = Enforcer::new(adapter.clone(), EnforcerOptions::default()).unwrap();
        enforcer.add_membership("bob", "qa-group").unwrap();
        assert!(enforcer.groups_for(&id("bob")).unwrap().len() == 1);

        let other = Enforcer::new(adapter.clone(), EnforcerOptions::default()).unwrap();
        other.add_membership("qa-group", "staff").unwrap();

        let epoch = enforcer.revision().epoch;
        enforcer.reload().unwrap();
        assert_eq!(enforcer.groups_for(&id("bob")).unwrap().len(), 2);
        assert_eq!(enforcer.revision().epoch, epoch + 1);
    }

    #[test]
    fn test_implicit_permissions() {
        let enforcer = scenario();
        enforcer.add_membership("qa-group", "staff").unwrap();
        enforcer.add_permission("staff", "agent2", "call").unwrap();
        enforcer.add_permission("dev-group", "agent1", "call").unwrap();

        let grants = enforcer.implicit_permissions_for(&id("bob")).unwrap();
        assert_eq!(
            grants,
            vec![
                PermissionTuple::new("qa-group", "mcp11", "call"),
                PermissionTuple::new("staff", "agent2", "call"),
            ]
        );
    }

    #[test]
    fn test_batch_enforce() {
        let enforcer = scenario();
        let results = enforcer
            .batch_enforce(&[
                EnforceRequest::new("bob", "tool111", "call"),
                EnforceRequest::new("bob", "agent1", "call"),
                EnforceRequest::new("eve", "tool111", "call"),
            ])
            .unwrap();
        assert_eq!(results, vec![true, false, false]);
    }

    #[test]
    fn test_rules_order() {
        let enforcer = scenario();
        let lines: Vec<String> = enforcer.rules().iter().map(|r| r.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "p, qa-group, mcp11, call",
                "g, bob, qa-group",
                "g2, tool111, mcp11",
                "g2, mcp11, agent1",
            ]
        );
    }

    #[test]
    fn test_change_label_redacts_members() {
        let enforcer = Enforcer::in_memory();
        let change = PolicyChange::AddGrouping(GroupingTuple::new(
            Relation::Principal,
            "sk-live-123",
            "qa-group",
        ));
        let label = enforcer.change_label(&change);
        assert!(!label.contains("sk-live-123"));
        assert!(label.ends_with("qa-group"));

        let change = PolicyChange::AddGrouping(GroupingTuple::new(
            Relation::Resource,
            "tool111",
            "mcp11",
        ));
        assert_eq!(enforcer.change_label(&change), "+ g2, tool111, mcp11");
    }

    #[test]
    fn test_access_matrix() {
        let enforcer = scenario();
        enforcer.add_containment("tool112", "mcp11").unwrap();
        enforcer.add_containment("tool121", "mcp12").unwrap();
        enforcer.add_containment("mcp12", "agent1").unwrap();
        enforcer.add_membership("eve", "dev-group").unwrap();

        let matrix = enforcer
            .access_matrix(&call(), &LeafRule::Prefix("tool".into()))
            .unwrap();
        assert_eq!(matrix.principals, vec![id("bob"), id("eve")]);
        assert_eq!(matrix.resources, vec![id("tool111"), id("tool112"), id("tool121")]);
        assert_eq!(matrix.is_allowed("bob", "tool112"), Some(true));
        assert_eq!(matrix.is_allowed("bob", "tool121"), Some(false));
        assert_eq!(matrix.is_allowed("eve", "tool111"), Some(false));
    }
}
