//! Grouping index: principal→group membership and resource containment.
//!
//! Each relation is kept as a directed graph with edges pointing from child to
//! parent, plus the tuple list in insertion order for reproducible listings.
//! Insertions that would make a node its own ancestor are rejected up front,
//! so the graphs stay acyclic.

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::model::{GroupingTuple, Identifier, Relation};
use crate::error::{AuthzError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Relation Graph
// ═══════════════════════════════════════════════════════════════════════════════

/// The tuples of a single relation.
#[derive(Debug, Clone)]
pub struct RelationGraph {
    relation: Relation,

    /// Edges point child → parent.
    graph: StableDiGraph<Identifier, ()>,

    /// Map from identifier to graph node index for O(1) lookup
    node_index: HashMap<Identifier, NodeIndex>,

    /// Tuples in insertion order
    tuples: Vec<GroupingTuple>,

    /// Advanced by every effective mutation; closures stamped with an older
    /// version are stale.
    version: u64,
}

impl RelationGraph {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
            tuples: Vec::new(),
            version: 0,
        }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Whether the exact tuple is present.
    pub fn contains(&self, child: &str, parent: &str) -> bool {
        match (self.node_index.get(child), self.node_index.get(parent)) {
            (Some(&c), Some(&p)) => self.graph.find_edge(c, p).is_some(),
            _ => false,
        }
    }

    /// Whether `to` is an ancestor of `from` (or the same node).
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        match (self.node_index.get(from), self.node_index.get(to)) {
            (Some(&f), Some(&t)) => has_path_connecting(&self.graph, f, t, None),
            _ => false,
        }
    }

    /// Insert `child → parent`. Returns `Ok(false)` if the tuple already exists.
    pub fn add(&mut self, child: &Identifier, parent: &Identifier) -> Result<bool> {
        if self.contains(child.as_str(), parent.as_str()) {
            return Ok(false);
        }

        // The new edge closes a cycle iff the parent already reaches the child.
        if child == parent || self.reaches(parent.as_str(), child.as_str()) {
            return Err(AuthzError::Cycle {
                relation: self.relation,
                child: child.clone(),
                parent: parent.clone(),
            });
        }

        let c = self.ensure_node(child);
        let p = self.ensure_node(parent);
        self.graph.add_edge(c, p, ());
        self.tuples
            .push(GroupingTuple::new(self.relation, child.clone(), parent.clone()));
        self.version += 1;

        debug!(relation = %self.relation, child = %child, parent = %parent, "Grouping added");
        Ok(true)
    }

    /// Delete `child → parent`, returning the list position it occupied.
    pub fn remove(&mut self, child: &str, parent: &str) -> Option<usize> {
        let position = self
            .tuples
            .iter()
            .position(|t| t.child.as_str() == child && t.parent.as_str() == parent)?;
        self.tuples.remove(position);

        let endpoints = (self.index_of(child), self.index_of(parent));
        if let (Some(c), Some(p)) = endpoints {
            if let Some(edge) = self.graph.find_edge(c, p) {
                self.graph.remove_edge(edge);
            }
            self.prune(c);
            self.prune(p);
        }
        self.version += 1;

        debug!(relation = %self.relation, child = %child, parent = %parent, "Grouping removed");
        Some(position)
    }

    /// Put a removed tuple back at its former list position.
    pub(crate) fn restore(&mut self, position: usize, child: &Identifier, parent: &Identifier) {
        let c = self.ensure_node(child);
        let p = self.ensure_node(parent);
        self.graph.add_edge(c, p, ());
        let position = position.min(self.tuples.len());
        self.tuples.insert(
            position,
            GroupingTuple::new(self.relation, child.clone(), parent.clone()),
        );
        self.version += 1;
    }

    /// All tuples in insertion order.
    pub fn tuples(&self) -> &[GroupingTuple] {
        &self.tuples
    }

    /// Tuples whose child is `child`.
    pub fn tuples_for_child(&self, child: &str) -> Vec<GroupingTuple> {
        self.tuples
            .iter()
            .filter(|t| t.child.as_str() == child)
            .cloned()
            .collect()
    }

    /// Direct children of `parent`, in insertion order.
    pub fn children_of(&self, parent: &str) -> Vec<Identifier> {
        self.tuples
            .iter()
            .filter(|t| t.parent.as_str() == parent)
            .map(|t| t.child.clone())
            .collect()
    }

    /// Distinct children, first-seen order.
    pub fn subjects(&self) -> Vec<Identifier> {
        let mut seen = HashSet::new();
        self.tuples
            .iter()
            .filter(|t| seen.insert(t.child.as_str()))
            .map(|t| t.child.clone())
            .collect()
    }

    /// Every node mentioned by a tuple, first-seen order.
    pub fn nodes(&self) -> Vec<Identifier> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for t in &self.tuples {
            for id in [&t.child, &t.parent] {
                if seen.insert(id.as_str()) {
                    nodes.push(id.clone());
                }
            }
        }
        nodes
    }

    /// Whether nothing is recorded beneath `node`.
    pub fn is_childless(&self, node: &str) -> bool {
        match self.node_index.get(node) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .next()
                .is_none(),
            None => true,
        }
    }

    pub(crate) fn index_of(&self, node: &str) -> Option<NodeIndex> {
        self.node_index.get(node).copied()
    }

    pub(crate) fn label(&self, idx: NodeIndex) -> &Identifier {
        &self.graph[idx]
    }

    /// Direct parents of a node.
    pub(crate) fn parents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    fn ensure_node(&mut self, id: &Identifier) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(id.as_str()) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.node_index.insert(id.clone(), idx);
        idx
    }

    /// Drop a node once no edge references it.
    fn prune(&mut self, idx: NodeIndex) {
        if self.graph.neighbors_undirected(idx).next().is_none() {
            if let Some(label) = self.graph.remove_node(idx) {
                self.node_index.remove(label.as_str());
            }
        }
    }

    /// Insert an edge without the cycle check.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, child: &str, parent: &str) {
        let child = Identifier::new(child);
        let parent = Identifier::new(parent);
        let c = self.ensure_node(&child);
        let p = self.ensure_node(&parent);
        self.graph.add_edge(c, p, ());
        self.tuples.push(GroupingTuple::new(self.relation, child, parent));
        self.version += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grouping Index
// ═══════════════════════════════════════════════════════════════════════════════

/// Both grouping relations.
#[derive(Debug, Clone)]
pub struct GroupingIndex {
    principals: RelationGraph,
    resources: RelationGraph,
}

impl GroupingIndex {
    pub fn new() -> Self {
        Self {
            principals: RelationGraph::new(Relation::Principal),
            resources: RelationGraph::new(Relation::Resource),
        }
    }

    pub fn relation(&self, relation: Relation) -> &RelationGraph {
        match relation {
            Relation::Principal => &self.principals,
            Relation::Resource => &self.resources,
        }
    }

    pub(crate) fn relation_mut(&mut self, relation: Relation) -> &mut RelationGraph {
        match relation {
            Relation::Principal => &mut self.principals,
            Relation::Resource => &mut self.resources,
        }
    }

    /// Insert a tuple; idempotent. Fails with `Cycle` when the tuple would make
    /// `child` its own ancestor.
    pub fn add(
        &mut self,
        relation: Relation,
        child: impl Into<Identifier>,
        parent: impl Into<Identifier>,
    ) -> Result<bool> {
        let tuple = GroupingTuple::new(relation, child, parent);
        tuple.validate()?;
        self.relation_mut(relation).add(&tuple.child, &tuple.parent)
    }

    /// Delete a tuple; removing a missing tuple is a no-op.
    pub fn remove(&mut self, relation: Relation, child: &str, parent: &str) -> bool {
        self.relation_mut(relation).remove(child, parent).is_some()
    }

    pub fn list(&self, relation: Relation) -> &[GroupingTuple] {
        self.relation(relation).tuples()
    }

    pub fn list_for_child(&self, relation: Relation, child: &str) -> Vec<GroupingTuple> {
        self.relation(relation).tuples_for_child(child)
    }

    pub fn version(&self, relation: Relation) -> u64 {
        self.relation(relation).version()
    }

    pub fn len(&self) -> usize {
        self.principals.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GroupingIndex {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
