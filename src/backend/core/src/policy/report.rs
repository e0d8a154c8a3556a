//! Hierarchy reporting: tree views and access matrices for observability.
//!
//! Everything here is read-only over the grouping tuples.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::grouping::RelationGraph;
use super::model::{Action, GroupingTuple, Identifier, Relation};
use crate::config::HierarchyConfig;
use crate::error::{AuthzError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides which nodes are leaves (the finest-grained resources).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafRule {
    /// Nodes with nothing recorded beneath them.
    #[default]
    Childless,
    /// Nodes whose name starts with the prefix, e.g. `tool`.
    Prefix(String),
}

impl LeafRule {
    pub fn classify(&self, id: &Identifier, has_children: bool) -> NodeKind {
        let leaf = match self {
            Self::Childless => !has_children,
            Self::Prefix(prefix) => id.as_str().starts_with(prefix.as_str()),
        };
        if leaf {
            NodeKind::Leaf
        } else {
            NodeKind::Container
        }
    }
}

/// Selects which top-level nodes a report keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootFilter {
    #[default]
    Any,
    Prefix(String),
    Contains(String),
}

impl RootFilter {
    pub fn matches(&self, id: &Identifier) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => id.as_str().starts_with(prefix.as_str()),
            Self::Contains(needle) => id.as_str().contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container,
    Leaf,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tree
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: Identifier,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.id.as_str() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Identifier>) {
        if self.is_leaf() {
            out.push(&self.id);
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }

    fn to_json(&self) -> Value {
        if self.children.is_empty() {
            return match self.kind {
                NodeKind::Leaf => Value::Null,
                NodeKind::Container => Value::Array(Vec::new()),
            };
        }
        if self.children.iter().all(|c| c.is_leaf() && c.children.is_empty()) {
            return Value::Array(
                self.children
                    .iter()
                    .map(|c| Value::String(c.id.to_string()))
                    .collect(),
            );
        }
        let mut map = Map::new();
        for child in &self.children {
            map.insert(child.id.to_string(), child.to_json());
        }
        Value::Object(map)
    }
}

/// A reconstructed hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTree {
    pub relation: Relation,
    /// Top-level nodes accepted by the root filter, first-seen order.
    pub roots: Vec<TreeNode>,
    /// Top-level nodes the root filter rejected (containers with no recorded parent).
    pub detached: Vec<Identifier>,
}

impl ResourceTree {
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.roots.iter().find_map(|r| r.find(id))
    }

    /// Every leaf reachable from a kept root. A leaf under several parents is
    /// listed once per parent.
    pub fn leaves(&self) -> Vec<&Identifier> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_leaves(&mut out);
        }
        out
    }

    /// Nested map view: containers of leaves become arrays, everything else an
    /// object keyed by child name.
    ///
    /// `{"agent1": {"mcp11": ["tool111", "tool112"], "mcp12": []}}`
    pub fn to_nested_json(&self) -> Value {
        let mut map = Map::new();
        for root in &self.roots {
            map.insert(root.id.to_string(), root.to_json());
        }
        Value::Object(map)
    }
}

/// Builds [`ResourceTree`]s from grouping tuples.
#[derive(Debug, Clone, Default)]
pub struct HierarchyReporter {
    leaf_rule: LeafRule,
    root_filter: RootFilter,
}

impl HierarchyReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HierarchyConfig) -> Self {
        Self {
            leaf_rule: config.leaf_rule(),
            root_filter: config.root_filter(),
        }
    }

    pub fn with_leaf_rule(mut self, rule: LeafRule) -> Self {
        self.leaf_rule = rule;
        self
    }

    pub fn with_root_filter(mut self, filter: RootFilter) -> Self {
        self.root_filter = filter;
        self
    }

    pub fn leaf_rule(&self) -> &LeafRule {
        &self.leaf_rule
    }

    /// Build the tree in a single top-down pass over a child lists map.
    pub fn build(&self, relation: Relation, tuples: &[GroupingTuple]) -> Result<ResourceTree> {
        let mut children: HashMap<&str, Vec<&Identifier>> = HashMap::new();
        let mut has_parent: HashSet<&str> = HashSet::new();
        let mut parents: Vec<&Identifier> = Vec::new();

        for t in tuples {
            let entry = children.entry(t.parent.as_str()).or_default();
            if entry.is_empty() {
                parents.push(&t.parent);
            }
            entry.push(&t.child);
            has_parent.insert(t.child.as_str());
        }

        let mut tree = ResourceTree {
            relation,
            roots: Vec::new(),
            detached: Vec::new(),
        };
        let mut path = Vec::new();
        let mut seen = HashSet::new();

        for &root in parents.iter().filter(|p| !has_parent.contains(p.as_str())) {
            let grown = self.grow(relation, root, &children, &mut path, &mut seen)?;
            if self.root_filter.matches(root) {
                tree.roots.push(grown);
            } else {
                tree.detached.push(root.clone());
            }
        }

        // Anything left unvisited sits on a cycle with no root above it.
        if let Some(stranded) = parents.into_iter().find(|p| !seen.contains(p.as_str())) {
            return Err(AuthzError::CycleDetected {
                relation,
                node: stranded.clone(),
            });
        }
        Ok(tree)
    }

    fn grow<'a>(
        &self,
        relation: Relation,
        node: &'a Identifier,
        children: &HashMap<&'a str, Vec<&'a Identifier>>,
        path: &mut Vec<&'a str>,
        seen: &mut HashSet<&'a str>,
    ) -> Result<TreeNode> {
        if path.contains(&node.as_str()) {
            return Err(AuthzError::CycleDetected {
                relation,
                node: node.clone(),
            });
        }
        path.push(node.as_str());
        seen.insert(node.as_str());

        let kids: &[&Identifier] = children.get(node.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let mut grown = Vec::with_capacity(kids.len());
        for kid in kids {
            grown.push(self.grow(relation, kid, children, path, seen)?);
        }
        path.pop();

        Ok(TreeNode {
            id: node.clone(),
            kind: self.leaf_rule.classify(node, !kids.is_empty()),
            children: grown,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Matrix
// ═══════════════════════════════════════════════════════════════════════════════

/// Decisions for every principal against every leaf resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessMatrix {
    pub action: Action,
    pub principals: Vec<Identifier>,
    pub resources: Vec<Identifier>,
    /// `allowed[row][column]`, rows follow `principals`, columns `resources`.
    pub allowed: Vec<Vec<bool>>,
}

impl AccessMatrix {
    pub fn is_allowed(&self, principal: &str, resource: &str) -> Option<bool> {
        let row = self.principals.iter().position(|p| p.as_str() == principal)?;
        let col = self.resources.iter().position(|r| r.as_str() == resource)?;
        Some(self.allowed[row][col])
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Identifier, &[bool])> {
        self.principals
            .iter()
            .zip(self.allowed.iter().map(Vec::as_slice))
    }
}

/// Children of the relation classified as leaves, sorted by name.
pub fn leaf_resources(graph: &RelationGraph, rule: &LeafRule) -> Vec<Identifier> {
    let mut leaves: Vec<Identifier> = graph
        .subjects()
        .into_iter()
        .filter(|id| rule.classify(id, !graph.is_childless(id.as_str())) == NodeKind::Leaf)
        .collect();
    leaves.sort();
    leaves
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::grouping::GroupingIndex;
    use serde_json::json;

    fn g2(child: &str, parent: &str) -> GroupingTuple {
        GroupingTuple::new(Relation::Resource, child, parent)
    }

    fn tuples() -> Vec<GroupingTuple> {
        vec![
            g2("mcp11", "agent1"),
            g2("mcp12", "agent1"),
            g2("tool111", "mcp11"),
            g2("tool112", "mcp11"),
            g2("tool121", "mcp12"),
            g2("tool122", "mcp12"),
        ]
    }

    fn tool_reporter() -> HierarchyReporter {
        HierarchyReporter::new()
            .with_leaf_rule(LeafRule::Prefix("tool".into()))
            .with_root_filter(RootFilter::Contains("agent".into()))
    }

    #[test]
    fn test_build_tree_shape() {
        let tree = tool_reporter().build(Relation::Resource, &tuples()).unwrap();

        assert_eq!(tree.roots.len(), 1);
        let agent = &tree.roots[0];
        assert_eq!(agent.id.as_str(), "agent1");
        assert_eq!(agent.kind, NodeKind::Container);
        assert_eq!(agent.children.len(), 2);
        assert_eq!(agent.children[0].id.as_str(), "mcp11");
        assert!(agent.children[0].children.iter().all(TreeNode::is_leaf));
        assert!(tree.detached.is_empty());
    }

    #[test]
    fn test_nested_json_matches_listing_shape() {
        let mut tuples = tuples();
        tuples.push(g2("mcp21", "agent2"));

        let tree = tool_reporter().build(Relation::Resource, &tuples).unwrap();
        assert_eq!(
            tree.to_nested_json(),
            json!({
                "agent1": {
                    "mcp11": ["tool111", "tool112"],
                    "mcp12": ["tool121", "tool122"]
                },
                "agent2": { "mcp21": [] }
            })
        );
    }

    #[test]
    fn test_detached_roots_reported() {
        let mut tuples = tuples();
        tuples.push(g2("tool991", "mcp99"));

        let tree = tool_reporter().build(Relation::Resource, &tuples).unwrap();
        assert_eq!(tree.detached, vec![Identifier::new("mcp99")]);
        assert!(tree.find("tool991").is_none());
    }

    #[test]
    fn test_childless_rule() {
        let mut tuples = tuples();
        tuples.push(g2("mcp13", "agent1"));

        let tree = HierarchyReporter::new()
            .build(Relation::Resource, &tuples)
            .unwrap();
        assert!(tree.find("mcp13").unwrap().is_leaf());
        assert!(!tree.find("mcp12").unwrap().is_leaf());
        assert_eq!(tree.leaves().len(), 5);
    }

    #[test]
    fn test_shared_child_appears_under_each_parent() {
        let tuples = vec![
            g2("mcp11", "agent1"),
            g2("mcp11", "agent2"),
            g2("tool111", "mcp11"),
        ];
        let tree = HierarchyReporter::new()
            .build(Relation::Resource, &tuples)
            .unwrap();
        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.leaves().len(), 2);
    }

    #[test]
    fn test_empty_relation_builds_empty_tree() {
        let tree = tool_reporter().build(Relation::Resource, &[]).unwrap();
        assert!(tree.roots.is_empty());
        assert_eq!(tree.to_nested_json(), json!({}));
    }

    #[test]
    fn test_cycle_under_root_detected() {
        // root -> a -> b -> a, assembled without going through the index.
        let tuples = vec![g2("a", "root"), g2("b", "a"), g2("a", "b")];
        let result = HierarchyReporter::new().build(Relation::Resource, &tuples);
        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));
    }

    #[test]
    fn test_rootless_cycle_detected() {
        let tuples = vec![g2("a", "b"), g2("b", "a")];
        let result = HierarchyReporter::new().build(Relation::Resource, &tuples);
        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));

        // A well-formed tree next to the loop does not hide it.
        let tuples = vec![g2("tool1", "mcp1"), g2("x", "y"), g2("y", "x")];
        let result = HierarchyReporter::new().build(Relation::Resource, &tuples);
        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));
    }

    #[test]
    fn test_cycle_under_detached_root_detected() {
        let tuples = vec![g2("a", "orphan"), g2("b", "a"), g2("a", "b")];
        let reporter = HierarchyReporter::new()
            .with_root_filter(RootFilter::Contains("agent".to_string()));
        let result = reporter.build(Relation::Resource, &tuples);
        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));
    }

    #[test]
    fn test_leaf_resources_sorted() {
        let mut index = GroupingIndex::new();
        for t in tuples().into_iter().rev() {
            index.add(t.relation, t.child, t.parent).unwrap();
        }
        let leaves = leaf_resources(
            index.relation(Relation::Resource),
            &LeafRule::Prefix("tool".into()),
        );
        let names: Vec<&str> = leaves.iter().map(Identifier::as_str).collect();
        assert_eq!(names, vec!["tool111", "tool112", "tool121", "tool122"]);

        let childless = leaf_resources(index.relation(Relation::Resource), &LeafRule::Childless);
        assert_eq!(childless, leaves);
    }

    #[test]
    fn test_root_filters() {
        let id = Identifier::new("agent-billing");
        assert!(RootFilter::Any.matches(&id));
        assert!(RootFilter::Prefix("agent".into()).matches(&id));
        assert!(RootFilter::Contains("bill".into()).matches(&id));
        assert!(!RootFilter::Contains("mcp".into()).matches(&id));
    }
}
