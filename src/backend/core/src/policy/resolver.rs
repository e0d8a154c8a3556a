//! Hierarchy resolver: transitive ancestor sets over a grouping relation.
//!
//! Closures are memoized per node and stamped with the relation version they
//! were computed at. A stamp that no longer matches the relation's version is
//! treated as a miss, so no closure is ever served across a mutation.

use dashmap::DashMap;
use metrics::counter;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use std::sync::Arc;

use super::grouping::{GroupingIndex, RelationGraph};
use super::model::{Identifier, Relation};
use crate::error::{AuthzError, Result};

#[derive(Debug, Clone)]
struct CachedClosure {
    version: u64,
    ancestors: Arc<[Identifier]>,
}

/// Computes and caches ancestor closures for both relations.
#[derive(Debug)]
pub struct HierarchyResolver {
    principals: DashMap<Identifier, CachedClosure>,
    resources: DashMap<Identifier, CachedClosure>,
    caching: bool,
}

impl HierarchyResolver {
    pub fn new() -> Self {
        Self::with_caching(true)
    }

    pub fn with_caching(caching: bool) -> Self {
        Self {
            principals: DashMap::new(),
            resources: DashMap::new(),
            caching,
        }
    }

    /// Every node reachable from `node` along child → parent edges, excluding
    /// `node` itself, in discovery order. Unknown nodes have no ancestors and
    /// are never cached, so the cache is bounded by the relation's node count.
    pub fn ancestors_of(
        &self,
        index: &GroupingIndex,
        relation: Relation,
        node: &str,
    ) -> Result<Arc<[Identifier]>> {
        let graph = index.relation(relation);
        if graph.index_of(node).is_none() {
            return Ok(Arc::from(Vec::new()));
        }
        let version = graph.version();

        if self.caching {
            if let Some(entry) = self.cache(relation).get(node) {
                if entry.version == version {
                    counter!("warden_closure_cache_total", "result" => "hit").increment(1);
                    return Ok(Arc::clone(&entry.ancestors));
                }
            }
            counter!("warden_closure_cache_total", "result" => "miss").increment(1);
        }

        let ancestors: Arc<[Identifier]> = walk_ancestors(graph, node)?.into();

        if self.caching {
            self.cache(relation).insert(
                Identifier::new(node),
                CachedClosure {
                    version,
                    ancestors: Arc::clone(&ancestors),
                },
            );
        }
        Ok(ancestors)
    }

    /// Drop every cached closure of a relation.
    pub fn invalidate(&self, relation: Relation) {
        self.cache(relation).clear();
    }

    pub fn clear(&self) {
        for relation in Relation::all() {
            self.invalidate(relation);
        }
    }

    /// Number of cached closures for a relation.
    pub fn cached(&self, relation: Relation) -> usize {
        self.cache(relation).len()
    }

    fn cache(&self, relation: Relation) -> &DashMap<Identifier, CachedClosure> {
        match relation {
            Relation::Principal => &self.principals,
            Relation::Resource => &self.resources,
        }
    }
}

impl Default for HierarchyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnPath,
    Done,
}

/// Depth-first walk with path marking.
///
/// A node reached again after it was fully explored is a diamond and is
/// skipped; a node reached again while still on the current path is a cycle
/// and aborts the walk.
pub(crate) fn walk_ancestors(graph: &RelationGraph, node: &str) -> Result<Vec<Identifier>> {
    let Some(start) = graph.index_of(node) else {
        return Ok(Vec::new());
    };

    let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
    let mut ancestors = Vec::new();
    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, graph.parents_of(start))];
    marks.insert(start, Mark::OnPath);

    while let Some((current, pending)) = stack.last_mut() {
        let current = *current;
        match pending.pop() {
            Some(next) => match marks.get(&next) {
                Some(Mark::OnPath) => {
                    return Err(AuthzError::CycleDetected {
                        relation: graph.relation(),
                        node: graph.label(next).clone(),
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::OnPath);
                    ancestors.push(graph.label(next).clone());
                    stack.push((next, graph.parents_of(next)));
                }
            },
            None => {
                marks.insert(current, Mark::Done);
                stack.pop();
            }
        }
    }

    Ok(ancestors)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(ancestors: &[Identifier]) -> HashSet<&str> {
        ancestors.iter().map(|a| a.as_str()).collect()
    }

    fn resource_index() -> GroupingIndex {
        let mut index = GroupingIndex::new();
        index.add(Relation::Resource, "mcp11", "agent1").unwrap();
        index.add(Relation::Resource, "tool111", "mcp11").unwrap();
        index.add(Relation::Resource, "tool112", "mcp11").unwrap();
        index
    }

    #[test]
    fn test_chain_ancestors() {
        let index = resource_index();
        let resolver = HierarchyResolver::new();

        let ancestors = resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        assert_eq!(names(&ancestors), HashSet::from(["mcp11", "agent1"]));
    }

    #[test]
    fn test_root_and_unknown_have_no_ancestors() {
        let index = resource_index();
        let resolver = HierarchyResolver::new();

        assert!(resolver
            .ancestors_of(&index, Relation::Resource, "agent1")
            .unwrap()
            .is_empty());
        assert!(resolver
            .ancestors_of(&index, Relation::Resource, "nowhere")
            .unwrap()
            .is_empty());
        // Relations do not leak into each other.
        assert!(resolver
            .ancestors_of(&index, Relation::Principal, "tool111")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        //   root
        //   /  \
        //  a    b
        //   \  /
        //   leaf
        let mut index = GroupingIndex::new();
        index.add(Relation::Principal, "leaf", "a").unwrap();
        index.add(Relation::Principal, "leaf", "b").unwrap();
        index.add(Relation::Principal, "a", "root").unwrap();
        index.add(Relation::Principal, "b", "root").unwrap();

        let resolver = HierarchyResolver::new();
        let ancestors = resolver
            .ancestors_of(&index, Relation::Principal, "leaf")
            .unwrap();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(names(&ancestors), HashSet::from(["a", "b", "root"]));
    }

    #[test]
    fn test_cycle_in_stored_graph_detected() {
        let mut index = GroupingIndex::new();
        index.add(Relation::Principal, "a", "b").unwrap();
        index.add(Relation::Principal, "b", "c").unwrap();
        index
            .relation_mut(Relation::Principal)
            .insert_unchecked("c", "a");

        let resolver = HierarchyResolver::new();
        let result = resolver.ancestors_of(&index, Relation::Principal, "a");
        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));
    }

    #[test]
    fn test_cache_hit_reuses_closure() {
        let index = resource_index();
        let resolver = HierarchyResolver::new();

        let first = resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        let second = resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cached(Relation::Resource), 1);
    }

    #[test]
    fn test_version_bump_invalidates_closure() {
        let mut index = resource_index();
        let resolver = HierarchyResolver::new();

        let before = resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        assert_eq!(before.len(), 2);

        // Entry is still in the map; only the version stamp makes it stale.
        index.remove(Relation::Resource, "tool111", "mcp11");
        assert_eq!(resolver.cached(Relation::Resource), 1);

        let after = resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_unknown_nodes_are_not_cached() {
        let index = resource_index();
        let resolver = HierarchyResolver::new();

        for i in 0..100 {
            let ancestors = resolver
                .ancestors_of(&index, Relation::Resource, &format!("key-{}", i))
                .unwrap();
            assert!(ancestors.is_empty());
        }
        assert_eq!(resolver.cached(Relation::Resource), 0);

        resolver
            .ancestors_of(&index, Relation::Resource, "agent1")
            .unwrap();
        assert_eq!(resolver.cached(Relation::Resource), 1);
    }

    #[test]
    fn test_caching_disabled() {
        let index = resource_index();
        let resolver = HierarchyResolver::with_caching(false);

        resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();
        assert_eq!(resolver.cached(Relation::Resource), 0);
    }

    #[test]
    fn test_invalidate_clears_relation() {
        let index = resource_index();
        let resolver = HierarchyResolver::new();
        resolver
            .ancestors_of(&index, Relation::Resource, "tool111")
            .unwrap();

        resolver.invalidate(Relation::Resource);
        assert_eq!(resolver.cached(Relation::Resource), 0);
    }
}
