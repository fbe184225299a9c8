//! Closure Builder
//!
//! For each flat record with path `p[0..n-1]`, every index pair `i <= j`
//! yields the candidate edge `(p[i], p[j], j - i)`; the record itself yields a
//! membership on `p[n-1]`. Candidates are deduplicated in memory (set union,
//! first occurrence wins) before anything is written.
//!
//! Intermediate entries with no records beneath them are fed in as bare paths
//! via [`ClosureBuilder::add_path`] so every persisted node gets its edges.
//!
//! Keys that do not resolve to a persisted id are reported and only the edges
//! that need them are skipped.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use taxa_storage::{ClosureEdge, ItemId, NodeId};

use crate::flatten::{FlatRecord, LeafRef, NodePath};

/// Candidate item ∈ node edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MembershipEdge {
    pub item_id: ItemId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedKind {
    /// Path segment with no persisted node
    Segment,
    /// Leaf record with no persisted item
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UnresolvedKey {
    pub kind: UnresolvedKind,
    pub key: String,
    /// Path of the record that referenced the key
    pub path: String,
}

impl fmt::Display for UnresolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            UnresolvedKind::Segment => "path segment",
            UnresolvedKind::Leaf => "leaf record",
        };
        write!(f, "unresolved {} {} (path {:?})", kind, self.key, self.path)
    }
}

/// Deduplicated edges ready to persist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosurePlan {
    pub edges: Vec<ClosureEdge>,
    pub memberships: Vec<MembershipEdge>,
    /// Each distinct unresolved key, once
    pub unresolved: Vec<UnresolvedKey>,
}

impl ClosurePlan {
    pub fn edge_set(&self) -> HashSet<ClosureEdge> {
        self.edges.iter().copied().collect()
    }
}

/// Accumulates a [`ClosurePlan`] from flat records
pub struct ClosureBuilder<'a> {
    node_ids: &'a HashMap<String, NodeId>,
    item_ids: &'a HashMap<LeafRef, ItemId>,
    seen_pairs: HashSet<(NodeId, NodeId)>,
    seen_memberships: HashSet<MembershipEdge>,
    seen_unresolved: HashSet<(UnresolvedKind, String)>,
    plan: ClosurePlan,
}

impl<'a> ClosureBuilder<'a> {
    pub fn new(
        node_ids: &'a HashMap<String, NodeId>,
        item_ids: &'a HashMap<LeafRef, ItemId>,
    ) -> Self {
        Self {
            node_ids,
            item_ids,
            seen_pairs: HashSet::new(),
            seen_memberships: HashSet::new(),
            seen_unresolved: HashSet::new(),
            plan: ClosurePlan::default(),
        }
    }

    /// Ancestor edges of one record plus its membership
    pub fn add(&mut self, record: &FlatRecord) {
        let path_str = record.path.to_string();
        let resolved = self.add_path(&record.path);

        let leaf = record.leaf_ref();
        let item_id = self.item_ids.get(&leaf).copied();
        if item_id.is_none() {
            self.report(UnresolvedKind::Leaf, &leaf.to_string(), &path_str);
        }
        let parent_id = resolved.last().copied().flatten();
        if let (Some(item_id), Some(node_id)) = (item_id, parent_id) {
            let edge = MembershipEdge { item_id, node_id };
            if self.seen_memberships.insert(edge) {
                self.plan.memberships.push(edge);
            }
        }
    }

    /// Every `i <= j` pair of a key path; returns the resolved segment ids
    pub fn add_path(&mut self, path: &NodePath) -> Vec<Option<NodeId>> {
        let path_str = path.to_string();
        let resolved: Vec<Option<NodeId>> = path
            .segments()
            .iter()
            .map(|key| {
                let id = self.node_ids.get(key).copied();
                if id.is_none() {
                    self.report(UnresolvedKind::Segment, key, &path_str);
                }
                id
            })
            .collect();

        for (i, ancestor) in resolved.iter().enumerate() {
            let Some(ancestor) = *ancestor else { continue };
            for (j, descendant) in resolved.iter().enumerate().skip(i) {
                let Some(descendant) = *descendant else { continue };
                if self.seen_pairs.insert((ancestor, descendant)) {
                    self.plan
                        .edges
                        .push(ClosureEdge::new(ancestor, descendant, (j - i) as u32));
                }
            }
        }
        resolved
    }

    fn report(&mut self, kind: UnresolvedKind, key: &str, path: &str) {
        if self.seen_unresolved.insert((kind, key.to_string())) {
            tracing::warn!("Unresolved {:?} key {} on path {}", kind, key, path);
            self.plan.unresolved.push(UnresolvedKey {
                kind,
                key: key.to_string(),
                path: path.to_string(),
            });
        }
    }

    pub fn finish(self) -> ClosurePlan {
        self.plan
    }
}

/// Build the plan for a whole flat list
pub fn build_closure(
    records: &[FlatRecord],
    node_ids: &HashMap<String, NodeId>,
    item_ids: &HashMap<LeafRef, ItemId>,
) -> ClosurePlan {
    let mut builder = ClosureBuilder::new(node_ids, item_ids);
    for record in records {
        builder.add(record);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, leaf: &str, ordinal: usize) -> FlatRecord {
        FlatRecord {
            path: NodePath::parse(path),
            key: leaf.to_string(),
            ordinal,
            name: leaf.to_string(),
            name_zh: String::new(),
            rank: "species".to_string(),
            record: Default::default(),
        }
    }

    fn ids(pairs: &[(&str, i64)]) -> HashMap<String, NodeId> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_all_ancestor_pairs_with_self_pairs() {
        let nodes = ids(&[("a", 1), ("b", 2), ("c", 3)]);
        let items = HashMap::from([(LeafRef::new("s", 0), 100)]);

        let plan = build_closure(&[record("a/b/c", "s", 0)], &nodes, &items);

        let expected: HashSet<_> = [
            ClosureEdge::new(1, 1, 0),
            ClosureEdge::new(1, 2, 1),
            ClosureEdge::new(1, 3, 2),
            ClosureEdge::new(2, 2, 0),
            ClosureEdge::new(2, 3, 1),
            ClosureEdge::new(3, 3, 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(plan.edge_set(), expected);
        assert_eq!(plan.edges.len(), 6);
        assert_eq!(
            plan.memberships,
            vec![MembershipEdge {
                item_id: 100,
                node_id: 3
            }]
        );
        assert!(plan.unresolved.is_empty());
    }

    #[test]
    fn test_shared_prefixes_deduplicated() {
        let nodes = ids(&[("a", 1), ("b", 2), ("c", 3)]);
        let items = HashMap::from([
            (LeafRef::new("s1", 0), 10),
            (LeafRef::new("s1", 1), 11),
            (LeafRef::new("s2", 0), 12),
        ]);
        let records = vec![
            record("a/b", "s1", 0),
            record("a/b", "s1", 1),
            record("a/c", "s2", 0),
        ];

        let plan = build_closure(&records, &nodes, &items);
        // a-a, a-b, b-b, a-c, c-c
        assert_eq!(plan.edges.len(), 5);
        assert_eq!(plan.memberships.len(), 3);
    }

    #[test]
    fn test_unresolved_segment_skips_only_its_edges() {
        let nodes = ids(&[("a", 1), ("c", 3)]);
        let items = HashMap::from([(LeafRef::new("s", 0), 100)]);

        let plan = build_closure(&[record("a/missing/c", "s", 0)], &nodes, &items);

        assert_eq!(
            plan.edge_set(),
            [
                ClosureEdge::new(1, 1, 0),
                ClosureEdge::new(1, 3, 2),
                ClosureEdge::new(3, 3, 0)
            ]
            .into_iter()
            .collect()
        );
        assert_eq!(plan.unresolved.len(), 1);
        assert_eq!(plan.unresolved[0].kind, UnresolvedKind::Segment);
        assert_eq!(plan.unresolved[0].key, "missing");
        assert_eq!(plan.memberships.len(), 1);
    }

    #[test]
    fn test_unresolved_leaf_reported_once() {
        let nodes = ids(&[("a", 1)]);
        let items = HashMap::new();

        let plan = build_closure(
            &[record("a", "s", 0), record("a", "s", 0)],
            &nodes,
            &items,
        );
        assert!(plan.memberships.is_empty());
        assert_eq!(plan.unresolved.len(), 1);
        assert_eq!(plan.unresolved[0].kind, UnresolvedKind::Leaf);
        assert_eq!(plan.edges, vec![ClosureEdge::new(1, 1, 0)]);
    }

    #[test]
    fn test_unresolved_parent_drops_membership() {
        let nodes = ids(&[("a", 1)]);
        let items = HashMap::from([(LeafRef::new("s", 0), 100)]);

        let plan = build_closure(&[record("a/gone", "s", 0)], &nodes, &items);
        assert!(plan.memberships.is_empty());
        assert_eq!(plan.unresolved[0].key, "gone");
    }

    #[test]
    fn test_bare_path_adds_edges_without_membership() {
        let nodes = ids(&[("a", 1), ("b", 2)]);
        let items = HashMap::new();
        let mut builder = ClosureBuilder::new(&nodes, &items);
        builder.add_path(&NodePath::parse("a/b"));
        builder.add_path(&NodePath::parse("a"));
        let plan = builder.finish();

        assert_eq!(
            plan.edges,
            vec![
                ClosureEdge::new(1, 1, 0),
                ClosureEdge::new(1, 2, 1),
                ClosureEdge::new(2, 2, 0)
            ]
        );
        assert!(plan.memberships.is_empty());
        assert!(plan.unresolved.is_empty());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let nodes = ids(&[("a", 1), ("b", 2)]);
        let items = HashMap::from([(LeafRef::new("s", 0), 100)]);
        let records = vec![record("a/b", "s", 0)];

        let first = build_closure(&records, &nodes, &items);
        let second = build_closure(&records, &nodes, &items);
        assert_eq!(first, second);
    }
}
