//! Hierarchy Flattener
//!
//! Pure transforms over a [`SourceTree`]:
//!
//! - [`to_array`]: mirrors the tree as arrays, each node annotated with the
//!   number of records beneath it
//! - [`to_flat_paths`]: one [`FlatRecord`] per leaf record, carrying the keys
//!   of its intermediate ancestors from root to immediate parent
//! - [`to_node_paths`]: the key path of every intermediate entry, so nodes
//!   with no records beneath them still join the closure
//! - [`hierarchy_stats`]: node counts per rank plus the record total

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::source::{NodeBody, RawRow, SourceNode, SourceTree};

/// Separator reserved from key syntax
pub const PATH_SEPARATOR: char = '/';

// ═══════════════════════════════════════════════════════════════════════════
// Array view
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayNode {
    pub name: String,
    pub name_zh: String,
    pub key: String,
    pub rank: String,
    /// Records at or below this node
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ArrayNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<RawRow>,
}

pub fn to_array(tree: &SourceTree) -> Vec<ArrayNode> {
    tree.roots.iter().map(array_node).collect()
}

fn array_node(node: &SourceNode) -> ArrayNode {
    let (children, records, count) = match &node.body {
        NodeBody::Children(children) => {
            let children: Vec<ArrayNode> = children.iter().map(array_node).collect();
            let count = children.iter().map(|c| c.count).sum();
            (children, Vec::new(), count)
        }
        NodeBody::Records(records) => (Vec::new(), records.clone(), records.len()),
    };
    ArrayNode {
        name: node.name.clone(),
        name_zh: node.name_zh.clone(),
        key: node.key.clone(),
        rank: node.rank.clone(),
        count,
        children,
        records,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Flat paths
// ═══════════════════════════════════════════════════════════════════════════

/// Ordered ancestor keys, root first; serialized as `"k1/k2/k3"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        Self(raw.split(PATH_SEPARATOR).map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Immediate parent of the records carried on this path
    pub fn parent(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.split(PATH_SEPARATOR).any(str::is_empty) && !raw.is_empty() {
            return Err(de::Error::custom(format!("empty segment in path {raw:?}")));
        }
        Ok(NodePath::parse(&raw))
    }
}

/// Identity of one leaf record: the leaf entry's key plus its record index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafRef {
    pub leaf_key: String,
    pub ordinal: usize,
}

impl LeafRef {
    pub fn new(leaf_key: impl Into<String>, ordinal: usize) -> Self {
        Self {
            leaf_key: leaf_key.into(),
            ordinal,
        }
    }
}

impl fmt::Display for LeafRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.leaf_key, self.ordinal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub path: NodePath,
    /// Key of the leaf entry holding the record
    pub key: String,
    /// Index of the record within its leaf entry
    pub ordinal: usize,
    pub name: String,
    pub name_zh: String,
    pub rank: String,
    pub record: RawRow,
}

impl FlatRecord {
    pub fn leaf_ref(&self) -> LeafRef {
        LeafRef::new(self.key.clone(), self.ordinal)
    }
}

/// Depth-first; siblings in source order
pub fn to_flat_paths(tree: &SourceTree) -> Vec<FlatRecord> {
    let mut out = Vec::with_capacity(tree.record_count());
    for root in &tree.roots {
        collect_flat(root, &NodePath::default(), &mut out);
    }
    out
}

fn collect_flat(node: &SourceNode, ancestors: &NodePath, out: &mut Vec<FlatRecord>) {
    match &node.body {
        NodeBody::Records(records) => {
            out.extend(records.iter().enumerate().map(|(ordinal, record)| FlatRecord {
                path: ancestors.clone(),
                key: node.key.clone(),
                ordinal,
                name: node.name.clone(),
                name_zh: node.name_zh.clone(),
                rank: node.rank.clone(),
                record: record.clone(),
            }));
        }
        NodeBody::Children(children) => {
            let path = ancestors.child(&node.key);
            for child in children {
                collect_flat(child, &path, out);
            }
        }
    }
}

/// Key path of every intermediate entry, ending in the entry itself
pub fn to_node_paths(tree: &SourceTree) -> Vec<NodePath> {
    let mut out = Vec::new();
    for root in &tree.roots {
        collect_node_paths(root, &NodePath::default(), &mut out);
    }
    out
}

fn collect_node_paths(node: &SourceNode, ancestors: &NodePath, out: &mut Vec<NodePath>) {
    if let NodeBody::Children(children) = &node.body {
        let path = ancestors.child(&node.key);
        for child in children {
            collect_node_paths(child, &path, out);
        }
        out.push(path);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HierarchyStats {
    /// Node count per rank label, in the order ranks are first seen
    pub per_rank: Vec<(String, usize)>,
    pub total_records: usize,
}

impl HierarchyStats {
    pub fn count_for(&self, rank: &str) -> usize {
        self.per_rank
            .iter()
            .find(|(r, _)| r == rank)
            .map_or(0, |(_, n)| *n)
    }

    fn bump(&mut self, rank: &str) {
        match self.per_rank.iter_mut().find(|(r, _)| r == rank) {
            Some((_, n)) => *n += 1,
            None => self.per_rank.push((rank.to_string(), 1)),
        }
    }
}

pub fn hierarchy_stats(tree: &SourceTree) -> HierarchyStats {
    let mut stats = HierarchyStats::default();
    let mut stack: Vec<&SourceNode> = tree.roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        stats.bump(&node.rank);
        match &node.body {
            NodeBody::Records(records) => stats.total_records += records.len(),
            NodeBody::Children(children) => stack.extend(children.iter().rev()),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(name: &str) -> RawRow {
        let mut row = RawRow::new();
        row.insert("species".to_string(), json!(name));
        row
    }

    fn leaf(key: &str, rank: &str, records: Vec<RawRow>) -> SourceNode {
        SourceNode {
            name: key.to_uppercase(),
            name_zh: String::new(),
            key: key.to_string(),
            rank: rank.to_string(),
            body: NodeBody::Records(records),
        }
    }

    fn branch(key: &str, rank: &str, children: Vec<SourceNode>) -> SourceNode {
        SourceNode {
            name: key.to_uppercase(),
            name_zh: String::new(),
            key: key.to_string(),
            rank: rank.to_string(),
            body: NodeBody::Children(children),
        }
    }

    fn sample() -> SourceTree {
        SourceTree::new(vec![branch(
            "f1",
            "family",
            vec![
                branch(
                    "g1",
                    "genus",
                    vec![leaf("s1", "species", vec![row("a"), row("b")])],
                ),
                branch("g2", "genus", vec![leaf("s2", "species", vec![row("c")])]),
            ],
        )])
    }

    #[test]
    fn test_to_array_counts() {
        let array = to_array(&sample());
        assert_eq!(array.len(), 1);
        assert_eq!(array[0].count, 3);
        assert_eq!(array[0].children[0].count, 2);
        assert_eq!(array[0].children[1].count, 1);
        assert_eq!(array[0].children[0].children[0].records.len(), 2);
    }

    #[test]
    fn test_flat_paths_one_per_record() {
        let flat = to_flat_paths(&sample());
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].path.to_string(), "f1/g1");
        assert_eq!(flat[0].key, "s1");
        assert_eq!(flat[0].ordinal, 0);
        assert_eq!(flat[1].ordinal, 1);
        assert_eq!(flat[2].path.to_string(), "f1/g2");
        assert_eq!(flat[2].path.parent(), Some("g2"));
    }

    #[test]
    fn test_empty_branches_emit_nothing() {
        let tree = SourceTree::new(vec![
            branch("f1", "family", vec![]),
            branch("f2", "family", vec![leaf("s", "genus", vec![])]),
        ]);
        assert!(to_flat_paths(&tree).is_empty());
        assert_eq!(to_array(&tree)[0].count, 0);
    }

    #[test]
    fn test_node_paths_cover_empty_branches() {
        let tree = SourceTree::new(vec![branch(
            "f1",
            "family",
            vec![branch("g1", "genus", vec![]), leaf("s", "genus", vec![])],
        )]);
        let paths: Vec<String> = to_node_paths(&tree).iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["f1/g1", "f1"]);
    }

    #[test]
    fn test_flat_record_serializes_joined_path() {
        let flat = to_flat_paths(&sample());
        let value = serde_json::to_value(&flat[0]).unwrap();
        assert_eq!(value["path"], json!("f1/g1"));
        assert_eq!(value["record"]["species"], json!("a"));

        let back: FlatRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.path.segments(), &["f1".to_string(), "g1".to_string()]);
    }

    #[test]
    fn test_path_rejects_empty_segment() {
        let err = serde_json::from_value::<NodePath>(json!("a//b"));
        assert!(err.is_err());
    }

    #[test]
    fn test_stats() {
        let stats = hierarchy_stats(&sample());
        assert_eq!(
            stats.per_rank,
            vec![
                ("family".to_string(), 1),
                ("genus".to_string(), 2),
                ("species".to_string(), 2)
            ]
        );
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.count_for("order"), 0);
    }
}
