//! Nested source structure produced by the tabular parser
//!
//! ```text
//! Node ::= { name, name_zh, key, rank, children: map<string, Node> }   // intermediate
//!        | { name, name_zh, key, rank, records: array<RawRow> }        // leaf
//! ```
//!
//! Child maps are read in document order; sibling order downstream follows it.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::errors::{CatalogError, Result};

/// Arbitrary key/value source row, kept verbatim
pub type RawRow = taxa_storage::Payload;

/// Payload key carrying the curation flag of a record
pub const ACCEPTED_FLAG_KEY: &str = "is_accepted";

/// Value used when a record has no curation flag
pub const ACCEPTED_FLAG_FALLBACK: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub name: String,
    pub name_zh: String,
    pub key: String,
    pub rank: String,
    pub body: NodeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    /// Intermediate rank: ordered children
    Children(Vec<SourceNode>),
    /// Last rank: the records themselves
    Records(Vec<RawRow>),
}

impl SourceNode {
    /// Number of records at or below this node
    pub fn record_count(&self) -> usize {
        match &self.body {
            NodeBody::Records(records) => records.len(),
            NodeBody::Children(children) => children.iter().map(SourceNode::record_count).sum(),
        }
    }
}

/// Top-level mapping of root entries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceTree {
    pub roots: Vec<SourceNode>,
}

impl SourceTree {
    pub fn new(roots: Vec<SourceNode>) -> Self {
        Self { roots }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| CatalogError::MalformedHierarchy(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.roots.iter().map(SourceNode::record_count).sum()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Deserialization
// ═══════════════════════════════════════════════════════════════════════════

/// Map of children read in document order; map keys are display labels only
struct OrderedChildren(Vec<SourceNode>);

impl<'de> Deserialize<'de> for OrderedChildren {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ChildrenVisitor;

        impl<'de> Visitor<'de> for ChildrenVisitor {
            type Value = OrderedChildren;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of hierarchy nodes")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((_label, node)) = map.next_entry::<String, SourceNode>()? {
                    nodes.push(node);
                }
                Ok(OrderedChildren(nodes))
            }
        }

        deserializer.deserialize_map(ChildrenVisitor)
    }
}

#[derive(Deserialize)]
struct RawSourceNode {
    name: String,
    #[serde(default)]
    name_zh: Option<String>,
    key: String,
    rank: String,
    children: Option<OrderedChildren>,
    records: Option<Vec<RawRow>>,
}

impl<'de> Deserialize<'de> for SourceNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawSourceNode::deserialize(deserializer)?;
        let body = match (raw.children, raw.records) {
            (Some(children), None) => NodeBody::Children(children.0),
            (None, Some(records)) => NodeBody::Records(records),
            (Some(_), Some(_)) => {
                return Err(de::Error::custom(format!(
                    "node {} has both children and records",
                    raw.key
                )))
            }
            (None, None) => {
                return Err(de::Error::custom(format!(
                    "node {} has neither children nor records",
                    raw.key
                )))
            }
        };
        Ok(SourceNode {
            name: raw.name,
            name_zh: raw.name_zh.unwrap_or_default(),
            key: raw.key,
            rank: raw.rank,
            body,
        })
    }
}

impl<'de> Deserialize<'de> for SourceTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let children = OrderedChildren::deserialize(deserializer)?;
        Ok(SourceTree { roots: children.0 })
    }
}
