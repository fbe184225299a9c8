//! Ordered rank labels of one partition
//!
//! Ranks are ordered root first (`kingdom < phylum < ... < species`). A source
//! tree fits a scheme when every entry's rank is configured, roots sit at the
//! root rank, every child sits strictly below its parent, and every key is
//! unique. Intermediate keys become node external keys and must be UUIDs.

use std::collections::HashSet;
use uuid::Uuid;

use super::error::{ConfigError, ConfigResult};
use crate::errors::{CatalogError, Result};
use crate::source::{NodeBody, SourceNode, SourceTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankScheme {
    partition: String,
    ranks: Vec<String>,
}

impl RankScheme {
    pub fn new(partition: impl Into<String>, ranks: Vec<String>) -> ConfigResult<Self> {
        let partition = partition.into();
        if ranks.is_empty() {
            return Err(ConfigError::partition(partition, "rank list is empty"));
        }
        let mut seen = HashSet::new();
        for rank in &ranks {
            if rank.trim().is_empty() {
                return Err(ConfigError::partition(partition, "blank rank label"));
            }
            if !seen.insert(rank.as_str()) {
                return Err(ConfigError::partition(
                    partition,
                    format!("rank '{rank}' listed twice"),
                ));
            }
        }
        Ok(Self { partition, ranks })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn ranks(&self) -> &[String] {
        &self.ranks
    }

    pub fn root_rank(&self) -> &str {
        &self.ranks[0]
    }

    pub fn index_of(&self, rank: &str) -> Option<usize> {
        self.ranks.iter().position(|r| r == rank)
    }

    /// Check a source tree against this scheme before anything is written
    pub fn validate(&self, tree: &SourceTree) -> Result<()> {
        let mut keys = HashSet::new();
        // (node, parent rank index)
        let mut stack: Vec<(&SourceNode, Option<usize>)> =
            tree.roots.iter().rev().map(|n| (n, None)).collect();

        while let Some((node, parent_index)) = stack.pop() {
            let index = self.index_of(&node.rank).ok_or_else(|| {
                CatalogError::malformed(format!(
                    "node {} has rank '{}', not configured for partition '{}'",
                    node.key, node.rank, self.partition
                ))
            })?;

            match parent_index {
                None if index != 0 => {
                    return Err(CatalogError::malformed(format!(
                        "top-level node {} has rank '{}', expected root rank '{}'",
                        node.key,
                        node.rank,
                        self.root_rank()
                    )));
                }
                Some(parent) if index <= parent => {
                    return Err(CatalogError::malformed(format!(
                        "node {} has rank '{}' which does not sit below its parent's rank '{}'",
                        node.key, node.rank, self.ranks[parent]
                    )));
                }
                _ => {}
            }

            if !keys.insert(node.key.as_str()) {
                return Err(CatalogError::malformed(format!(
                    "key {} appears more than once",
                    node.key
                )));
            }

            match &node.body {
                NodeBody::Records(_) if parent_index.is_none() => {
                    return Err(CatalogError::malformed(format!(
                        "top-level entry {} carries records; a root rank node is required",
                        node.key
                    )));
                }
                NodeBody::Records(_) => {}
                NodeBody::Children(children) => {
                    parse_node_key(node)?;
                    stack.extend(children.iter().rev().map(|c| (c, Some(index))));
                }
            }
        }
        Ok(())
    }
}

/// External key of an intermediate entry
pub fn parse_node_key(node: &SourceNode) -> Result<Uuid> {
    Uuid::parse_str(&node.key).map_err(|e| {
        CatalogError::malformed(format!("node key {:?} is not a UUID: {}", node.key, e))
    })
}
