//! Error types for taxa-hierarchy
//!
//! Record-local problems (unresolved keys, duplicate edges) never surface here;
//! the import pipeline absorbs them into its summary. Everything below aborts
//! the operation it came from.

use taxa_storage::{ItemId, NodeId, PartitionId, StorageError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Partition has no rank configuration
    #[error("No rank configuration for partition '{0}'")]
    ConfigurationMissing(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(PartitionId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Source structure does not fit the partition's rank scheme
    #[error("Malformed hierarchy: {0}")]
    MalformedHierarchy(String),

    /// Import target already holds data
    #[error(
        "Partition {partition_id} already contains {nodes} nodes and {items} items; \
         import into a fresh partition"
    )]
    PartitionNotEmpty {
        partition_id: PartitionId,
        nodes: usize,
        items: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        CatalogError::MalformedHierarchy(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_convert() {
        let err: CatalogError = StorageError::item_not_found(9).into();
        assert!(matches!(err, CatalogError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: [item_not_found] Item not found: 9");
    }

    #[test]
    fn test_messages_are_readable() {
        let err = CatalogError::PartitionNotEmpty {
            partition_id: 4,
            nodes: 0,
            items: 12,
        };
        assert_eq!(
            err.to_string(),
            "Partition 4 already contains 0 nodes and 12 items; import into a fresh partition"
        );
        assert_eq!(CatalogError::malformed("x").to_string(), "Malformed hierarchy: x");
    }
}
