//! taxa-storage: durable store for hierarchical taxonomic catalogs
//!
//! Five relations back the hierarchy engine:
//!
//! 1. **Node**: a collection at some rank, owned by one partition
//! 2. **Item**: a leaf record with its source payload preserved verbatim
//! 3. **Membership**: item ∈ node (one direct membership per imported item)
//! 4. **ClosureEdge**: `(ancestor_id, descendant_id, depth)`, unique per pair
//! 5. **ItemFieldValue**: `(item_id, field_id, value)`
//!
//! Subtree and count queries join through the closure relation instead of
//! walking the tree row by row.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taxa_storage::{CatalogStore, NewPartition, SqliteCatalogStore};
//!
//! let store = SqliteCatalogStore::new("catalog.db")?;
//! let partition = store.create_partition(&NewPartition::named("species"))?;
//! let stats = store.stats(partition.id)?;
//! ```

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    CatalogStats, CatalogStore, ClosureEdge, EdgeWriteOutcome, FieldId, Item, ItemFieldValue,
    ItemFilter, ItemId, ItemPage, ItemQuery, ItemTypeId, Membership, MembershipId, NewItem,
    NewMembership, NewNode, NewPartition, Node, NodeId, Partition, PartitionId, Payload,
    SyncStamp, Timestamps,
};
pub use domain::models::payload_value_as_string;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteCatalogStore;
