//! taxa-hierarchy: hierarchy engine for taxonomic catalogs
//!
//! Offline, a nested rank-keyed source tree is validated against the
//! partition's rank scheme, persisted as nodes and items, and turned into a
//! closure relation. Online, subtrees and aggregate counts are answered with
//! closure joins, with a TTL cache in front of the two canonical listings.
//!
//! ```text
//! source JSON -> SourceTree -> flatten -> closure -> ImportPipeline -> CatalogStore
//!                                                                        |
//!                                 caller <- CachedCatalog <- HierarchyReader
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taxa_hierarchy::{CatalogConfig, HierarchyReader, ImportPipeline, SourceTree};
//! use taxa_storage::SqliteCatalogStore;
//!
//! let config = CatalogConfig::from_yaml("taxa.yaml")?;
//! let store = SqliteCatalogStore::new("catalog.db")?;
//! let tree = SourceTree::from_json_file("hierarchy.json")?;
//!
//! let summary = ImportPipeline::new(&store, &config).run(&tree, partition_id)?;
//! let trees = HierarchyReader::new(&store, &config).list_collections(partition_id, 2)?;
//! ```

pub mod cache;
pub mod closure;
pub mod config;
pub mod errors;
pub mod flatten;
pub mod import;
pub mod reader;
pub mod source;

pub use cache::{CacheError, CacheMetrics, CachedCatalog, MokaResultCache, ResultCache};
pub use closure::{build_closure, ClosureBuilder, ClosurePlan, MembershipEdge, UnresolvedKey};
pub use config::{CatalogConfig, ConfigError, PartitionConfig, RankScheme};
pub use errors::{CatalogError, Result};
pub use flatten::{
    hierarchy_stats, to_array, to_flat_paths, to_node_paths, ArrayNode, FlatRecord,
    HierarchyStats, LeafRef, NodePath,
};
pub use import::{ImportPipeline, ImportSummary};
pub use reader::{
    CollectionTree, HierarchyReader, ItemDetail, ItemListing, ItemSearch, ItemSummary, Page,
};
pub use source::{NodeBody, RawRow, SourceNode, SourceTree};
