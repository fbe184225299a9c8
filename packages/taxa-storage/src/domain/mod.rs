//! Domain layer for the catalog store
//!
//! # Domain Models
//!
//! - `Partition`: tenant ("library") owning its nodes, items and ranks
//! - `Node`: taxonomic collection tagged with a rank label
//! - `Item`: leaf record with a verbatim source payload
//! - `Membership`: item ∈ node
//! - `ClosureEdge`: ancestor/descendant pair with depth (self-pair at 0)
//! - `ItemFieldValue`: descriptive field used for classification
//!
//! # Port Trait
//!
//! - `CatalogStore`: primary storage abstraction
//!
//! # Examples
//!
//! ```rust,ignore
//! use taxa_storage::domain::{CatalogStore, ItemFilter};
//!
//! fn example(store: &impl CatalogStore, node_id: i64) -> taxa_storage::Result<()> {
//!     let children = store.child_nodes(node_id)?;
//!     let total = store.count_items_under(node_id, &ItemFilter::All)?;
//!     println!("{} children, {} items", children.len(), total);
//!     Ok(())
//! }
//! ```

pub mod models;
pub mod ports;

pub use models::*;
pub use ports::CatalogStore;
