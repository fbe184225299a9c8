//! Catalog Store Port (Trait Interface)
//!
//! The store handle is passed explicitly into every component call; its
//! lifetime is scoped to one request or one import run.

use super::models::{
    CatalogStats, ClosureEdge, EdgeWriteOutcome, Item, ItemFieldValue, ItemFilter, ItemId,
    ItemPage, ItemQuery, Membership, NewItem, NewMembership, NewNode, NewPartition, Node, NodeId,
    Partition, PartitionId, Payload,
};
use crate::Result;

/// Catalog Store Port (Primary Interface)
///
/// Calls block the calling worker; concurrency comes from running several
/// workers against one store.
pub trait CatalogStore: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Partitions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn create_partition(&self, partition: &NewPartition) -> Result<Partition>;

    fn get_partition(&self, partition_id: PartitionId) -> Result<Option<Partition>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Node / Item creation (commits per row)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn insert_node(&self, node: &NewNode) -> Result<Node>;

    fn insert_item(&self, item: &NewItem) -> Result<Item>;

    fn insert_field_value(&self, value: &ItemFieldValue) -> Result<()>;

    /// Replace an item's payload, bumping its version and `updated_at`
    fn update_item_payload(&self, item_id: ItemId, payload: &Payload) -> Result<Item>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Edges (insert if absent)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert closure edges; an existing `(ancestor, descendant)` pair keeps
    /// its stored depth and is counted as already present
    fn insert_closure_edges(&self, edges: &[ClosureEdge]) -> Result<EdgeWriteOutcome>;

    /// Insert memberships; an existing `(item, node)` pair is counted as
    /// already present
    fn insert_memberships(&self, memberships: &[NewMembership]) -> Result<EdgeWriteOutcome>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Reads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn get_node(&self, node_id: NodeId) -> Result<Option<Node>>;

    fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Nodes of one rank in a partition, ordered by name
    fn nodes_at_rank(&self, partition_id: PartitionId, rank: &str) -> Result<Vec<Node>>;

    /// Direct children (closure depth 1), ordered by name
    fn child_nodes(&self, node_id: NodeId) -> Result<Vec<Node>>;

    /// Items whose membership resolves through any descendant of `node_id`
    /// (depth >= 0), counted with one closure join
    fn count_items_under(&self, node_id: NodeId, filter: &ItemFilter) -> Result<u64>;

    fn search_items(&self, query: &ItemQuery) -> Result<ItemPage>;

    fn field_values(&self, item_id: ItemId) -> Result<Vec<ItemFieldValue>>;

    fn memberships_of(&self, item_id: ItemId) -> Result<Vec<Membership>>;

    /// Every closure edge among a partition's nodes
    fn closure_edges(&self, partition_id: PartitionId) -> Result<Vec<ClosureEdge>>;

    fn stats(&self, partition_id: PartitionId) -> Result<CatalogStats>;
}
