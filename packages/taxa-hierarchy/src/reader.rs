//! Hierarchy Reader
//!
//! Subtrees are expanded through depth-1 closure edges and every node's count
//! is one closure join (`count_items_under`), never a walk over descendants.
//! The partition's configured `count_filter` decides which memberships count.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use taxa_storage::{
    CatalogStore, FieldId, Item, ItemFilter, ItemId, ItemPage, ItemQuery, Node, NodeId,
    Partition, PartitionId,
};

use crate::config::{CatalogConfig, PartitionConfig, RankScheme, DEFAULT_PAGE_SIZE};
use crate::errors::{CatalogError, Result};

/// Payload key holding alternative localized names
pub const NAME_ZH_OTHER_KEY: &str = "Chinese_name_other";
/// Payload key holding the record status
pub const STATUS_ID_KEY: &str = "status_id";
pub const DEFAULT_STATUS_ID: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTree {
    pub id: NodeId,
    pub name: String,
    pub name_zh: Option<String>,
    pub rank: String,
    /// Items at or below this node, after the partition's filter
    pub count: u64,
    pub children: Vec<CollectionTree>,
}

impl CollectionTree {
    /// Depth of the deepest expanded level below this node
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Optional item filters; both absent is the canonical "whole list" shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSearch {
    pub q: Option<String>,
    pub node_id: Option<NodeId>,
}

impl ItemSearch {
    pub fn text(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            node_id: None,
        }
    }

    pub fn under(node_id: NodeId) -> Self {
        Self {
            q: None,
            node_id: Some(node_id),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.q.as_deref().map_or(true, str::is_empty) && self.node_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub name_zh: Option<String>,
    pub name_zh_other: String,
    pub status_id: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            name_zh: item.name_zh.clone(),
            name_zh_other: item.payload_str(NAME_ZH_OTHER_KEY).unwrap_or_default(),
            status_id: item
                .payload_str(STATUS_ID_KEY)
                .unwrap_or_else(|| DEFAULT_STATUS_ID.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListing {
    pub items: Vec<ItemSummary>,
    pub total: usize,
}

impl From<&ItemPage> for ItemListing {
    fn from(page: &ItemPage) -> Self {
        Self {
            items: page.items.iter().map(ItemSummary::from).collect(),
            total: page.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    pub item: Item,
    /// Field values after payload overrides
    pub fields: BTreeMap<FieldId, String>,
}

/// Partition row plus its configuration
struct PartitionContext<'c> {
    partition: Partition,
    settings: &'c PartitionConfig,
    scheme: &'c RankScheme,
}

pub struct HierarchyReader<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    config: &'a CatalogConfig,
}

impl<'a, S: CatalogStore + ?Sized> HierarchyReader<'a, S> {
    pub fn new(store: &'a S, config: &'a CatalogConfig) -> Self {
        Self { store, config }
    }

    fn context(&self, partition_id: PartitionId) -> Result<PartitionContext<'a>> {
        let partition = self
            .store
            .get_partition(partition_id)?
            .ok_or(CatalogError::PartitionNotFound(partition_id))?;
        let settings = self.config.partition(&partition.name)?;
        let scheme = self.config.rank_scheme(&partition.name)?;
        Ok(PartitionContext {
            partition,
            settings,
            scheme,
        })
    }

    fn node(&self, node_id: NodeId) -> Result<Node> {
        self.store
            .get_node(node_id)?
            .ok_or(CatalogError::NodeNotFound(node_id))
    }

    /// Root-rank nodes of a partition, ordered by name
    pub fn list_top_level_nodes(&self, partition_id: PartitionId) -> Result<Vec<Node>> {
        let ctx = self.context(partition_id)?;
        Ok(self
            .store
            .nodes_at_rank(ctx.partition.id, ctx.scheme.root_rank())?)
    }

    /// Node plus at most `max_depth` levels of children, each with its count
    pub fn subtree(&self, node_id: NodeId, max_depth: usize) -> Result<CollectionTree> {
        let node = self.node(node_id)?;
        let ctx = self.context(node.partition_id)?;
        self.expand(node, max_depth, &ctx.settings.count_filter)
    }

    fn expand(&self, node: Node, remaining: usize, filter: &ItemFilter) -> Result<CollectionTree> {
        let count = self.store.count_items_under(node.id, filter)?;
        let children = if remaining == 0 {
            Vec::new()
        } else {
            self.store
                .child_nodes(node.id)?
                .into_iter()
                .map(|child| self.expand(child, remaining - 1, filter))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(CollectionTree {
            id: node.id,
            name: node.name,
            name_zh: node.name_zh,
            rank: node.rank,
            count,
            children,
        })
    }

    /// Items whose membership resolves anywhere under `node_id`, inclusive
    pub fn aggregate_item_count(&self, node_id: NodeId) -> Result<u64> {
        let node = self.node(node_id)?;
        let ctx = self.context(node.partition_id)?;
        Ok(self
            .store
            .count_items_under(node.id, &ctx.settings.count_filter)?)
    }

    /// Every top-level node expanded to `depth`
    pub fn list_collections(
        &self,
        partition_id: PartitionId,
        depth: usize,
    ) -> Result<Vec<CollectionTree>> {
        let ctx = self.context(partition_id)?;
        let roots = self
            .store
            .nodes_at_rank(ctx.partition.id, ctx.scheme.root_rank())?;
        tracing::debug!(
            "Expanding {} top-level nodes of partition {} to depth {}",
            roots.len(),
            partition_id,
            depth
        );
        roots
            .into_iter()
            .map(|root| self.expand(root, depth, &ctx.settings.count_filter))
            .collect()
    }

    /// Page of matching items plus the unpaginated match count
    pub fn search(
        &self,
        partition_id: PartitionId,
        search: &ItemSearch,
        page: Page,
    ) -> Result<ItemPage> {
        let ctx = self.context(partition_id)?;

        if let Some(node_id) = search.node_id {
            match self.store.get_node(node_id)? {
                Some(node) if node.partition_id == partition_id => {}
                _ => return Ok(ItemPage::empty()),
            }
        }

        let query = ItemQuery {
            partition_id,
            filter: ctx.settings.count_filter.clone(),
            name_contains: search.q.clone().filter(|q| !q.is_empty()),
            within_node: search.node_id,
            limit: page.limit,
            offset: page.offset,
        };
        Ok(self.store.search_items(&query)?)
    }

    pub fn list_items(
        &self,
        partition_id: PartitionId,
        search: &ItemSearch,
        page: Page,
    ) -> Result<ItemListing> {
        let page = self.search(partition_id, search, page)?;
        Ok(ItemListing::from(&page))
    }

    /// Item with its field values; mapped payload keys override stored values
    pub fn item_detail(&self, item_id: ItemId) -> Result<ItemDetail> {
        let item = self
            .store
            .get_item(item_id)?
            .ok_or(CatalogError::ItemNotFound(item_id))?;

        let mut fields: BTreeMap<FieldId, String> = self
            .store
            .field_values(item.id)?
            .into_iter()
            .map(|fv| (fv.field_id, fv.value))
            .collect();

        let partition = self.store.get_partition(item.partition_id)?;
        let overrides = partition
            .as_ref()
            .and_then(|p| self.config.partition(&p.name).ok())
            .map(|settings| &settings.field_overrides);
        if let Some(overrides) = overrides {
            for (payload_key, field_id) in overrides {
                if let Some(value) = item.payload_str(payload_key) {
                    fields.insert(*field_id, value);
                }
            }
        }

        Ok(ItemDetail { item, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taxa_storage::{ClosureEdge, NewItem, NewNode, NewPartition, SqliteCatalogStore, SyncStamp};

    fn seeded() -> (SqliteCatalogStore, CatalogConfig, Partition, Item) {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let partition = store.create_partition(&NewPartition::named("plants")).unwrap();
        let config = CatalogConfig::default()
            .with_partition(
                "plants",
                PartitionConfig::with_ranks(["family", "genus"]).field_override("status", 7),
            )
            .unwrap();

        let mut payload = taxa_storage::Payload::new();
        payload.insert("status".into(), json!("2"));
        payload.insert(NAME_ZH_OTHER_KEY.into(), json!("山櫻"));
        let item = store
            .insert_item(&NewItem {
                name: "Prunus campanulata".into(),
                name_zh: Some("山櫻花".into()),
                partition_id: partition.id,
                item_type_id: 1,
                payload,
                sync: SyncStamp::new(),
            })
            .unwrap();
        (store, config, partition, item)
    }

    #[test]
    fn test_item_summary_defaults() {
        let (_, _, _, item) = seeded();
        let summary = ItemSummary::from(&item);
        assert_eq!(summary.name_zh_other, "山櫻");
        assert_eq!(summary.status_id, DEFAULT_STATUS_ID);
    }

    #[test]
    fn test_item_detail_applies_overrides() {
        let (store, config, _, item) = seeded();
        store
            .insert_field_value(&taxa_storage::ItemFieldValue::new(item.id, 7, "1"))
            .unwrap();
        store
            .insert_field_value(&taxa_storage::ItemFieldValue::new(item.id, 8, "x"))
            .unwrap();

        let detail = HierarchyReader::new(&store, &config)
            .item_detail(item.id)
            .unwrap();
        assert_eq!(detail.fields.get(&7).map(String::as_str), Some("2"));
        assert_eq!(detail.fields.get(&8).map(String::as_str), Some("x"));
    }

    #[test]
    fn test_missing_targets_are_not_found() {
        let (store, config, partition, _) = seeded();
        let reader = HierarchyReader::new(&store, &config);

        assert!(matches!(reader.subtree(999, 1), Err(CatalogError::NodeNotFound(999))));
        assert!(matches!(
            reader.aggregate_item_count(999),
            Err(CatalogError::NodeNotFound(999))
        ));
        assert!(matches!(reader.item_detail(999), Err(CatalogError::ItemNotFound(999))));
        assert!(matches!(
            reader.list_collections(999, 1),
            Err(CatalogError::PartitionNotFound(999))
        ));

        let page = reader
            .search(partition.id, &ItemSearch::under(999), Page::default())
            .unwrap();
        assert_eq!(page, ItemPage::empty());
    }

    #[test]
    fn test_unconfigured_partition_fails_fast() {
        let (store, config, _, _) = seeded();
        let other = store.create_partition(&NewPartition::named("lichens")).unwrap();
        let node = store
            .insert_node(&NewNode {
                name: "Parmeliaceae".into(),
                name_zh: None,
                partition_id: other.id,
                rank: "family".into(),
                sync: SyncStamp::new(),
            })
            .unwrap();
        store
            .insert_closure_edges(&[ClosureEdge::new(node.id, node.id, 0)])
            .unwrap();

        let reader = HierarchyReader::new(&store, &config);
        assert!(matches!(
            reader.subtree(node.id, 2),
            Err(CatalogError::ConfigurationMissing(name)) if name == "lichens"
        ));
        assert!(matches!(
            reader.list_collections(other.id, 2),
            Err(CatalogError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_empty_partition_lists_nothing() {
        let (store, config, partition, _) = seeded();
        let reader = HierarchyReader::new(&store, &config);
        assert!(reader.list_collections(partition.id, 3).unwrap().is_empty());
        assert!(reader.list_top_level_nodes(partition.id).unwrap().is_empty());
    }

    #[test]
    fn test_search_unfiltered_shape() {
        assert!(ItemSearch::default().is_unfiltered());
        assert!(ItemSearch {
            q: Some(String::new()),
            node_id: None
        }
        .is_unfiltered());
        assert!(!ItemSearch::text("rock").is_unfiltered());
        assert!(!ItemSearch::under(3).is_unfiltered());
    }
}
