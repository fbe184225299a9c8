//! Import Pipeline
//!
//! One pass over a validated [`SourceTree`]:
//!
//! 1. every intermediate entry becomes a Node (its source key is the node's
//!    external key), every leaf record becomes an Item plus one accepted-flag
//!    field value; key -> id maps are recorded as rows are created
//! 2. the flattener and closure builder derive closure and membership edges
//!    from those maps
//! 3. edges are written insert-if-absent; duplicates are counted, not fatal
//!
//! Node/item rows commit one at a time. A run that fails half way leaves the
//! rows it already wrote; the partition must be inspected before retrying.

use serde::Serialize;
use std::collections::HashMap;

use taxa_storage::{
    payload_value_as_string, CatalogStore, ItemFieldValue, ItemId, NewItem, NewMembership,
    NewNode, NodeId, PartitionId, SyncStamp,
};

use crate::closure::{ClosureBuilder, UnresolvedKey};
use crate::config::{parse_node_key, CatalogConfig, PartitionConfig};
use crate::errors::{CatalogError, Result};
use crate::flatten::{to_flat_paths, to_node_paths, LeafRef};
use crate::source::{NodeBody, SourceNode, SourceTree, ACCEPTED_FLAG_FALLBACK, ACCEPTED_FLAG_KEY};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub nodes_created: usize,
    pub items_created: usize,
    pub field_values_created: usize,
    pub closure_edges_inserted: usize,
    pub closure_edges_already_present: usize,
    pub memberships_inserted: usize,
    pub memberships_already_present: usize,
    pub unresolved: Vec<UnresolvedKey>,
}

impl ImportSummary {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Rows created by the persist pass
#[derive(Debug, Default)]
struct CreatedRows {
    node_ids: HashMap<String, NodeId>,
    item_ids: HashMap<LeafRef, ItemId>,
    field_values: usize,
}

pub struct ImportPipeline<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    config: &'a CatalogConfig,
}

impl<'a, S: CatalogStore + ?Sized> ImportPipeline<'a, S> {
    pub fn new(store: &'a S, config: &'a CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Import `tree` into an existing, empty partition
    pub fn run(&self, tree: &SourceTree, partition_id: PartitionId) -> Result<ImportSummary> {
        let partition = self
            .store
            .get_partition(partition_id)?
            .ok_or(CatalogError::PartitionNotFound(partition_id))?;
        let settings = self.config.partition(&partition.name)?;
        self.config.rank_scheme(&partition.name)?.validate(tree)?;

        let existing = self.store.stats(partition_id)?;
        if existing.nodes > 0 || existing.items > 0 {
            return Err(CatalogError::PartitionNotEmpty {
                partition_id,
                nodes: existing.nodes,
                items: existing.items,
            });
        }

        tracing::info!(
            "Importing {} records into partition {} ({})",
            tree.record_count(),
            partition_id,
            partition.name
        );

        let rows = self.persist_rows(tree, partition_id, settings)?;
        tracing::info!(
            "Created {} nodes, {} items",
            rows.node_ids.len(),
            rows.item_ids.len()
        );

        let mut builder = ClosureBuilder::new(&rows.node_ids, &rows.item_ids);
        for path in to_node_paths(tree) {
            builder.add_path(&path);
        }
        for record in &to_flat_paths(tree) {
            builder.add(record);
        }
        let plan = builder.finish();

        let closure = self.store.insert_closure_edges(&plan.edges)?;
        let memberships: Vec<NewMembership> = plan
            .memberships
            .iter()
            .map(|edge| NewMembership {
                item_id: edge.item_id,
                node_id: edge.node_id,
                partition_id,
                sync: SyncStamp::new(),
            })
            .collect();
        let membership = self.store.insert_memberships(&memberships)?;

        let summary = ImportSummary {
            nodes_created: rows.node_ids.len(),
            items_created: rows.item_ids.len(),
            field_values_created: rows.field_values,
            closure_edges_inserted: closure.inserted,
            closure_edges_already_present: closure.already_present,
            memberships_inserted: membership.inserted,
            memberships_already_present: membership.already_present,
            unresolved: plan.unresolved,
        };

        if summary.is_clean() {
            tracing::info!(
                "Import finished: {} closure edges, {} memberships",
                summary.closure_edges_inserted,
                summary.memberships_inserted
            );
        } else {
            tracing::warn!(
                "Import finished with {} unresolved keys",
                summary.unresolved.len()
            );
        }
        Ok(summary)
    }

    fn persist_rows(
        &self,
        tree: &SourceTree,
        partition_id: PartitionId,
        settings: &PartitionConfig,
    ) -> Result<CreatedRows> {
        let mut rows = CreatedRows::default();
        let mut stack: Vec<&SourceNode> = tree.roots.iter().rev().collect();

        while let Some(entry) = stack.pop() {
            match &entry.body {
                NodeBody::Children(children) => {
                    let node = self.store.insert_node(&NewNode {
                        name: entry.name.clone(),
                        name_zh: non_empty(&entry.name_zh),
                        partition_id,
                        rank: entry.rank.clone(),
                        sync: SyncStamp::with_key(parse_node_key(entry)?),
                    })?;
                    rows.node_ids.insert(entry.key.clone(), node.id);
                    stack.extend(children.iter().rev());
                }
                NodeBody::Records(records) => {
                    for (ordinal, record) in records.iter().enumerate() {
                        let item = self.store.insert_item(&NewItem {
                            name: entry.name.clone(),
                            name_zh: non_empty(&entry.name_zh),
                            partition_id,
                            item_type_id: settings.item_type_id,
                            payload: record.clone(),
                            sync: SyncStamp::new(),
                        })?;

                        let accepted = record
                            .get(ACCEPTED_FLAG_KEY)
                            .and_then(payload_value_as_string)
                            .unwrap_or_else(|| ACCEPTED_FLAG_FALLBACK.to_string());
                        self.store.insert_field_value(&ItemFieldValue::new(
                            item.id,
                            settings.accepted_field_id,
                            accepted,
                        ))?;
                        rows.field_values += 1;

                        rows.item_ids
                            .insert(LeafRef::new(entry.key.clone(), ordinal), item.id);
                    }
                }
            }
        }
        Ok(rows)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
