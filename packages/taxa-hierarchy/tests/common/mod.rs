//! Shared fixtures for taxa-hierarchy integration tests

#![allow(dead_code)]

use serde_json::{json, Value};

use taxa_hierarchy::{
    CatalogConfig, ImportPipeline, ImportSummary, NodeBody, PartitionConfig, RawRow, SourceNode,
    SourceTree,
};
use taxa_storage::{CatalogStore, ItemFilter, NewPartition, Partition, SqliteCatalogStore};

/// Deterministic UUID-shaped node key
pub fn node_key(n: u64) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

pub fn record(pairs: &[(&str, Value)]) -> RawRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn accepted(flag: &str) -> RawRow {
    record(&[("is_accepted", json!(flag))])
}

pub fn branch(name: &str, rank: &str, key: String, children: Vec<SourceNode>) -> SourceNode {
    SourceNode {
        name: name.to_string(),
        name_zh: String::new(),
        key,
        rank: rank.to_string(),
        body: NodeBody::Children(children),
    }
}

pub fn leaf(name: &str, name_zh: &str, rank: &str, key: &str, records: Vec<RawRow>) -> SourceNode {
    SourceNode {
        name: name.to_string(),
        name_zh: name_zh.to_string(),
        key: key.to_string(),
        rank: rank.to_string(),
        body: NodeBody::Records(records),
    }
}

pub struct Fixture {
    pub store: SqliteCatalogStore,
    pub config: CatalogConfig,
    pub partition: Partition,
}

impl Fixture {
    pub fn new(name: &str, ranks: &[&str]) -> Self {
        Self::with_filter(name, ranks, ItemFilter::All)
    }

    pub fn with_filter(name: &str, ranks: &[&str], filter: ItemFilter) -> Self {
        let store = SqliteCatalogStore::in_memory().expect("in-memory store");
        let partition = store
            .create_partition(&NewPartition::named(name))
            .expect("partition");
        let config = CatalogConfig::default()
            .with_partition(
                name,
                PartitionConfig::with_ranks(ranks.iter().copied()).count_filter(filter),
            )
            .expect("rank scheme");
        Self {
            store,
            config,
            partition,
        }
    }

    pub fn import(&self, tree: &SourceTree) -> ImportSummary {
        ImportPipeline::new(&self.store, &self.config)
            .run(tree, self.partition.id)
            .expect("import")
    }

    pub fn node_id(&self, rank: &str, name: &str) -> i64 {
        self.store
            .nodes_at_rank(self.partition.id, rank)
            .expect("nodes")
            .into_iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("no {rank} node named {name}"))
            .id
    }
}

/// order -> 2 genera -> 3 records
pub fn small_tree() -> SourceTree {
    SourceTree::new(vec![branch(
        "Carnivora",
        "order",
        node_key(1),
        vec![
            branch(
                "Felis",
                "genus",
                node_key(2),
                vec![leaf(
                    "Felis catus",
                    "家貓",
                    "species",
                    "felis-catus",
                    vec![accepted("1"), accepted("1")],
                )],
            ),
            branch(
                "Canis",
                "genus",
                node_key(3),
                vec![leaf(
                    "Canis lupus",
                    "狼",
                    "species",
                    "canis-lupus",
                    vec![accepted("0")],
                )],
            ),
        ],
    )])
}

/// Primates with one populated genus and one empty genus
pub fn primate_tree() -> SourceTree {
    SourceTree::new(vec![branch(
        "Primates",
        "order",
        node_key(10),
        vec![
            branch(
                "Macaca",
                "genus",
                node_key(11),
                vec![
                    leaf(
                        "Formosan Rock Monkey",
                        "台灣岩猿",
                        "species",
                        "macaca-cyclopis",
                        vec![record(&[
                            ("is_accepted", json!("1")),
                            ("Chinese_name_other", json!("臺灣獼猴")),
                            ("status_id", json!("2")),
                        ])],
                    ),
                    leaf(
                        "Japanese Macaque",
                        "日本獼猴",
                        "species",
                        "macaca-fuscata",
                        vec![accepted("1")],
                    ),
                ],
            ),
            branch("Nomascus", "genus", node_key(12), vec![]),
        ],
    )])
}
