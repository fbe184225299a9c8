//! End-to-end import into an in-memory SQLite store

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::collections::HashSet;

use taxa_hierarchy::{CatalogError, HierarchyReader, ImportPipeline, SourceTree};
use taxa_storage::{CatalogStore, ClosureEdge};

#[test]
fn test_one_root_two_children_three_records() {
    let fx = Fixture::new("mammals", &["order", "genus", "species"]);
    let summary = fx.import(&small_tree());

    assert_eq!(summary.nodes_created, 3);
    assert_eq!(summary.items_created, 3);
    assert_eq!(summary.field_values_created, 3);
    // root-root, root-felis, root-canis, felis-felis, canis-canis
    assert_eq!(summary.closure_edges_inserted, 5);
    assert_eq!(summary.closure_edges_already_present, 0);
    assert_eq!(summary.memberships_inserted, 3);
    assert!(summary.unresolved.is_empty());

    let stats = fx.store.stats(fx.partition.id).unwrap();
    assert_eq!(stats.nodes, 3);
    assert_eq!(stats.items, 3);
    assert_eq!(stats.memberships, 3);
    assert_eq!(stats.closure_edges, 5);

    let root = fx.node_id("order", "Carnivora");
    let reader = HierarchyReader::new(&fx.store, &fx.config);
    assert_eq!(reader.aggregate_item_count(root).unwrap(), 3);
    assert_eq!(
        reader
            .aggregate_item_count(fx.node_id("genus", "Felis"))
            .unwrap(),
        2
    );
}

#[test]
fn test_closure_is_reflexive_transitive_closure() {
    let fx = Fixture::new("mammals", &["order", "genus", "species"]);
    fx.import(&small_tree());

    let root = fx.node_id("order", "Carnivora");
    let felis = fx.node_id("genus", "Felis");
    let canis = fx.node_id("genus", "Canis");

    let edges: HashSet<ClosureEdge> = fx
        .store
        .closure_edges(fx.partition.id)
        .unwrap()
        .into_iter()
        .collect();
    let expected: HashSet<ClosureEdge> = [
        ClosureEdge::new(root, root, 0),
        ClosureEdge::new(root, felis, 1),
        ClosureEdge::new(root, canis, 1),
        ClosureEdge::new(felis, felis, 0),
        ClosureEdge::new(canis, canis, 0),
    ]
    .into_iter()
    .collect();
    assert_eq!(edges, expected);
}

#[test]
fn test_each_item_has_one_direct_membership() {
    let fx = Fixture::new("mammals", &["order", "genus", "species"]);
    fx.import(&small_tree());
    let felis = fx.node_id("genus", "Felis");

    let page = fx
        .store
        .search_items(&taxa_storage::ItemQuery {
            within_node: Some(felis),
            ..taxa_storage::ItemQuery::new(fx.partition.id)
        })
        .unwrap();
    assert_eq!(page.total, 2);
    for item in &page.items {
        let memberships = fx.store.memberships_of(item.id).unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].node_id, felis);
        assert_eq!(item.name, "Felis catus");
        assert_eq!(item.name_zh.as_deref(), Some("家貓"));
    }
}

#[test]
fn test_deep_tree_edge_count_is_sum_of_depth_pairs() {
    let fx = Fixture::new("plants", &["kingdom", "family", "genus", "species"]);
    let tree = SourceTree::new(vec![branch(
        "Plantae",
        "kingdom",
        node_key(1),
        vec![branch(
            "Rosaceae",
            "family",
            node_key(2),
            vec![branch(
                "Prunus",
                "genus",
                node_key(3),
                vec![leaf("Prunus campanulata", "", "species", "p-c", vec![accepted("1")])],
            )],
        )],
    )]);

    let summary = fx.import(&tree);
    // a single chain of 3 nodes: 3 + 2 + 1 pairs
    assert_eq!(summary.closure_edges_inserted, 6);
    let edges = fx.store.closure_edges(fx.partition.id).unwrap();
    let deepest = edges.iter().map(|e| e.depth).max();
    assert_eq!(deepest, Some(2));
}

#[test]
fn test_import_from_json_document() {
    let fx = Fixture::new("birds", &["order", "species"]);
    let json = format!(
        r#"{{
            "Passeriformes": {{
                "name": "Passeriformes", "name_zh": "雀形目", "rank": "order",
                "key": "{}",
                "children": {{
                    "Garrulax": {{
                        "name": "Garrulax taewanus", "name_zh": "台灣畫眉",
                        "rank": "species", "key": "g-t",
                        "records": [{{"is_accepted": 1, "Chinese_name_other": "畫眉"}}]
                    }}
                }}
            }}
        }}"#,
        node_key(5)
    );
    let tree = SourceTree::from_json_str(&json).unwrap();
    let summary = fx.import(&tree);
    assert_eq!(summary.items_created, 1);

    let listing = HierarchyReader::new(&fx.store, &fx.config)
        .list_items(fx.partition.id, &Default::default(), Default::default())
        .unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.items[0].name_zh_other, "畫眉");
    assert_eq!(listing.items[0].status_id, "1");

    let detail = HierarchyReader::new(&fx.store, &fx.config)
        .item_detail(listing.items[0].id)
        .unwrap();
    // numeric flag stored in its rendered form
    assert_eq!(detail.fields.get(&1).map(String::as_str), Some("1"));
    assert_eq!(detail.item.payload_str("Chinese_name_other").as_deref(), Some("畫眉"));
}

#[test]
fn test_invalid_rank_aborts_before_any_write() {
    let fx = Fixture::new("mammals", &["order", "genus"]);
    let err = ImportPipeline::new(&fx.store, &fx.config)
        .run(&small_tree(), fx.partition.id)
        .unwrap_err();

    assert!(matches!(err, CatalogError::MalformedHierarchy(_)));
    let stats = fx.store.stats(fx.partition.id).unwrap();
    assert_eq!(stats.nodes, 0);
    assert_eq!(stats.items, 0);
}

#[test]
fn test_reimport_into_populated_partition_rejected() {
    let fx = Fixture::new("mammals", &["order", "genus", "species"]);
    fx.import(&small_tree());

    let err = ImportPipeline::new(&fx.store, &fx.config)
        .run(&small_tree(), fx.partition.id)
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::PartitionNotEmpty {
            nodes: 3,
            items: 3,
            ..
        }
    ));
    assert_eq!(fx.store.stats(fx.partition.id).unwrap().nodes, 3);
}

#[test]
fn test_partitions_stay_isolated() {
    let fx = Fixture::new("mammals", &["order", "genus", "species"]);
    fx.import(&small_tree());

    let other = fx
        .store
        .create_partition(&taxa_storage::NewPartition::named("mammals"))
        .unwrap();
    let reader = HierarchyReader::new(&fx.store, &fx.config);
    assert!(reader.list_collections(other.id, 2).unwrap().is_empty());

    // the same source, node keys included, imports cleanly next to the first copy
    let summary = ImportPipeline::new(&fx.store, &fx.config)
        .run(&small_tree(), other.id)
        .unwrap();
    assert_eq!(summary.nodes_created, 3);
    assert_eq!(summary.closure_edges_inserted, 5);
    assert_eq!(summary.closure_edges_already_present, 0);

    for partition_id in [fx.partition.id, other.id] {
        let stats = fx.store.stats(partition_id).unwrap();
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.items, 3);
        assert_eq!(stats.closure_edges, 5);
    }

    let first = reader.list_collections(fx.partition.id, 1).unwrap();
    let second = reader.list_collections(other.id, 1).unwrap();
    assert_ne!(first[0].id, second[0].id);
    assert_eq!(first[0].count, 3);
    assert_eq!(second[0].count, 3);

    let first_nodes: HashSet<i64> = fx
        .store
        .closure_edges(fx.partition.id)
        .unwrap()
        .iter()
        .flat_map(|e| [e.ancestor_id, e.descendant_id])
        .collect();
    let second_nodes: HashSet<i64> = fx
        .store
        .closure_edges(other.id)
        .unwrap()
        .iter()
        .flat_map(|e| [e.ancestor_id, e.descendant_id])
        .collect();
    assert!(first_nodes.is_disjoint(&second_nodes));

    let listing = reader
        .list_items(other.id, &Default::default(), Default::default())
        .unwrap();
    assert_eq!(listing.total, 3);
}
