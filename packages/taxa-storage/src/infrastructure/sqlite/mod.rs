//! SQLite Catalog Store
//!
//! File-based persistent storage using SQLite. Node and item inserts commit
//! per row so later lookups by id succeed; edge batches run in one
//! transaction with `ON CONFLICT DO NOTHING` so duplicates are counted
//! instead of raised.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::models::{
    CatalogStats, ClosureEdge, EdgeWriteOutcome, Item, ItemFieldValue, ItemFilter, ItemId,
    ItemPage, ItemQuery, Membership, NewItem, NewMembership, NewNode, NewPartition, Node, NodeId,
    Partition, PartitionId, Payload, SyncStamp, Timestamps,
};
use crate::domain::ports::CatalogStore;
use crate::{Result, StorageError};

const NODE_COLUMNS: &str = "n.id, n.name, n.name_zh, n.partition_id, n.rank, n.key, n.version";

const ITEM_COLUMNS: &str = "i.id, i.name, i.name_zh, i.partition_id, i.item_type_id, i.payload, \
                            i.key, i.version, i.created_at, i.updated_at";

/// SQLite-based CatalogStore implementation
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::database("SQLite connection mutex poisoned"))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS partitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                host TEXT,
                title TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_zh TEXT,
                partition_id INTEGER NOT NULL,
                rank TEXT NOT NULL,
                key TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                UNIQUE (partition_id, key),
                FOREIGN KEY (partition_id) REFERENCES partitions(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_partition_rank
             ON nodes(partition_id, rank, name)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_zh TEXT,
                name_folded TEXT NOT NULL,
                name_zh_folded TEXT,
                partition_id INTEGER NOT NULL,
                item_type_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                key TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (partition_id) REFERENCES partitions(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_partition ON items(partition_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS memberships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                node_id INTEGER NOT NULL,
                partition_id INTEGER NOT NULL,
                key TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL DEFAULT 1,
                UNIQUE (item_id, node_id),
                FOREIGN KEY (item_id) REFERENCES items(id),
                FOREIGN KEY (node_id) REFERENCES nodes(id),
                FOREIGN KEY (partition_id) REFERENCES partitions(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memberships_node ON memberships(node_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS node_closure (
                ancestor_id INTEGER NOT NULL,
                descendant_id INTEGER NOT NULL,
                depth INTEGER NOT NULL CHECK (depth >= 0),
                PRIMARY KEY (ancestor_id, descendant_id),
                FOREIGN KEY (ancestor_id) REFERENCES nodes(id),
                FOREIGN KEY (descendant_id) REFERENCES nodes(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_closure_ancestor_depth
             ON node_closure(ancestor_id, depth)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS item_field_values (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                field_id INTEGER NOT NULL,
                value TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_field_values_item
             ON item_field_values(item_id, field_id, value)",
            [],
        )?;

        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_uuid(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_payload(idx: usize, raw: String) -> rusqlite::Result<Payload> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        name: row.get(1)?,
        name_zh: row.get(2)?,
        partition_id: row.get(3)?,
        rank: row.get(4)?,
        sync: SyncStamp {
            key: parse_uuid(5, row.get(5)?)?,
            version: row.get(6)?,
        },
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let created_at: DateTime<Utc> = row.get(8)?;
    let updated_at: DateTime<Utc> = row.get(9)?;
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        name_zh: row.get(2)?,
        partition_id: row.get(3)?,
        item_type_id: row.get(4)?,
        payload: parse_payload(5, row.get(5)?)?,
        sync: SyncStamp {
            key: parse_uuid(6, row.get(6)?)?,
            version: row.get(7)?,
        },
        timestamps: Timestamps {
            created_at,
            updated_at,
        },
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: row.get(0)?,
        item_id: row.get(1)?,
        node_id: row.get(2)?,
        partition_id: row.get(3)?,
        sync: SyncStamp {
            key: parse_uuid(4, row.get(4)?)?,
            version: row.get(5)?,
        },
    })
}

/// Unicode-aware lowercase used for the stored search columns and the needle.
/// SQLite's own `LIKE`/`lower()` only fold ASCII.
fn fold_case(raw: &str) -> String {
    raw.to_lowercase()
}

/// WHERE clause shared by the count and page statements of `search_items`
fn item_query_predicate(query: &ItemQuery) -> (String, Vec<Value>) {
    let mut sql = String::from("i.partition_id = ?");
    let mut values = vec![Value::Integer(query.partition_id)];

    if let ItemFilter::FieldEquals { field_id, value } = &query.filter {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM item_field_values f
                          WHERE f.item_id = i.id AND f.field_id = ? AND f.value = ?)",
        );
        values.push(Value::Integer(*field_id));
        values.push(Value::Text(value.clone()));
    }

    if let Some(q) = query.name_contains.as_deref() {
        let needle = fold_case(q);
        sql.push_str(" AND (instr(i.name_folded, ?) > 0 OR instr(i.name_zh_folded, ?) > 0)");
        values.push(Value::Text(needle.clone()));
        values.push(Value::Text(needle));
    }

    if let Some(node_id) = query.within_node {
        // Empty candidate set means zero rows, never "unrestricted"
        sql.push_str(
            " AND i.id IN (SELECT m.item_id FROM memberships m
                           JOIN node_closure c ON c.descendant_id = m.node_id
                           WHERE c.ancestor_id = ?)",
        );
        values.push(Value::Integer(node_id));
    }

    (sql, values)
}

impl CatalogStore for SqliteCatalogStore {
    fn create_partition(&self, partition: &NewPartition) -> Result<Partition> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO partitions (name, host, title) VALUES (?1, ?2, ?3)",
            params![&partition.name, &partition.host, &partition.title],
        )?;
        Ok(Partition {
            id: conn.last_insert_rowid(),
            name: partition.name.clone(),
            host: partition.host.clone(),
            title: partition.title.clone(),
        })
    }

    fn get_partition(&self, partition_id: PartitionId) -> Result<Option<Partition>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                "SELECT id, name, host, title FROM partitions WHERE id = ?1",
                params![partition_id],
                |row| {
                    Ok(Partition {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        host: row.get(2)?,
                        title: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    fn insert_node(&self, node: &NewNode) -> Result<Node> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO nodes (name, name_zh, partition_id, rank, key, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &node.name,
                &node.name_zh,
                node.partition_id,
                &node.rank,
                node.sync.key.to_string(),
                node.sync.version,
            ],
        )?;
        Ok(Node {
            id: conn.last_insert_rowid(),
            name: node.name.clone(),
            name_zh: node.name_zh.clone(),
            partition_id: node.partition_id,
            rank: node.rank.clone(),
            sync: node.sync,
        })
    }

    fn insert_item(&self, item: &NewItem) -> Result<Item> {
        let timestamps = Timestamps::now();
        let payload = serde_json::to_string(&item.payload)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO items
             (name, name_zh, name_folded, name_zh_folded, partition_id, item_type_id,
              payload, key, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &item.name,
                &item.name_zh,
                fold_case(&item.name),
                item.name_zh.as_deref().map(fold_case),
                item.partition_id,
                item.item_type_id,
                payload,
                item.sync.key.to_string(),
                item.sync.version,
                timestamps.created_at,
                timestamps.updated_at,
            ],
        )?;
        Ok(Item {
            id: conn.last_insert_rowid(),
            name: item.name.clone(),
            name_zh: item.name_zh.clone(),
            partition_id: item.partition_id,
            item_type_id: item.item_type_id,
            payload: item.payload.clone(),
            sync: item.sync,
            timestamps,
        })
    }

    fn insert_field_value(&self, value: &ItemFieldValue) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO item_field_values (item_id, field_id, value) VALUES (?1, ?2, ?3)",
            params![value.item_id, value.field_id, &value.value],
        )?;
        Ok(())
    }

    fn update_item_payload(&self, item_id: ItemId, payload: &Payload) -> Result<Item> {
        let payload = serde_json::to_string(payload)?;
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // Version is bumped in SQL so concurrent writers never lose an increment
        let changed = tx.execute(
            "UPDATE items SET payload = ?1, version = version + 1, updated_at = ?2 WHERE id = ?3",
            params![payload, Utc::now(), item_id],
        )?;
        if changed == 0 {
            return Err(StorageError::item_not_found(item_id));
        }
        let item = tx.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?1"),
            params![item_id],
            item_from_row,
        )?;

        tx.commit()?;
        Ok(item)
    }

    fn insert_closure_edges(&self, edges: &[ClosureEdge]) -> Result<EdgeWriteOutcome> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut outcome = EdgeWriteOutcome::default();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO node_closure (ancestor_id, descendant_id, depth)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (ancestor_id, descendant_id) DO NOTHING",
            )?;
            for edge in edges {
                let changed =
                    stmt.execute(params![edge.ancestor_id, edge.descendant_id, edge.depth])?;
                if changed == 0 {
                    outcome.already_present += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn insert_memberships(&self, memberships: &[NewMembership]) -> Result<EdgeWriteOutcome> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut outcome = EdgeWriteOutcome::default();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO memberships (item_id, node_id, partition_id, key, version)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (item_id, node_id) DO NOTHING",
            )?;
            for membership in memberships {
                let changed = stmt.execute(params![
                    membership.item_id,
                    membership.node_id,
                    membership.partition_id,
                    membership.sync.key.to_string(),
                    membership.sync.version,
                ])?;
                if changed == 0 {
                    outcome.already_present += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn get_node(&self, node_id: NodeId) -> Result<Option<Node>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes n WHERE n.id = ?1"),
                params![node_id],
                node_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?1"),
                params![item_id],
                item_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn nodes_at_rank(&self, partition_id: PartitionId, rank: &str) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes n
             WHERE n.partition_id = ?1 AND n.rank = ?2
             ORDER BY n.name, n.id"
        ))?;
        let nodes = stmt
            .query_map(params![partition_id, rank], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn child_nodes(&self, node_id: NodeId) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM node_closure c
             JOIN nodes n ON n.id = c.descendant_id
             WHERE c.ancestor_id = ?1 AND c.depth = 1
             ORDER BY n.name, n.id"
        ))?;
        let nodes = stmt
            .query_map(params![node_id], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn count_items_under(&self, node_id: NodeId, filter: &ItemFilter) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = match filter {
            ItemFilter::All => conn.query_row(
                "SELECT COUNT(DISTINCT m.item_id) FROM node_closure c
                 JOIN memberships m ON m.node_id = c.descendant_id
                 WHERE c.ancestor_id = ?1",
                params![node_id],
                |row| row.get(0),
            )?,
            ItemFilter::FieldEquals { field_id, value } => conn.query_row(
                "SELECT COUNT(DISTINCT m.item_id) FROM node_closure c
                 JOIN memberships m ON m.node_id = c.descendant_id
                 JOIN item_field_values f ON f.item_id = m.item_id
                 WHERE c.ancestor_id = ?1 AND f.field_id = ?2 AND f.value = ?3",
                params![node_id, field_id, value],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn search_items(&self, query: &ItemQuery) -> Result<ItemPage> {
        let (predicate, mut values) = item_query_predicate(query);
        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM items i WHERE {predicate}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(query.limit as i64));
        values.push(Value::Integer(query.offset as i64));
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i WHERE {predicate}
             ORDER BY i.id LIMIT ? OFFSET ?"
        ))?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ItemPage {
            items,
            total: total as usize,
        })
    }

    fn field_values(&self, item_id: ItemId) -> Result<Vec<ItemFieldValue>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, field_id, value FROM item_field_values
             WHERE item_id = ?1 ORDER BY id",
        )?;
        let values = stmt
            .query_map(params![item_id], |row| {
                Ok(ItemFieldValue {
                    item_id: row.get(0)?,
                    field_id: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    fn memberships_of(&self, item_id: ItemId) -> Result<Vec<Membership>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, item_id, node_id, partition_id, key, version
             FROM memberships WHERE item_id = ?1 ORDER BY id",
        )?;
        let memberships = stmt
            .query_map(params![item_id], membership_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memberships)
    }

    fn closure_edges(&self, partition_id: PartitionId) -> Result<Vec<ClosureEdge>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.ancestor_id, c.descendant_id, c.depth FROM node_closure c
             JOIN nodes n ON n.id = c.ancestor_id
             WHERE n.partition_id = ?1
             ORDER BY c.ancestor_id, c.descendant_id",
        )?;
        let edges = stmt
            .query_map(params![partition_id], |row| {
                Ok(ClosureEdge {
                    ancestor_id: row.get(0)?,
                    descendant_id: row.get(1)?,
                    depth: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn stats(&self, partition_id: PartitionId) -> Result<CatalogStats> {
        let conn = self.lock()?;

        let nodes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE partition_id = ?1",
            params![partition_id],
            |row| row.get(0),
        )?;
        let items: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE partition_id = ?1",
            params![partition_id],
            |row| row.get(0),
        )?;
        let memberships: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memberships WHERE partition_id = ?1",
            params![partition_id],
            |row| row.get(0),
        )?;
        let closure_edges: i64 = conn.query_row(
            "SELECT COUNT(*) FROM node_closure c
             JOIN nodes n ON n.id = c.ancestor_id
             WHERE n.partition_id = ?1",
            params![partition_id],
            |row| row.get(0),
        )?;

        Ok(CatalogStats {
            nodes: nodes as usize,
            items: items as usize,
            memberships: memberships as usize,
            closure_edges: closure_edges as usize,
        })
    }
}
