//! Catalog Domain Models
//!
//! - Partition ("library"): isolated tenant owning nodes, items and rank config
//! - Node ("collection"): one level of the taxonomy, tagged with a rank label
//! - Item: leaf record (specimen) with a verbatim source payload
//! - Membership: item ∈ node
//! - ClosureEdge: materialized ancestor/descendant pair with depth
//! - ItemFieldValue: descriptive field attached to an item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PartitionId = i64;
pub type NodeId = i64;
pub type ItemId = i64;
pub type MembershipId = i64;
pub type FieldId = i64;
pub type ItemTypeId = i64;

/// Free-form source row, preserved verbatim (key order included)
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════════════════
// Shared value types
// ═══════════════════════════════════════════════════════════════════════════

/// Stable external identity plus a monotonic version counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStamp {
    /// External key, assigned at creation and never reused
    pub key: Uuid,
    /// Starts at 1, incremented on every update
    pub version: i64,
}

impl SyncStamp {
    pub fn new() -> Self {
        Self::with_key(Uuid::new_v4())
    }

    pub fn with_key(key: Uuid) -> Self {
        Self { key, version: 1 }
    }

    pub fn bump(&mut self) {
        self.version += 1;
    }
}

impl Default for SyncStamp {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════════

/// Partition ("library")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,
    /// Configuration lookup key
    pub name: String,
    pub host: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPartition {
    pub name: String,
    pub host: Option<String>,
    pub title: Option<String>,
}

impl NewPartition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Taxonomic collection at some rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub name_zh: Option<String>,
    pub partition_id: PartitionId,
    /// Rank label, one of the partition's configured ranks
    pub rank: String,
    pub sync: SyncStamp,
}

#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub name_zh: Option<String>,
    pub partition_id: PartitionId,
    pub rank: String,
    pub sync: SyncStamp,
}

/// Leaf record (specimen)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub name_zh: Option<String>,
    pub partition_id: PartitionId,
    pub item_type_id: ItemTypeId,
    pub payload: Payload,
    pub sync: SyncStamp,
    pub timestamps: Timestamps,
}

impl Item {
    /// String view of a payload value; numbers and booleans are rendered
    pub fn payload_str(&self, key: &str) -> Option<String> {
        payload_value_as_string(self.payload.get(key)?)
    }
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub name_zh: Option<String>,
    pub partition_id: PartitionId,
    pub item_type_id: ItemTypeId,
    pub payload: Payload,
    pub sync: SyncStamp,
}

/// item ∈ node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub item_id: ItemId,
    pub node_id: NodeId,
    pub partition_id: PartitionId,
    pub sync: SyncStamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    pub item_id: ItemId,
    pub node_id: NodeId,
    pub partition_id: PartitionId,
    pub sync: SyncStamp,
}

/// Materialized ancestor/descendant pair; `depth = 0` is the self-pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureEdge {
    pub ancestor_id: NodeId,
    pub descendant_id: NodeId,
    pub depth: u32,
}

impl ClosureEdge {
    pub fn new(ancestor_id: NodeId, descendant_id: NodeId, depth: u32) -> Self {
        Self {
            ancestor_id,
            descendant_id,
            depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFieldValue {
    pub item_id: ItemId,
    pub field_id: FieldId,
    pub value: String,
}

impl ItemFieldValue {
    pub fn new(item_id: ItemId, field_id: FieldId, value: impl Into<String>) -> Self {
        Self {
            item_id,
            field_id,
            value: value.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Query types
// ═══════════════════════════════════════════════════════════════════════════

/// Per-partition item predicate applied to counts and listings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemFilter {
    /// Every membership counts
    #[default]
    All,
    /// Only items carrying `field_id = value`
    FieldEquals { field_id: FieldId, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub partition_id: PartitionId,
    pub filter: ItemFilter,
    /// Case-insensitive substring against `name` and `name_zh`
    pub name_contains: Option<String>,
    /// Restrict to items whose membership resolves under this node (inclusive)
    pub within_node: Option<NodeId>,
    pub limit: usize,
    pub offset: usize,
}

impl ItemQuery {
    pub fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            filter: ItemFilter::All,
            name_contains: None,
            within_node: None,
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<Item>,
    /// Match count before pagination
    pub total: usize,
}

impl ItemPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Result of an insert-if-absent batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeWriteOutcome {
    pub inserted: usize,
    pub already_present: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub nodes: usize,
    pub items: usize,
    pub memberships: usize,
    pub closure_edges: usize,
}

/// Render a JSON payload value the way descriptive fields store it
pub fn payload_value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}
