//! Catalog configuration
//!
//! Loaded from a versioned YAML file:
//!
//! ```yaml
//! version: 1
//! database: catalog.db
//! cache:
//!   ttl_secs: 86400
//!   max_entries: 10000
//! default_page_size: 20
//! partitions:
//!   species:
//!     ranks: [kingdom, phylum, class, order, family, genus, species]
//!     count_filter: { kind: field_equals, field_id: 1, value: "1" }
//!     field_overrides:
//!       is_accepted: 1
//! ```
//!
//! Partitions are looked up by name; a partition without an entry has no rank
//! configuration and every hierarchy operation on it fails fast.

pub mod error;
pub mod rank;

pub use error::{ConfigError, ConfigResult};
pub use rank::{parse_node_key, RankScheme};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use taxa_storage::{FieldId, ItemFilter, ItemTypeId};

use crate::errors::{CatalogError, Result};

const SUPPORTED_VERSIONS: &[u32] = &[1];

/// 24 hours
pub const DEFAULT_TTL_SECS: u64 = 86_400;
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Settings for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionConfig {
    /// Ordered rank labels, root first
    pub ranks: Vec<String>,

    #[serde(default = "default_type_id")]
    pub item_type_id: ItemTypeId,

    /// Field receiving each record's curation flag at import
    #[serde(default = "default_type_id")]
    pub accepted_field_id: FieldId,

    /// Predicate applied to aggregate counts and listings
    #[serde(default)]
    pub count_filter: ItemFilter,

    /// Payload key -> field id; payload values win over stored values at read time
    #[serde(default)]
    pub field_overrides: BTreeMap<String, FieldId>,
}

impl PartitionConfig {
    pub fn with_ranks<I, S>(ranks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ranks: ranks.into_iter().map(Into::into).collect(),
            item_type_id: default_type_id(),
            accepted_field_id: default_type_id(),
            count_filter: ItemFilter::All,
            field_overrides: BTreeMap::new(),
        }
    }

    pub fn count_filter(mut self, filter: ItemFilter) -> Self {
        self.count_filter = filter;
        self
    }

    pub fn field_override(mut self, payload_key: impl Into<String>, field_id: FieldId) -> Self {
        self.field_overrides.insert(payload_key.into(), field_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,
    #[serde(default)]
    database: Option<PathBuf>,
    #[serde(default)]
    cache: CacheSettings,
    #[serde(default = "default_page_size")]
    default_page_size: usize,
    #[serde(default)]
    partitions: BTreeMap<String, PartitionConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub database: Option<PathBuf>,
    pub cache: CacheSettings,
    pub default_page_size: usize,
    partitions: BTreeMap<String, PartitionConfig>,
    schemes: BTreeMap<String, RankScheme>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database: None,
            cache: CacheSettings::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            partitions: BTreeMap::new(),
            schemes: BTreeMap::new(),
        }
    }
}

impl CatalogConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        if file.default_page_size == 0 {
            return Err(ConfigError::Validation(
                "default_page_size must be at least 1".to_string(),
            ));
        }

        let mut config = CatalogConfig {
            database: file.database,
            cache: file.cache,
            default_page_size: file.default_page_size,
            ..Default::default()
        };
        for (name, partition) in file.partitions {
            config = config.with_partition(name, partition)?;
        }
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            database: self.database.clone(),
            cache: self.cache.clone(),
            default_page_size: self.default_page_size,
            partitions: self.partitions.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Register a partition, validating its rank list
    pub fn with_partition(
        mut self,
        name: impl Into<String>,
        partition: PartitionConfig,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let scheme = RankScheme::new(name.clone(), partition.ranks.clone())?;
        self.schemes.insert(name.clone(), scheme);
        self.partitions.insert(name, partition);
        Ok(self)
    }

    pub fn partition(&self, name: &str) -> Result<&PartitionConfig> {
        self.partitions
            .get(name)
            .ok_or_else(|| CatalogError::ConfigurationMissing(name.to_string()))
    }

    pub fn rank_scheme(&self, name: &str) -> Result<&RankScheme> {
        self.schemes
            .get(name)
            .ok_or_else(|| CatalogError::ConfigurationMissing(name.to_string()))
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_type_id() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
version: 1
database: catalog.db
cache:
  ttl_secs: 60
partitions:
  species:
    ranks: [kingdom, family, genus, species]
    count_filter: { kind: field_equals, field_id: 1, value: "1" }
    field_overrides:
      is_accepted: 1
  plants:
    ranks: [family, genus]
"#;

    #[test]
    fn test_yaml_loading() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CatalogConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.database, Some(PathBuf::from("catalog.db")));
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.default_page_size, 20);

        let species = config.partition("species").unwrap();
        assert_eq!(
            species.count_filter,
            ItemFilter::FieldEquals {
                field_id: 1,
                value: "1".into()
            }
        );
        assert_eq!(species.field_overrides.get("is_accepted"), Some(&1));
        assert_eq!(config.rank_scheme("species").unwrap().root_rank(), "kingdom");

        let plants = config.partition("plants").unwrap();
        assert_eq!(plants.count_filter, ItemFilter::All);
        assert_eq!(plants.item_type_id, 1);
    }

    #[test]
    fn test_missing_partition_is_configuration_missing() {
        let config = CatalogConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(matches!(
            config.rank_scheme("fungi"),
            Err(CatalogError::ConfigurationMissing(name)) if name == "fungi"
        ));
    }

    #[test]
    fn test_yaml_missing_version() {
        let err = CatalogConfig::from_yaml_str("partitions: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVersion));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let err = CatalogConfig::from_yaml_str("version: 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 2, .. }));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let err = CatalogConfig::from_yaml_str("version: 1\nredis_url: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_duplicate_rank_rejected() {
        let yaml = "version: 1\npartitions:\n  p:\n    ranks: [genus, genus]\n";
        let err = CatalogConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Partition { .. }));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = CatalogConfig::default()
            .with_partition(
                "species",
                PartitionConfig::with_ranks(["family", "genus"]).field_override("status", 2),
            )
            .unwrap();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));

        let back = CatalogConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
