//! taxa: catalog maintenance and query CLI
//!
//! # Usage
//!
//! ```bash
//! # Create a partition named in the config file
//! taxa --config taxa.yaml init-partition species --title "Species"
//!
//! # Inspect a source tree, writing the flat path list
//! taxa flatten hierarchy.json --flat-out flat.json
//!
//! # Import into partition 1, then browse it
//! taxa --config taxa.yaml import hierarchy.json 1
//! taxa --config taxa.yaml collections 1 --depth 2
//! taxa --config taxa.yaml items 1 --q macaque --limit 10
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG`, default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taxa_hierarchy::{
    hierarchy_stats, to_array, to_flat_paths, CacheMetrics, CachedCatalog, CatalogConfig,
    HierarchyReader, ImportPipeline, ItemSearch, MokaResultCache, Page, SourceTree,
};
use taxa_storage::{CatalogStore, NewPartition, SqliteCatalogStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "taxa")]
#[command(about = "Taxonomic catalog: import nested hierarchies and query them", long_about = None)]
struct Cli {
    /// Catalog configuration (YAML, version 1)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database; overrides `database` in the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a partition
    InitPartition {
        /// Name used to look up the partition's configuration
        name: String,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        title: Option<String>,
    },

    /// Print statistics for a source tree without touching the store
    Flatten {
        /// Nested hierarchy JSON
        source: PathBuf,

        /// Write the flat path list here
        #[arg(long)]
        flat_out: Option<PathBuf>,

        /// Write the counted array view here
        #[arg(long)]
        array_out: Option<PathBuf>,
    },

    /// Import a source tree into an empty partition
    Import {
        /// Nested hierarchy JSON
        source: PathBuf,

        partition_id: i64,
    },

    /// Top-level collections with counts
    Collections {
        partition_id: i64,

        #[arg(long, default_value = "2")]
        depth: usize,
    },

    /// Search or list items
    Items {
        partition_id: i64,

        /// Case-insensitive name substring
        #[arg(long)]
        q: Option<String>,

        /// Only items under this node
        #[arg(long)]
        node: Option<i64>,

        /// Page size (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// One item with its field values
    Item { item_id: i64 },

    /// Row counts for a partition
    Stats { partition_id: i64 },
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Flatten {
            source,
            flat_out,
            array_out,
        } => flatten(&source, flat_out.as_deref(), array_out.as_deref()),

        Commands::InitPartition { name, host, title } => {
            if config.partition(&name).is_err() {
                tracing::warn!("Partition '{}' has no rank configuration yet", name);
            }
            let store = open_store(&config, cli.db.as_deref())?;
            let partition = store.create_partition(&NewPartition { name, host, title })?;
            print_json(&partition)
        }

        Commands::Import {
            source,
            partition_id,
        } => {
            let tree = SourceTree::from_json_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let store = open_store(&config, cli.db.as_deref())?;
            let summary = ImportPipeline::new(&store, &config).run(&tree, partition_id)?;
            print_json(&summary)
        }

        Commands::Collections {
            partition_id,
            depth,
        } => {
            let store = open_store(&config, cli.db.as_deref())?;
            let cache = MokaResultCache::from_settings(&config.cache);
            let registry = prometheus::Registry::new();
            let metrics = Arc::new(CacheMetrics::new(&registry)?);
            let catalog = CachedCatalog::new(
                HierarchyReader::new(&store, &config),
                &cache,
                config.cache.ttl(),
            )
            .with_metrics(Arc::clone(&metrics));
            let trees = catalog.list_collections(partition_id, depth)?;
            tracing::debug!("Cache hit rate {:.2}", metrics.hit_rate());
            print_json(&trees)
        }

        Commands::Items {
            partition_id,
            q,
            node,
            limit,
            offset,
        } => {
            let store = open_store(&config, cli.db.as_deref())?;
            let search = ItemSearch { q, node_id: node };
            let page = Page::new(limit.unwrap_or(config.default_page_size), offset);
            let listing =
                HierarchyReader::new(&store, &config).list_items(partition_id, &search, page)?;
            print_json(&listing)
        }

        Commands::Item { item_id } => {
            let store = open_store(&config, cli.db.as_deref())?;
            print_json(&HierarchyReader::new(&store, &config).item_detail(item_id)?)
        }

        Commands::Stats { partition_id } => {
            let store = open_store(&config, cli.db.as_deref())?;
            if store.get_partition(partition_id)?.is_none() {
                bail!("partition {} does not exist", partition_id);
            }
            print_json(&store.stats(partition_id)?)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CatalogConfig> {
    match path {
        Some(path) => CatalogConfig::from_yaml(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(CatalogConfig::default()),
    }
}

fn open_store(config: &CatalogConfig, db: Option<&Path>) -> Result<SqliteCatalogStore> {
    let Some(path) = db.or(config.database.as_deref()) else {
        bail!("no database given; pass --db or set `database` in the config");
    };
    SqliteCatalogStore::new(path).with_context(|| format!("opening {}", path.display()))
}

fn flatten(source: &Path, flat_out: Option<&Path>, array_out: Option<&Path>) -> Result<()> {
    let tree = SourceTree::from_json_file(source)
        .with_context(|| format!("reading {}", source.display()))?;

    if let Some(path) = flat_out {
        write_json(path, &to_flat_paths(&tree))?;
        tracing::info!("Wrote flat paths to {}", path.display());
    }
    if let Some(path) = array_out {
        write_json(path, &to_array(&tree))?;
        tracing::info!("Wrote array view to {}", path.display());
    }
    print_json(&hierarchy_stats(&tree))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
