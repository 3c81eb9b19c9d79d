use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use metastore::config::{DEFAULT_STORE_ROOT, MetastoreConfig};

#[derive(Debug, Parser)]
#[clap(name = "catalogd")]
#[clap(version)]
#[clap(about = "Versioned catalog metastore and build reconciler", long_about = None)]
pub struct Cli {
    /// Default log level. `RUST_LOG` directives are applied on top.
    #[clap(long, global = true, default_value_t = tracing::Level::INFO)]
    pub log_level: tracing::Level,

    /// Output logs in json format.
    #[clap(long, global = true)]
    pub log_json: bool,

    #[clap(flatten)]
    pub store: StoreArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Directory for persisting catalogs and builds.
    ///
    /// If omitted, everything is kept in memory and lost on exit.
    #[clap(short = 'f', long, global = true, env = "CATALOGD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Root under which index data and build configs are placed.
    #[clap(long, global = true, env = "CATALOGD_STORE_ROOT", default_value = DEFAULT_STORE_ROOT)]
    pub store_root: String,

    /// Milliseconds between reconciliation passes.
    #[clap(long, global = true, default_value_t = 2000)]
    pub reconcile_interval_ms: u64,
}

impl StoreArgs {
    pub fn metastore_config(&self) -> MetastoreConfig {
        MetastoreConfig {
            store_root: self.store_root.clone(),
            reconcile_interval: Duration::from_millis(self.reconcile_interval_ms),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recover all catalogs and keep reconciling builds until interrupted.
    Server,
    /// Print the persisted catalogs and their builds as json.
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Only print this catalog.
    #[clap(long)]
    pub catalog: Option<String>,

    /// Catalog version to print. The latest version if omitted.
    #[clap(long)]
    pub at_version: Option<i64>,
}
