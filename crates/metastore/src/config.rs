use std::time::Duration;

pub const DEFAULT_STORE_ROOT: &str = "/tmp/catalog_store";
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration for the metastore service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetastoreConfig {
    /// Root under which index data and generated build configs are placed.
    pub store_root: String,
    /// How often open catalogs are reconciled against their builds.
    pub reconcile_interval: Duration,
}

impl Default for MetastoreConfig {
    fn default() -> Self {
        MetastoreConfig {
            store_root: DEFAULT_STORE_ROOT.to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}
