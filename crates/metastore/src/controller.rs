use std::sync::Arc;

use catalog::{Catalog, CatalogError, CatalogVersion};

use crate::build::{BuildRegistry, GenerationSource};
use crate::build_config::BuildConfigGenerator;
use crate::config::MetastoreConfig;
use crate::errors::{MetastoreError, Result};
use crate::reconciler::{BuildReconciler, ReconcileStats};
use crate::snapshot::{CatalogSnapshot, SnapshotManager};
use crate::storage::CatalogStore;
use crate::transaction::{CommitInfo, Precondition, TransactionCoordinator, WriteMode};

/// Everything the metastore keeps for a single catalog.
#[derive(Debug)]
pub struct CatalogController {
    snapshots: Arc<SnapshotManager>,
    txns: TransactionCoordinator,
    builds: Arc<BuildRegistry>,
    reconciler: BuildReconciler,
}

impl CatalogController {
    pub fn new(
        catalog_name: &str,
        store: Arc<dyn CatalogStore>,
        config: &MetastoreConfig,
        generator: Arc<dyn BuildConfigGenerator>,
        generation: Option<GenerationSource>,
    ) -> CatalogController {
        let snapshots = Arc::new(SnapshotManager::new(catalog_name, store.clone()));
        let txns = TransactionCoordinator::new(snapshots.clone(), store.clone());

        let mut builds = BuildRegistry::new(catalog_name, store, generator);
        if let Some(generation) = generation {
            builds = builds.with_generation_source(generation);
        }
        let builds = Arc::new(builds);

        let reconciler = BuildReconciler::new(snapshots.clone(), builds.clone(), &config.store_root);

        CatalogController {
            snapshots,
            txns,
            builds,
            reconciler,
        }
    }

    pub fn catalog_name(&self) -> &str {
        self.snapshots.catalog_name()
    }

    /// Load persisted state. Must complete before the catalog serves
    /// requests.
    pub async fn recover(&self) -> Result<()> {
        self.snapshots.recover(&self.builds).await
    }

    /// If the catalog has been created.
    pub async fn exists(&self) -> bool {
        self.snapshots.current_snapshot().await.is_some()
    }

    /// Get the snapshot a read at `version` should be served from.
    ///
    /// Non-positive versions read the current snapshot.
    pub async fn read(&self, version: i64) -> Result<Arc<CatalogSnapshot>> {
        match self.snapshots.resolve(version).await? {
            Some(snapshot) => Ok(snapshot),
            None if version <= 0 => Err(MetastoreError::MissingCatalog(
                self.catalog_name().to_string(),
            )),
            None => Err(MetastoreError::MissingCatalogVersion {
                catalog: self.catalog_name().to_string(),
                version: CatalogVersion::new(version),
            }),
        }
    }

    pub async fn transact<M>(
        &self,
        precondition: Precondition,
        mode: WriteMode,
        mutate: M,
    ) -> Result<CommitInfo>
    where
        M: FnOnce(&mut Catalog) -> Result<(), CatalogError>,
    {
        self.txns.run(precondition, mode, mutate).await
    }

    pub fn builds(&self) -> &BuildRegistry {
        &self.builds
    }

    pub async fn reconcile(&self) -> ReconcileStats {
        self.reconciler.reconcile().await
    }
}
