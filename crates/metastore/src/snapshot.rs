//! Published catalog snapshots.
use std::sync::Arc;

use catalog::{Catalog, CatalogError, CatalogVersion, DetailLevel};
use protogen::catalog::{self as proto, EntityStatus};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::build::BuildRegistry;
use crate::errors::Result;
use crate::storage::CatalogStore;

/// An immutable catalog tree paired with the version it was published at.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    tree: Catalog,
}

impl CatalogSnapshot {
    /// Wrap a tree whose versions have already been aligned.
    pub fn new(tree: Catalog) -> CatalogSnapshot {
        CatalogSnapshot { tree }
    }

    pub fn from_proto(proto: proto::Catalog) -> Result<CatalogSnapshot, CatalogError> {
        Ok(CatalogSnapshot {
            tree: Catalog::from_proto(proto)?,
        })
    }

    /// The persisted form. Always the full tree.
    pub fn to_proto(&self) -> proto::Catalog {
        self.tree.to_proto(DetailLevel::Detailed)
    }

    pub fn version(&self) -> CatalogVersion {
        self.tree.version
    }

    pub fn catalog_name(&self) -> &str {
        &self.tree.name
    }

    pub fn status(&self) -> EntityStatus {
        self.tree.status
    }

    pub fn tree(&self) -> &Catalog {
        &self.tree
    }
}

pub(crate) type CurrentSnapshot = Option<Arc<CatalogSnapshot>>;

/// Owns the current snapshot of a single catalog.
#[derive(Debug)]
pub struct SnapshotManager {
    catalog_name: String,
    store: Arc<dyn CatalogStore>,
    current: RwLock<CurrentSnapshot>,
}

impl SnapshotManager {
    pub fn new(catalog_name: impl Into<String>, store: Arc<dyn CatalogStore>) -> SnapshotManager {
        SnapshotManager {
            catalog_name: catalog_name.into(),
            store,
            current: RwLock::new(None),
        }
    }

    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    /// Load the latest snapshot and the build list from storage.
    ///
    /// A catalog without any stored version hasn't been created yet, which is
    /// not an error. The snapshot is published only once everything else was
    /// loaded, so a concurrent reader either sees no snapshot or a complete
    /// one.
    pub async fn recover(&self, builds: &BuildRegistry) -> Result<()> {
        let latest = match self.store.latest_version(&self.catalog_name).await? {
            Some(version) => version,
            None => {
                debug!(catalog = %self.catalog_name, "no stored version, catalog not created");
                return Ok(());
            }
        };

        let snapshot = self.store.read_snapshot(&self.catalog_name, latest).await?;
        builds.recover().await?;

        info!(catalog = %self.catalog_name, version = %latest, "recovered catalog");
        *self.current.write().await = Some(Arc::new(snapshot));

        Ok(())
    }

    pub async fn current_snapshot(&self) -> CurrentSnapshot {
        self.current.read().await.clone()
    }

    /// Get the snapshot at `version`.
    ///
    /// Non-positive versions and the current version resolve to the current
    /// snapshot. Anything else is read from storage. Returns `None` if the
    /// version doesn't exist.
    pub async fn resolve(&self, version: i64) -> Result<CurrentSnapshot> {
        let current = self.current_snapshot().await;
        if version <= 0 {
            return Ok(current);
        }
        if let Some(snapshot) = &current {
            if snapshot.version().get() == version {
                return Ok(current);
            }
        }

        match self
            .store
            .read_snapshot(&self.catalog_name, CatalogVersion::new(version))
            .await
        {
            Ok(snapshot) => Ok(Some(Arc::new(snapshot))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lock the current snapshot for the duration of a transaction.
    pub(crate) async fn lock_for_write(&self) -> RwLockWriteGuard<'_, CurrentSnapshot> {
        self.current.write().await
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;
    use uuid::Uuid;

    use super::*;
    use crate::build_config::DefaultConfigGenerator;
    use crate::storage::persist::Storage;

    fn tree(version: i64, description: &str) -> Catalog {
        let mut tree = Catalog::new("ct1");
        tree.create_catalog(proto::Catalog {
            catalog_name: "ct1".to_string(),
            description: description.to_string(),
            ..Default::default()
        })
        .unwrap();
        tree.align_version(CatalogVersion::new(version));
        tree
    }

    fn setup() -> (Arc<dyn CatalogStore>, SnapshotManager, BuildRegistry) {
        logutil::init_test();
        let store: Arc<dyn CatalogStore> =
            Arc::new(Storage::new(Uuid::new_v4(), Arc::new(InMemory::new())));
        let snapshots = SnapshotManager::new("ct1", store.clone());
        let builds = BuildRegistry::new("ct1", store.clone(), Arc::new(DefaultConfigGenerator));
        (store, snapshots, builds)
    }

    #[tokio::test]
    async fn recover_uncreated_catalog() {
        let (_store, snapshots, builds) = setup();
        snapshots.recover(&builds).await.unwrap();
        assert!(snapshots.current_snapshot().await.is_none());
        assert!(snapshots.resolve(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recover_latest_and_resolve_history() {
        let (store, snapshots, builds) = setup();

        let v0 = CatalogSnapshot::new(tree(0, "first"));
        let v1 = CatalogSnapshot::new(tree(1, "second"));
        store.write_snapshot(None, &v0).await.unwrap();
        store.write_snapshot(Some(&v0), &v1).await.unwrap();

        snapshots.recover(&builds).await.unwrap();
        let current = snapshots.current_snapshot().await.unwrap();
        assert_eq!(v1, *current);

        // Current version and non-positive versions.
        assert_eq!(v1, *snapshots.resolve(1).await.unwrap().unwrap());
        assert_eq!(v1, *snapshots.resolve(-1).await.unwrap().unwrap());
        assert_eq!(v1, *snapshots.resolve(0).await.unwrap().unwrap());

        // Missing version.
        assert!(snapshots.resolve(5).await.unwrap().is_none());
    }
}
