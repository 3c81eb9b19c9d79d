//! A store wrapper that fails writes on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use catalog::CatalogVersion;
use protogen::catalog::EntityStatus;

use crate::build::Build;
use crate::snapshot::CatalogSnapshot;
use crate::storage::{CatalogStore, Result, StorageError};

#[derive(Debug)]
pub(crate) struct FlakyStore {
    inner: Arc<dyn CatalogStore>,
    pub fail_snapshot_writes: AtomicBool,
    pub fail_build_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub build_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn CatalogStore>) -> FlakyStore {
        FlakyStore {
            inner,
            fail_snapshot_writes: AtomicBool::new(false),
            fail_build_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            build_writes: AtomicUsize::new(0),
        }
    }

    pub fn set(flag: &AtomicBool, fail: bool) {
        flag.store(fail, Ordering::SeqCst);
    }

    pub fn build_write_count(&self) -> usize {
        self.build_writes.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::ObjectStore(object_store::Error::Generic {
                store: "flaky",
                source: format!("injected {what} failure").into(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn list_catalog_names(&self) -> Result<Vec<String>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.list_catalog_names().await
    }

    async fn latest_version(&self, catalog: &str) -> Result<Option<CatalogVersion>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.latest_version(catalog).await
    }

    async fn read_snapshot(
        &self,
        catalog: &str,
        version: CatalogVersion,
    ) -> Result<CatalogSnapshot> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.read_snapshot(catalog, version).await
    }

    async fn write_snapshot(
        &self,
        old: Option<&CatalogSnapshot>,
        new: &CatalogSnapshot,
    ) -> Result<()> {
        Self::check(&self.fail_snapshot_writes, "snapshot write")?;
        self.inner.write_snapshot(old, new).await
    }

    async fn read_builds(&self, catalog: &str) -> Result<Vec<Build>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.read_builds(catalog).await
    }

    async fn write_builds(&self, catalog: &str, builds: &[Build]) -> Result<()> {
        Self::check(&self.fail_build_writes, "build write")?;
        self.build_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_builds(catalog, builds).await
    }

    async fn update_catalog_status(
        &self,
        snapshot: &CatalogSnapshot,
        status: EntityStatus,
    ) -> Result<()> {
        Self::check(&self.fail_snapshot_writes, "status write")?;
        self.inner.update_catalog_status(snapshot, status).await
    }
}
