//! Catalog transactions.
//!
//! Every catalog mutation runs through [`TransactionCoordinator::run`]:
//!
//! 1. Check the precondition against the current snapshot.
//! 2. Clone the current tree, or start from an empty one.
//! 3. Apply the mutation to the clone.
//! 4. Stamp the next version on the clone.
//! 5. Durably write the clone.
//! 6. Publish it as the current snapshot.
//!
//! The snapshot write lock is held throughout, so transactions on a catalog
//! never interleave. Any failure before publishing discards the clone.
use std::cmp;
use std::sync::Arc;

use catalog::{Catalog, CatalogError, CatalogVersion};
use protogen::catalog::EntityStatus;
use tracing::{debug, warn};

use crate::errors::{MetastoreError, Result};
use crate::snapshot::{CatalogSnapshot, SnapshotManager};
use crate::storage::CatalogStore;

/// What must hold for the current snapshot before a transaction may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No snapshot exists yet. Used when creating the catalog.
    Absent,
    /// The caller observed this version, and it's still current.
    Version(i64),
}

/// How the result of a transaction is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write a new snapshot at the next version.
    Snapshot,
    /// Rewrite the status of the current snapshot, keeping its version.
    Status(EntityStatus),
}

/// Versions before and after a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// `INVALID` if the catalog didn't exist before.
    pub source: CatalogVersion,
    pub target: CatalogVersion,
}

#[derive(Debug)]
pub struct TransactionCoordinator {
    snapshots: Arc<SnapshotManager>,
    store: Arc<dyn CatalogStore>,
}

impl TransactionCoordinator {
    pub fn new(snapshots: Arc<SnapshotManager>, store: Arc<dyn CatalogStore>) -> Self {
        TransactionCoordinator { snapshots, store }
    }

    /// Run a transaction.
    pub async fn run<M>(
        &self,
        precondition: Precondition,
        mode: WriteMode,
        mutate: M,
    ) -> Result<CommitInfo>
    where
        M: FnOnce(&mut Catalog) -> Result<(), CatalogError>,
    {
        let catalog_name = self.snapshots.catalog_name();
        let mut current = self.snapshots.lock_for_write().await;

        check(catalog_name, precondition, current.as_deref())?;

        let mut working = match current.as_deref() {
            Some(snapshot) => snapshot.tree().clone(),
            None => Catalog::new(catalog_name),
        };
        mutate(&mut working)?;

        let source = current
            .as_deref()
            .map(|s| s.version())
            .unwrap_or(CatalogVersion::INVALID);

        let snapshot = match mode {
            WriteMode::Snapshot => {
                let target = self.next_version(current.as_deref()).await?;
                working.align_version(target);
                let snapshot = CatalogSnapshot::new(working);
                self.store
                    .write_snapshot(current.as_deref(), &snapshot)
                    .await?;
                snapshot
            }
            WriteMode::Status(status) => {
                let Some(old) = current.as_deref() else {
                    return Err(MetastoreError::MissingCatalog(catalog_name.to_string()));
                };
                working.align_version(old.version());
                let snapshot = CatalogSnapshot::new(working);
                self.store
                    .update_catalog_status(&snapshot, status)
                    .await?;
                snapshot
            }
        };

        let info = CommitInfo {
            source,
            target: snapshot.version(),
        };
        debug!(catalog = %catalog_name, source = %info.source, target = %info.target, "committed catalog transaction");

        *current = Some(Arc::new(snapshot));

        Ok(info)
    }

    /// Pick the version for the next snapshot.
    ///
    /// The store may be ahead of memory if another process wrote to it or a
    /// previous write landed without being published. Versions are never
    /// reused in either case.
    async fn next_version(&self, current: Option<&CatalogSnapshot>) -> Result<CatalogVersion> {
        let catalog_name = self.snapshots.catalog_name();
        let stored = self.store.latest_version(catalog_name).await?;

        let next = match (current, stored) {
            (Some(current), Some(stored)) => {
                if stored > current.version() {
                    warn!(catalog = %catalog_name, current = %current.version(), %stored, "stored catalog version ahead of memory");
                }
                cmp::max(current.version().next(), stored.next())
            }
            (Some(current), None) => current.version().next(),
            (None, Some(stored)) => stored.next(),
            (None, None) => CatalogVersion::INITIAL,
        };

        Ok(next)
    }
}

fn check(
    catalog_name: &str,
    precondition: Precondition,
    current: Option<&CatalogSnapshot>,
) -> Result<()> {
    match (precondition, current) {
        (Precondition::Absent, None) => Ok(()),
        (Precondition::Absent, Some(_)) => {
            Err(MetastoreError::CatalogAlreadyExists(catalog_name.to_string()))
        }
        (Precondition::Version(_), None) => {
            Err(MetastoreError::MissingCatalog(catalog_name.to_string()))
        }
        (Precondition::Version(have), Some(current)) => {
            if have != current.version().get() {
                return Err(MetastoreError::VersionExpired {
                    have: CatalogVersion::new(have),
                    need: current.version(),
                });
            }
            Ok(())
        }
    }
}
