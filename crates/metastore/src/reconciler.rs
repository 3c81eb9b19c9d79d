//! Reconciles the partitions of a catalog with its build records.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::AddAssign;
use std::sync::Arc;

use catalog::{PartitionBuildInfo, PartitionId, PartitionMarker};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::build::{BuildId, BuildRegistry};
use crate::errors::Result;
use crate::snapshot::SnapshotManager;

/// Counts of what a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub dropped: usize,
    /// Partitions unchanged since the previous pass.
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileStats {
    /// Number of calls made against the build registry.
    pub fn actions(&self) -> usize {
        self.created + self.updated + self.dropped + self.failed
    }
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.dropped += rhs.dropped;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// What the previous pass saw for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observed {
    marker: PartitionMarker,
    /// False if the action for this partition failed. Unsynced partitions
    /// are processed again regardless of their marker.
    synced: bool,
}

#[derive(Debug)]
enum Action {
    Created(BuildId),
    Updated(BuildId),
    Dropped(usize),
    Nothing,
}

/// Diffs the current catalog against the previous pass and issues create,
/// update and drop calls on the build registry.
#[derive(Debug)]
pub struct BuildReconciler {
    snapshots: Arc<SnapshotManager>,
    builds: Arc<BuildRegistry>,
    store_root: String,
    /// Held for the duration of a pass so passes never overlap.
    pass: tokio::sync::Mutex<()>,
    last: Mutex<BTreeMap<PartitionId, Observed>>,
}

impl BuildReconciler {
    pub fn new(
        snapshots: Arc<SnapshotManager>,
        builds: Arc<BuildRegistry>,
        store_root: impl Into<String>,
    ) -> Self {
        BuildReconciler {
            snapshots,
            builds,
            store_root: store_root.into(),
            pass: tokio::sync::Mutex::new(()),
            last: Mutex::new(BTreeMap::new()),
        }
    }

    /// Run a single reconciliation pass.
    ///
    /// Failing actions are logged and retried on the next pass. A catalog that
    /// hasn't been created or recovered yet is skipped.
    pub async fn reconcile(&self) -> ReconcileStats {
        let _pass = self.pass.lock().await;
        let catalog_name = self.snapshots.catalog_name();

        let snapshot = match self.snapshots.current_snapshot().await {
            Some(snapshot) => snapshot,
            None => {
                debug!(catalog = %catalog_name, "catalog not available, skipping reconcile");
                return ReconcileStats::default();
            }
        };

        let partitions: BTreeMap<PartitionId, PartitionBuildInfo> = snapshot
            .tree()
            .partition_build_infos()
            .into_iter()
            .map(|info| (info.id.clone(), info))
            .collect();

        // Latest generation of every partition with a build.
        let mut generations: HashMap<PartitionId, u64> = HashMap::new();
        for build in self.builds.list(&BuildId::for_catalog(catalog_name)).await {
            let generation = generations.entry(build.id.partition_id()).or_default();
            *generation = (*generation).max(build.id.generation_id);
        }

        let previous = self.last.lock().clone();
        let mut observed = BTreeMap::new();
        let mut stats = ReconcileStats::default();

        for (id, partition) in &partitions {
            if let Some(prev) = previous.get(id) {
                if prev.synced && prev.marker == partition.marker {
                    stats.skipped += 1;
                    observed.insert(id.clone(), *prev);
                    continue;
                }
            }

            let result = self
                .sync_partition(partition, generations.get(id).copied())
                .await;
            let synced = Self::record(&mut stats, id, result);
            observed.insert(
                id.clone(),
                Observed {
                    marker: partition.marker,
                    synced,
                },
            );
        }

        // Partitions that went away, either since the previous pass or while
        // no reconciler was running. The latter only show up in the registry.
        let vanished: BTreeSet<&PartitionId> = previous
            .keys()
            .chain(generations.keys())
            .filter(|id| !partitions.contains_key(*id))
            .collect();

        for id in vanished {
            let result = self
                .builds
                .drop_matching(&BuildId::from_partition(id, 0))
                .await
                .map(Action::Dropped);
            let synced = Self::record(&mut stats, id, result);
            match previous.get(id) {
                // Keep it around so the drop is retried.
                Some(prev) if !synced => {
                    observed.insert(
                        id.clone(),
                        Observed {
                            marker: prev.marker,
                            synced: false,
                        },
                    );
                }
                _ => (),
            }
        }

        *self.last.lock() = observed;

        if stats.actions() > 0 {
            info!(
                catalog = %catalog_name,
                version = %snapshot.version(),
                created = stats.created,
                updated = stats.updated,
                dropped = stats.dropped,
                failed = stats.failed,
                "reconciled builds"
            );
        }

        stats
    }

    async fn sync_partition(
        &self,
        partition: &PartitionBuildInfo,
        generation: Option<u64>,
    ) -> Result<Action> {
        match generation {
            None if partition.is_build_eligible() => {
                let id = self.builds.create(partition, &self.store_root).await?;
                Ok(Action::Created(id))
            }
            None => Ok(Action::Nothing),
            Some(_) if !partition.is_build_eligible() => {
                let dropped = self
                    .builds
                    .drop_matching(&BuildId::from_partition(&partition.id, 0))
                    .await?;
                Ok(Action::Dropped(dropped))
            }
            Some(generation) => {
                let id = BuildId::from_partition(&partition.id, generation);
                self.builds
                    .retarget(&id, partition, &self.store_root)
                    .await?;
                Ok(Action::Updated(id))
            }
        }
    }

    /// Record the outcome of an action, returning if it succeeded.
    fn record(stats: &mut ReconcileStats, partition: &PartitionId, result: Result<Action>) -> bool {
        match result {
            Ok(action) => {
                match action {
                    Action::Created(id) => {
                        info!(%partition, build = %id, "created build for partition");
                        stats.created += 1;
                    }
                    Action::Updated(id) => {
                        info!(%partition, build = %id, "updated build for partition");
                        stats.updated += 1;
                    }
                    Action::Dropped(n) => {
                        info!(%partition, dropped = n, "dropped builds for partition");
                        stats.dropped += n;
                    }
                    Action::Nothing => (),
                }
                true
            }
            Err(e) => {
                error!(%e, %partition, "failed to reconcile partition");
                stats.failed += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use catalog::{Catalog, CatalogError, TableKey};
    use object_store::memory::InMemory;
    use protogen::build::BuildState;
    use protogen::catalog::{self as proto, BuildType};
    use uuid::Uuid;

    use super::*;
    use crate::build::GenerationSource;
    use crate::build_config::DefaultConfigGenerator;
    use crate::storage::flaky::FlakyStore;
    use crate::storage::persist::Storage;
    use crate::transaction::{Precondition, TransactionCoordinator, WriteMode};

    struct Harness {
        store: Arc<FlakyStore>,
        snapshots: Arc<SnapshotManager>,
        txns: TransactionCoordinator,
        builds: Arc<BuildRegistry>,
        reconciler: BuildReconciler,
    }

    impl Harness {
        async fn transact<M>(&self, mutate: M)
        where
            M: FnOnce(&mut Catalog) -> Result<(), CatalogError>,
        {
            let precondition = match self.snapshots.current_snapshot().await {
                Some(s) => Precondition::Version(s.version().get()),
                None => Precondition::Absent,
            };
            self.txns
                .run(precondition, WriteMode::Snapshot, mutate)
                .await
                .unwrap();
        }

        async fn all_builds(&self) -> Vec<crate::build::Build> {
            self.builds.list(&BuildId::for_catalog("ct1")).await
        }
    }

    fn generations() -> GenerationSource {
        let next = Arc::new(std::sync::atomic::AtomicU64::new(1000));
        Arc::new(move || next.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
    }

    fn harness() -> Harness {
        logutil::init_test();
        let storage = Storage::new(Uuid::new_v4(), Arc::new(InMemory::new()));
        let store = Arc::new(FlakyStore::new(Arc::new(storage)));
        let snapshots = Arc::new(SnapshotManager::new("ct1", store.clone()));
        let txns = TransactionCoordinator::new(snapshots.clone(), store.clone());
        let builds = Arc::new(
            BuildRegistry::new("ct1", store.clone(), Arc::new(DefaultConfigGenerator))
                .with_generation_source(generations()),
        );
        let reconciler = BuildReconciler::new(snapshots.clone(), builds.clone(), "/store");
        Harness {
            store,
            snapshots,
            txns,
            builds,
            reconciler,
        }
    }

    fn table(build_type: BuildType) -> proto::Table {
        proto::Table {
            catalog_name: "ct1".to_string(),
            database_name: "db1".to_string(),
            table_name: "tb1".to_string(),
            table_structure: Some(proto::TableStructure {
                columns: vec![proto::Column {
                    name: "id".to_string(),
                    column_type: "INT64".to_string(),
                    ..Default::default()
                }],
                build_type: build_type as i32,
                shard_count: 1,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn partition(name: &str, data_source: &str) -> proto::Partition {
        proto::Partition {
            catalog_name: "ct1".to_string(),
            database_name: "db1".to_string(),
            table_name: "tb1".to_string(),
            partition_name: name.to_string(),
            data_source: data_source.to_string(),
            ..Default::default()
        }
    }

    /// ct1 (v0) -> db1 (v1) -> tb1 (v2) -> part1 (v3).
    async fn populate(h: &Harness, build_type: BuildType) {
        h.transact(|tree| {
            tree.create_catalog(proto::Catalog {
                catalog_name: "ct1".to_string(),
                ..Default::default()
            })
        })
        .await;
        h.transact(|tree| {
            tree.create_database(proto::Database {
                catalog_name: "ct1".to_string(),
                database_name: "db1".to_string(),
                ..Default::default()
            })
        })
        .await;
        h.transact(|tree| tree.create_table(table(build_type))).await;
        h.transact(|tree| tree.create_partition(partition("part1", "swift://a")))
            .await;
    }

    #[tokio::test]
    async fn skip_when_catalog_missing() {
        let h = harness();
        assert_eq!(ReconcileStats::default(), h.reconciler.reconcile().await);
    }

    #[tokio::test]
    async fn example_scenario() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        assert_eq!(
            3,
            h.snapshots.current_snapshot().await.unwrap().version().get()
        );

        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.created);

        let builds = h.all_builds().await;
        assert_eq!(1, builds.len());
        let build = &builds[0];
        assert_eq!(
            PartitionId::new("ct1", "db1", "tb1", "part1"),
            build.id.partition_id()
        );
        assert_ne!(0, build.id.generation_id);
        assert_eq!(BuildState::Running, build.target.build_state);

        h.transact(|tree| tree.drop_partition(&PartitionId::new("ct1", "db1", "tb1", "part1")))
            .await;
        assert_eq!(
            4,
            h.snapshots.current_snapshot().await.unwrap().version().get()
        );

        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.dropped);
        assert!(h.all_builds().await.is_empty());
    }

    #[tokio::test]
    async fn unchanged_partitions_are_skipped() {
        let h = harness();
        populate(&h, BuildType::Offline).await;

        let first = h.reconciler.reconcile().await;
        assert_eq!(1, first.actions());
        let writes = h.store.build_write_count();

        let second = h.reconciler.reconcile().await;
        assert_eq!(0, second.actions());
        assert_eq!(1, second.skipped);
        assert_eq!(writes, h.store.build_write_count());
    }

    #[tokio::test]
    async fn ineligible_partitions_get_no_build() {
        let h = harness();
        populate(&h, BuildType::Direct).await;

        let stats = h.reconciler.reconcile().await;
        assert_eq!(0, stats.actions());
        assert!(h.all_builds().await.is_empty());
    }

    #[tokio::test]
    async fn build_type_change_drops_build() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;
        assert_eq!(1, h.all_builds().await.len());

        let mut structure = table(BuildType::Direct).table_structure.unwrap();
        structure.catalog_name = "ct1".to_string();
        structure.database_name = "db1".to_string();
        structure.table_name = "tb1".to_string();
        h.transact(|tree| tree.update_table_structure(structure)).await;

        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.dropped);
        assert!(h.all_builds().await.is_empty());
    }

    #[tokio::test]
    async fn partition_change_retargets_build() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;
        let before = h.all_builds().await.remove(0);

        h.transact(|tree| tree.update_partition(partition("part1", "swift://b")))
            .await;

        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.updated);

        let after = h.all_builds().await;
        assert_eq!(1, after.len());
        assert_eq!(before.id, after[0].id);
        assert_ne!(before.target.config_path, after[0].target.config_path);
        assert!(
            after[0].target.config_path.ends_with("/config/4_2"),
            "{}",
            after[0].target.config_path
        );
    }

    #[tokio::test]
    async fn failed_actions_are_retried() {
        let h = harness();
        populate(&h, BuildType::Offline).await;

        FlakyStore::set(&h.store.fail_build_writes, true);
        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.failed);
        assert!(h.all_builds().await.is_empty());

        FlakyStore::set(&h.store.fail_build_writes, false);
        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.created);
        assert_eq!(1, h.all_builds().await.len());
    }

    #[tokio::test]
    async fn failed_drop_of_vanished_partition_is_retried() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;

        h.transact(|tree| tree.drop_table(&TableKey::new("ct1", "db1", "tb1")))
            .await;

        FlakyStore::set(&h.store.fail_build_writes, true);
        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.failed);
        assert_eq!(1, h.all_builds().await.len());

        FlakyStore::set(&h.store.fail_build_writes, false);
        let stats = h.reconciler.reconcile().await;
        assert_eq!(1, stats.dropped);
        assert!(h.all_builds().await.is_empty());

        // Nothing left to do.
        assert_eq!(0, h.reconciler.reconcile().await.actions());
    }

    #[tokio::test]
    async fn first_pass_after_restart_adopts_existing_builds() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;
        let before = h.all_builds().await;

        // A fresh reconciler has no memory of previous passes.
        let reconciler = BuildReconciler::new(h.snapshots.clone(), h.builds.clone(), "/store");
        let stats = reconciler.reconcile().await;
        assert_eq!(0, stats.created);
        assert_eq!(1, stats.updated);
        assert_eq!(before, h.all_builds().await);
    }

    #[tokio::test]
    async fn partition_dropped_before_restart_loses_its_build() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;
        assert_eq!(1, h.all_builds().await.len());

        h.transact(|tree| tree.drop_partition(&PartitionId::new("ct1", "db1", "tb1", "part1")))
            .await;

        // Restart before the drop is reconciled.
        let reconciler = BuildReconciler::new(h.snapshots.clone(), h.builds.clone(), "/store");
        let stats = reconciler.reconcile().await;
        assert_eq!(1, stats.dropped);
        assert!(h.all_builds().await.is_empty());

        assert_eq!(0, reconciler.reconcile().await.actions());
    }

    #[tokio::test]
    async fn failed_drop_after_restart_is_retried() {
        let h = harness();
        populate(&h, BuildType::Offline).await;
        h.reconciler.reconcile().await;

        h.transact(|tree| tree.drop_partition(&PartitionId::new("ct1", "db1", "tb1", "part1")))
            .await;
        let reconciler = BuildReconciler::new(h.snapshots.clone(), h.builds.clone(), "/store");

        FlakyStore::set(&h.store.fail_build_writes, true);
        assert_eq!(1, reconciler.reconcile().await.failed);
        assert_eq!(1, h.all_builds().await.len());

        FlakyStore::set(&h.store.fail_build_writes, false);
        assert_eq!(1, reconciler.reconcile().await.dropped);
        assert!(h.all_builds().await.is_empty());
    }
}
