//! Build records and the registry tracking them.
//!
//! Every offline built partition has a build record describing the index
//! build that should be running for it (`target`) and what the build worker
//! last reported (`current`). The registry of a catalog is persisted as a
//! whole on every change.
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use catalog::{PartitionBuildInfo, PartitionId};
use protogen::build::{self as proto, BuildState, BuildType};
use protogen::{FromOptionalField, ProtoConvError, enum_from_i32};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::build_config::BuildConfigGenerator;
use crate::errors::{MetastoreError, Result};
use crate::storage::CatalogStore;

/// Identifies a single build of a partition.
///
/// Also used as a filter, see [`BuildId::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BuildId {
    pub catalog_name: String,
    pub database_name: String,
    pub table_name: String,
    pub partition_name: String,
    /// Distinguishes successive builds of the same partition. Zero means
    /// unset.
    pub generation_id: u64,
}

impl BuildId {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        partition_name: impl Into<String>,
        generation_id: u64,
    ) -> Self {
        BuildId {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            table_name: table_name.into(),
            partition_name: partition_name.into(),
            generation_id,
        }
    }

    /// Filter matching every build of a catalog.
    pub fn for_catalog(catalog_name: impl Into<String>) -> Self {
        BuildId {
            catalog_name: catalog_name.into(),
            ..Default::default()
        }
    }

    pub fn from_partition(id: &PartitionId, generation_id: u64) -> Self {
        BuildId::new(
            &id.catalog_name,
            &id.database_name,
            &id.table_name,
            &id.partition_name,
            generation_id,
        )
    }

    pub fn partition_id(&self) -> PartitionId {
        PartitionId::new(
            &self.catalog_name,
            &self.database_name,
            &self.table_name,
            &self.partition_name,
        )
    }

    /// If every field is set.
    pub fn is_complete(&self) -> bool {
        !self.catalog_name.is_empty()
            && !self.database_name.is_empty()
            && !self.table_name.is_empty()
            && !self.partition_name.is_empty()
            && self.generation_id != 0
    }

    /// Check if `build` matches this id used as a filter.
    ///
    /// Fields are compared in order from catalog to generation. The first
    /// unset field matches anything, including every field after it. A
    /// generation on a filter without a partition name is ignored.
    pub fn matches(&self, build: &BuildId) -> bool {
        let names = [
            (&self.catalog_name, &build.catalog_name),
            (&self.database_name, &build.database_name),
            (&self.table_name, &build.table_name),
            (&self.partition_name, &build.partition_name),
        ];
        for (filter, value) in names {
            if filter.is_empty() {
                return true;
            }
            if filter != value {
                return false;
            }
        }
        self.generation_id == 0 || self.generation_id == build.generation_id
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}#{}",
            self.catalog_name,
            self.database_name,
            self.table_name,
            self.partition_name,
            self.generation_id
        )
    }
}

impl From<proto::BuildId> for BuildId {
    fn from(value: proto::BuildId) -> Self {
        BuildId {
            catalog_name: value.catalog_name,
            database_name: value.database_name,
            table_name: value.table_name,
            partition_name: value.partition_name,
            generation_id: value.generation_id,
        }
    }
}

impl From<BuildId> for proto::BuildId {
    fn from(value: BuildId) -> Self {
        proto::BuildId {
            catalog_name: value.catalog_name,
            database_name: value.database_name,
            table_name: value.table_name,
            partition_name: value.partition_name,
            generation_id: value.generation_id,
        }
    }
}

/// Desired state of a build.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BuildTarget {
    /// Set on creation, never changes afterwards.
    pub build_type: BuildType,
    pub build_state: BuildState,
    pub config_path: String,
}

impl TryFrom<proto::BuildTarget> for BuildTarget {
    type Error = ProtoConvError;
    fn try_from(value: proto::BuildTarget) -> Result<Self, Self::Error> {
        Ok(BuildTarget {
            build_type: enum_from_i32("BuildType", value.build_type)?,
            build_state: enum_from_i32("BuildState", value.build_state)?,
            config_path: value.config_path,
        })
    }
}

impl From<BuildTarget> for proto::BuildTarget {
    fn from(value: BuildTarget) -> Self {
        let mut out = proto::BuildTarget {
            config_path: value.config_path,
            ..Default::default()
        };
        out.set_build_type(value.build_type);
        out.set_build_state(value.build_state);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Shard {
    pub range_from: u32,
    pub range_to: u32,
    pub index_version: i64,
}

impl From<proto::Shard> for Shard {
    fn from(value: proto::Shard) -> Self {
        Shard {
            range_from: value.range_from,
            range_to: value.range_to,
            index_version: value.index_version,
        }
    }
}

impl From<Shard> for proto::Shard {
    fn from(value: Shard) -> Self {
        proto::Shard {
            range_from: value.range_from,
            range_to: value.range_to,
            index_version: value.index_version,
        }
    }
}

/// State of a build as reported by its worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BuildCurrent {
    pub build_state: BuildState,
    pub config_path: String,
    pub last_error: String,
    pub index_root: String,
    pub shards: Vec<Shard>,
}

impl TryFrom<proto::BuildCurrent> for BuildCurrent {
    type Error = ProtoConvError;
    fn try_from(value: proto::BuildCurrent) -> Result<Self, Self::Error> {
        Ok(BuildCurrent {
            build_state: enum_from_i32("BuildState", value.build_state)?,
            config_path: value.config_path,
            last_error: value.last_error,
            index_root: value.index_root,
            shards: value.shards.into_iter().map(Shard::from).collect(),
        })
    }
}

impl From<BuildCurrent> for proto::BuildCurrent {
    fn from(value: BuildCurrent) -> Self {
        let mut out = proto::BuildCurrent {
            config_path: value.config_path,
            last_error: value.last_error,
            index_root: value.index_root,
            shards: value.shards.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        out.set_build_state(value.build_state);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Build {
    pub id: BuildId,
    pub target: BuildTarget,
    pub current: BuildCurrent,
}

impl TryFrom<proto::Build> for Build {
    type Error = ProtoConvError;
    fn try_from(value: proto::Build) -> Result<Self, Self::Error> {
        let id = value
            .build_id
            .map(BuildId::from)
            .ok_or_else(|| ProtoConvError::RequiredField("build_id".to_string()))?;
        let current = match value.current {
            Some(current) => BuildCurrent::try_from(current)?,
            None => BuildCurrent::default(),
        };
        Ok(Build {
            id,
            target: value.target.required("target")?,
            current,
        })
    }
}

impl From<Build> for proto::Build {
    fn from(value: Build) -> Self {
        proto::Build {
            build_id: Some(value.id.into()),
            target: Some(value.target.into()),
            current: Some(value.current.into()),
        }
    }
}

/// Sparse update of a build's target. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPatch {
    pub build_type: Option<BuildType>,
    pub build_state: Option<BuildState>,
    pub config_path: Option<String>,
}

impl TargetPatch {
    fn apply(self, id: &BuildId, target: &mut BuildTarget) -> Result<()> {
        if let Some(build_type) = self.build_type {
            if build_type != target.build_type {
                return Err(MetastoreError::InvalidArguments(format!(
                    "build type of {id} cannot change from {} to {}",
                    target.build_type.as_str(),
                    build_type.as_str()
                )));
            }
        }
        if let Some(state) = self.build_state {
            target.build_state = state;
        }
        if let Some(path) = self.config_path {
            target.config_path = path;
        }
        Ok(())
    }
}

/// Default values in the wire form mean "leave unchanged".
impl TryFrom<proto::BuildTarget> for TargetPatch {
    type Error = ProtoConvError;
    fn try_from(value: proto::BuildTarget) -> Result<Self, Self::Error> {
        let build_type: BuildType = enum_from_i32("BuildType", value.build_type)?;
        let build_state: BuildState = enum_from_i32("BuildState", value.build_state)?;
        Ok(TargetPatch {
            build_type: (build_type != BuildType::Unspecified).then_some(build_type),
            build_state: (build_state != BuildState::Unspecified).then_some(build_state),
            config_path: non_empty(value.config_path),
        })
    }
}

/// Sparse update of a build's reported state. Shards are replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentPatch {
    pub build_state: Option<BuildState>,
    pub config_path: Option<String>,
    pub last_error: Option<String>,
    pub index_root: Option<String>,
    pub shards: Option<Vec<Shard>>,
}

impl CurrentPatch {
    fn apply(self, current: &mut BuildCurrent) {
        if let Some(state) = self.build_state {
            current.build_state = state;
        }
        if let Some(path) = self.config_path {
            current.config_path = path;
        }
        if let Some(err) = self.last_error {
            current.last_error = err;
        }
        if let Some(root) = self.index_root {
            current.index_root = root;
        }
        if let Some(shards) = self.shards {
            current.shards = shards;
        }
    }
}

impl TryFrom<proto::BuildCurrent> for CurrentPatch {
    type Error = ProtoConvError;
    fn try_from(value: proto::BuildCurrent) -> Result<Self, Self::Error> {
        let build_state: BuildState = enum_from_i32("BuildState", value.build_state)?;
        let shards = if value.shards.is_empty() {
            None
        } else {
            Some(value.shards.into_iter().map(Shard::from).collect())
        };
        Ok(CurrentPatch {
            build_state: (build_state != BuildState::Unspecified).then_some(build_state),
            config_path: non_empty(value.config_path),
            last_error: non_empty(value.last_error),
            index_root: non_empty(value.index_root),
            shards,
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Source of generation ids for new builds.
pub type GenerationSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Seconds since the unix epoch.
pub fn unix_seconds_generation() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Build records of a single catalog.
///
/// Every mutation persists the full updated list before it becomes visible
/// in memory. A failed write leaves the registry as it was.
pub struct BuildRegistry {
    catalog_name: String,
    store: Arc<dyn CatalogStore>,
    config: Arc<dyn BuildConfigGenerator>,
    generation: GenerationSource,
    builds: RwLock<Vec<Build>>,
}

impl fmt::Debug for BuildRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRegistry")
            .field("catalog_name", &self.catalog_name)
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BuildRegistry {
    pub fn new(
        catalog_name: impl Into<String>,
        store: Arc<dyn CatalogStore>,
        config: Arc<dyn BuildConfigGenerator>,
    ) -> BuildRegistry {
        BuildRegistry {
            catalog_name: catalog_name.into(),
            store,
            config,
            generation: Arc::new(unix_seconds_generation),
            builds: RwLock::new(Vec::new()),
        }
    }

    pub fn with_generation_source(mut self, generation: GenerationSource) -> Self {
        self.generation = generation;
        self
    }

    /// Replace the in-memory list with the stored one.
    pub async fn recover(&self) -> Result<()> {
        let stored = self.store.read_builds(&self.catalog_name).await?;
        debug!(catalog = %self.catalog_name, num_builds = stored.len(), "recovered builds");
        *self.builds.write().await = stored;
        Ok(())
    }

    /// List builds matching a filter.
    pub async fn list(&self, filter: &BuildId) -> Vec<Build> {
        let builds = self.builds.read().await;
        builds
            .iter()
            .filter(|b| filter.matches(&b.id))
            .cloned()
            .collect()
    }

    /// Like `list`, but the filter needs at least a catalog name, and a
    /// filter naming a partition needs to match something.
    pub async fn get(&self, filter: &BuildId) -> Result<Vec<Build>> {
        if filter.catalog_name.is_empty() {
            return Err(MetastoreError::InvalidArguments(
                "catalog name required to get builds".to_string(),
            ));
        }
        let builds = self.list(filter).await;
        if !filter.partition_name.is_empty() && builds.is_empty() {
            return Err(MetastoreError::MissingBuild(filter.clone()));
        }
        Ok(builds)
    }

    /// Create a new build for a partition.
    ///
    /// Fails with `BuildAlreadyExists` if the partition already has a build
    /// with the generation that was picked. The generation changes over time
    /// so retrying later will succeed.
    pub async fn create(&self, partition: &PartitionBuildInfo, store_root: &str) -> Result<BuildId> {
        if !partition.is_build_eligible() {
            return Err(MetastoreError::InvalidArguments(format!(
                "partition {} has build type '{}', only offline partitions are built",
                partition.id,
                partition.build_type.as_str()
            )));
        }
        if store_root.is_empty() {
            return Err(MetastoreError::InvalidArguments(
                "store root must not be empty".to_string(),
            ));
        }
        if partition.id.catalog_name != self.catalog_name {
            return Err(MetastoreError::InvalidArguments(format!(
                "partition {} does not belong to catalog '{}'",
                partition.id, self.catalog_name
            )));
        }

        let generation_id = (self.generation)();
        if generation_id == 0 {
            return Err(MetastoreError::Internal(
                "generation source produced a zero generation".to_string(),
            ));
        }

        let mut builds = self.builds.write().await;

        let id = BuildId::from_partition(&partition.id, generation_id);
        if builds.iter().any(|b| b.id == id) {
            return Err(MetastoreError::BuildAlreadyExists(id));
        }

        let config_path = self.config.generate(store_root, &id, partition)?;
        let build = Build {
            id: id.clone(),
            target: BuildTarget {
                build_type: partition.build_type,
                build_state: BuildState::Running,
                config_path,
            },
            current: BuildCurrent::default(),
        };

        let mut updated = builds.clone();
        updated.push(build);
        self.store.write_builds(&self.catalog_name, &updated).await?;
        *builds = updated;

        info!(build = %id, "created build");
        Ok(id)
    }

    /// Apply sparse patches to a single build.
    pub async fn update(&self, id: &BuildId, target: TargetPatch, current: CurrentPatch) -> Result<()> {
        if !id.is_complete() {
            return Err(MetastoreError::InvalidArguments(format!(
                "full build id required for update, got {id}"
            )));
        }

        let mut builds = self.builds.write().await;
        let idx = builds
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| MetastoreError::MissingBuild(id.clone()))?;

        let mut updated = builds.clone();
        let build = &mut updated[idx];
        target.apply(id, &mut build.target)?;
        current.apply(&mut build.current);

        self.store.write_builds(&self.catalog_name, &updated).await?;
        *builds = updated;

        debug!(build = %id, "updated build");
        Ok(())
    }

    /// Point an existing build at the latest definition of its partition.
    pub async fn retarget(
        &self,
        id: &BuildId,
        partition: &PartitionBuildInfo,
        store_root: &str,
    ) -> Result<()> {
        let config_path = self.config.generate(store_root, id, partition)?;
        self.update(
            id,
            TargetPatch {
                build_state: Some(BuildState::Running),
                config_path: Some(config_path),
                ..Default::default()
            },
            CurrentPatch::default(),
        )
        .await
    }

    /// Remove every build matching the filter, returning how many were
    /// removed.
    pub async fn drop_matching(&self, filter: &BuildId) -> Result<usize> {
        let mut builds = self.builds.write().await;

        let updated: Vec<_> = builds
            .iter()
            .filter(|b| !filter.matches(&b.id))
            .cloned()
            .collect();
        let dropped = builds.len() - updated.len();
        if dropped == 0 {
            return Ok(0);
        }

        self.store.write_builds(&self.catalog_name, &updated).await?;
        *builds = updated;

        info!(%filter, %dropped, "dropped builds");
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use catalog::{CatalogVersion, PartitionMarker};
    use object_store::memory::InMemory;
    use uuid::Uuid;

    use super::*;
    use crate::build_config::DefaultConfigGenerator;
    use crate::storage::flaky::FlakyStore;
    use crate::storage::persist::Storage;

    fn info(table: &str, partition: &str, build_type: BuildType) -> PartitionBuildInfo {
        PartitionBuildInfo {
            id: PartitionId::new("ct1", "db1", table, partition),
            build_type,
            marker: PartitionMarker {
                partition_version: CatalogVersion::new(3),
                structure_version: CatalogVersion::new(2),
            },
            shard_count: 1,
            data_source: String::new(),
            data_version: 0,
        }
    }

    fn counter() -> GenerationSource {
        let next = Arc::new(AtomicU64::new(1));
        Arc::new(move || next.fetch_add(1, Ordering::SeqCst))
    }

    fn registry() -> (Arc<FlakyStore>, BuildRegistry) {
        logutil::init_test();
        let storage = Storage::new(Uuid::new_v4(), Arc::new(InMemory::new()));
        let store = Arc::new(FlakyStore::new(Arc::new(storage)));
        let registry = BuildRegistry::new("ct1", store.clone(), Arc::new(DefaultConfigGenerator))
            .with_generation_source(counter());
        (store, registry)
    }

    #[test]
    fn hierarchical_matching() {
        let build = BuildId::new("ct1", "db1", "tb1", "part1", 5);

        assert!(BuildId::default().matches(&build));
        assert!(BuildId::for_catalog("ct1").matches(&build));
        assert!(!BuildId::for_catalog("ct2").matches(&build));
        assert!(BuildId::new("ct1", "db1", "", "", 0).matches(&build));
        assert!(!BuildId::new("ct1", "db2", "", "", 0).matches(&build));
        assert!(BuildId::new("ct1", "db1", "tb1", "", 0).matches(&build));
        assert!(BuildId::new("ct1", "db1", "tb1", "part1", 0).matches(&build));
        assert!(BuildId::new("ct1", "db1", "tb1", "part1", 5).matches(&build));
        assert!(!BuildId::new("ct1", "db1", "tb1", "part1", 6).matches(&build));

        // An empty field stops comparison, even with later fields set.
        assert!(BuildId::new("ct1", "", "other", "", 0).matches(&build));
        assert!(BuildId::new("ct1", "db1", "tb1", "", 99).matches(&build));
    }

    #[tokio::test]
    async fn create_and_list() {
        let (_store, registry) = registry();

        let id1 = registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();
        let id2 = registry
            .create(&info("tb1", "part2", BuildType::Offline), "/store")
            .await
            .unwrap();
        let id3 = registry
            .create(&info("tb2", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();
        assert_ne!(0, id1.generation_id);

        let all = registry.list(&BuildId::for_catalog("ct1")).await;
        assert_eq!(3, all.len());

        let tb1 = registry.list(&BuildId::new("ct1", "db1", "tb1", "", 0)).await;
        assert_eq!(vec![id1.clone(), id2], tb1.into_iter().map(|b| b.id).collect::<Vec<_>>());

        let part = registry.get(&id3).await.unwrap();
        assert_eq!(1, part.len());
        assert_eq!(BuildState::Running, part[0].target.build_state);
        assert_eq!(BuildType::Offline, part[0].target.build_type);
        assert_eq!(
            format!(
                "/store/ct1/db1/tb2/part1/generation_{}/config/3_2",
                id3.generation_id
            ),
            part[0].target.config_path
        );
    }

    #[tokio::test]
    async fn create_rejects_invalid_requests() {
        let (_store, registry) = registry();

        let err = registry
            .create(&info("tb1", "part1", BuildType::Direct), "/store")
            .await
            .unwrap_err();
        assert!(matches!(err, MetastoreError::InvalidArguments(_)), "{err}");

        let err = registry
            .create(&info("tb1", "part1", BuildType::Offline), "")
            .await
            .unwrap_err();
        assert!(matches!(err, MetastoreError::InvalidArguments(_)), "{err}");

        assert!(registry.list(&BuildId::default()).await.is_empty());
    }

    #[tokio::test]
    async fn create_conflict_leaves_registry_untouched() {
        let (store, registry) = registry();
        let registry = registry.with_generation_source(Arc::new(|| 42));

        let part = info("tb1", "part1", BuildType::Offline);
        registry.create(&part, "/store").await.unwrap();
        let before = registry.list(&BuildId::default()).await;
        let writes = store.build_write_count();

        let err = registry.create(&part, "/store").await.unwrap_err();
        assert!(matches!(err, MetastoreError::BuildAlreadyExists(_)), "{err}");

        assert_eq!(before, registry.list(&BuildId::default()).await);
        assert_eq!(writes, store.build_write_count());
    }

    #[tokio::test]
    async fn get_requires_catalog_and_match() {
        let (_store, registry) = registry();

        let err = registry.get(&BuildId::default()).await.unwrap_err();
        assert!(matches!(err, MetastoreError::InvalidArguments(_)), "{err}");

        let err = registry
            .get(&BuildId::new("ct1", "db1", "tb1", "part1", 0))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");

        // Without a partition name an empty result is fine.
        assert!(registry.get(&BuildId::for_catalog("ct1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sparse_updates() {
        let (_store, registry) = registry();
        let id = registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();
        let original = registry.get(&id).await.unwrap().remove(0);

        let shards = vec![
            Shard {
                range_from: 0,
                range_to: 32767,
                index_version: 1,
            },
            Shard {
                range_from: 32768,
                range_to: 65535,
                index_version: 1,
            },
        ];
        registry
            .update(
                &id,
                TargetPatch::default(),
                CurrentPatch {
                    build_state: Some(BuildState::Running),
                    index_root: Some("/index/part1".to_string()),
                    shards: Some(shards.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Only fields in the patch change.
        let build = registry.get(&id).await.unwrap().remove(0);
        assert_eq!(original.target, build.target);
        assert_eq!(BuildState::Running, build.current.build_state);
        assert_eq!("/index/part1", build.current.index_root);
        assert_eq!("", build.current.last_error);
        assert_eq!(shards, build.current.shards);

        // Shards are replaced, not merged.
        registry
            .update(
                &id,
                TargetPatch {
                    build_state: Some(BuildState::Stopped),
                    ..Default::default()
                },
                CurrentPatch {
                    shards: Some(vec![shards[0].clone()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let build = registry.get(&id).await.unwrap().remove(0);
        assert_eq!(BuildState::Stopped, build.target.build_state);
        assert_eq!(BuildType::Offline, build.target.build_type);
        assert_eq!(vec![shards[0].clone()], build.current.shards);
        assert_eq!("/index/part1", build.current.index_root);
    }

    #[tokio::test]
    async fn build_type_is_immutable() {
        let (_store, registry) = registry();
        let id = registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();

        let err = registry
            .update(
                &id,
                TargetPatch {
                    build_type: Some(BuildType::Direct),
                    config_path: Some("/other".to_string()),
                    ..Default::default()
                },
                CurrentPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetastoreError::InvalidArguments(_)), "{err}");

        // Nothing from the rejected patch was applied.
        let build = registry.get(&id).await.unwrap().remove(0);
        assert_ne!("/other", build.target.config_path);

        // Same type is accepted.
        registry
            .update(
                &id,
                TargetPatch {
                    build_type: Some(BuildType::Offline),
                    ..Default::default()
                },
                CurrentPatch::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_requires_existing_full_id() {
        let (_store, registry) = registry();
        let id = registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();

        let partial = BuildId::from_partition(&id.partition_id(), 0);
        let err = registry
            .update(&partial, TargetPatch::default(), CurrentPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MetastoreError::InvalidArguments(_)), "{err}");

        let other = BuildId::from_partition(&id.partition_id(), id.generation_id + 100);
        let err = registry
            .update(&other, TargetPatch::default(), CurrentPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MetastoreError::MissingBuild(_)), "{err}");
    }

    #[tokio::test]
    async fn drop_by_filter() {
        let (_store, registry) = registry();
        for (table, part) in [("tb1", "part1"), ("tb1", "part2"), ("tb2", "part1")] {
            registry
                .create(&info(table, part, BuildType::Offline), "/store")
                .await
                .unwrap();
        }

        let dropped = registry
            .drop_matching(&BuildId::new("ct1", "db1", "tb1", "", 0))
            .await
            .unwrap();
        assert_eq!(2, dropped);

        let remaining = registry.list(&BuildId::default()).await;
        assert_eq!(1, remaining.len());
        assert_eq!("tb2", remaining[0].id.table_name);

        let dropped = registry
            .drop_matching(&BuildId::new("ct1", "db1", "tb1", "", 0))
            .await
            .unwrap();
        assert_eq!(0, dropped);
    }

    #[tokio::test]
    async fn failed_write_is_not_applied() {
        let (store, registry) = registry();
        let id = registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();
        let before = registry.list(&BuildId::default()).await;

        FlakyStore::set(&store.fail_build_writes, true);

        registry
            .create(&info("tb1", "part2", BuildType::Offline), "/store")
            .await
            .unwrap_err();
        registry
            .update(
                &id,
                TargetPatch {
                    build_state: Some(BuildState::Stopped),
                    ..Default::default()
                },
                CurrentPatch::default(),
            )
            .await
            .unwrap_err();
        registry.drop_matching(&BuildId::default()).await.unwrap_err();

        assert_eq!(before, registry.list(&BuildId::default()).await);
    }

    #[tokio::test]
    async fn recover_from_store() {
        let (store, registry) = registry();
        registry
            .create(&info("tb1", "part1", BuildType::Offline), "/store")
            .await
            .unwrap();
        let before = registry.list(&BuildId::default()).await;

        let recovered = BuildRegistry::new("ct1", store, Arc::new(DefaultConfigGenerator));
        assert!(recovered.list(&BuildId::default()).await.is_empty());
        recovered.recover().await.unwrap();
        assert_eq!(before, recovered.list(&BuildId::default()).await);
    }

    #[test]
    fn patch_from_wire_form() {
        let patch = TargetPatch::try_from(proto::BuildTarget::default()).unwrap();
        assert_eq!(TargetPatch::default(), patch);

        let patch = CurrentPatch::try_from(proto::BuildCurrent {
            last_error: "oom".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(Some("oom".to_string()), patch.last_error);
        assert_eq!(None, patch.shards);
        assert_eq!(None, patch.build_state);
    }

    #[test]
    fn wire_form_requires_target() {
        let err = Build::try_from(proto::Build {
            build_id: Some(BuildId::for_catalog("ct1").into()),
            target: None,
            current: None,
        })
        .unwrap_err();
        assert!(matches!(err, ProtoConvError::RequiredField(_)), "{err}");
    }
}
