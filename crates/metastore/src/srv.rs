use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use catalog::{
    Catalog, CatalogError, DatabaseKey, DetailLevel, FunctionKey, LoadStrategyKey, PartitionId,
    TableGroupKey, TableKey,
};
use protogen::catalog::{self as proto, Column, EntityStatus, Index};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::build::{Build, BuildId, CurrentPatch, GenerationSource, TargetPatch};
use crate::build_config::{BuildConfigGenerator, DefaultConfigGenerator};
use crate::config::MetastoreConfig;
use crate::controller::CatalogController;
use crate::errors::{MetastoreError, Result};
use crate::reconciler::ReconcileStats;
use crate::storage::CatalogStore;
use crate::transaction::{CommitInfo, Precondition, WriteMode};

/// Options carried by every list and get request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Version to read at. Non-positive reads the current version.
    pub catalog_version: i64,
    /// Return an empty result instead of a not found error.
    pub ignore_not_found: bool,
    pub detail_level: DetailLevel,
}

impl ReadOptions {
    pub fn at_version(catalog_version: i64) -> Self {
        ReadOptions {
            catalog_version,
            ..Default::default()
        }
    }
}

/// Versions reported back for every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateResponse {
    pub source_catalog_version: i64,
    pub target_catalog_version: i64,
}

impl From<CommitInfo> for MutateResponse {
    fn from(info: CommitInfo) -> Self {
        MutateResponse {
            source_catalog_version: info.source.get(),
            target_catalog_version: info.target.get(),
        }
    }
}

/// Metastore service, managing any number of catalogs.
///
/// Catalogs are opened and recovered on first use.
pub struct Service {
    store: Arc<dyn CatalogStore>,
    config: MetastoreConfig,
    generator: Arc<dyn BuildConfigGenerator>,
    generation: Option<GenerationSource>,
    catalogs: RwLock<HashMap<String, Arc<CatalogController>>>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(store: Arc<dyn CatalogStore>, config: MetastoreConfig) -> Service {
        Service {
            store,
            config,
            generator: Arc::new(DefaultConfigGenerator),
            generation: None,
            catalogs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config_generator(mut self, generator: Arc<dyn BuildConfigGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_generation_source(mut self, generation: GenerationSource) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn config(&self) -> &MetastoreConfig {
        &self.config
    }

    /// Open and recover every catalog found in the store.
    pub async fn recover_all(&self) -> Result<usize> {
        let names = self.store.list_catalog_names().await?;
        let mut recovered = 0;
        for name in names {
            if self.catalogs.read().await.contains_key(&name) {
                continue;
            }
            let controller = self.open(&name).await?;
            if controller.exists().await {
                self.insert(controller).await;
                recovered += 1;
            }
        }
        info!(%recovered, "recovered catalogs");
        Ok(recovered)
    }

    /// Run one reconciliation pass for every open catalog. Catalogs are
    /// reconciled concurrently.
    pub async fn reconcile_all(&self) -> ReconcileStats {
        let controllers: Vec<_> = self.catalogs.read().await.values().cloned().collect();
        let passes = controllers.iter().map(|c| c.reconcile());

        let mut stats = ReconcileStats::default();
        for pass in futures::future::join_all(passes).await {
            stats += pass;
        }
        stats
    }

    /// Names of all catalogs in the store.
    pub async fn list_catalogs(&self) -> Result<Vec<String>> {
        Ok(self.store.list_catalog_names().await?)
    }

    pub async fn create_catalog(&self, catalog: proto::Catalog) -> Result<MutateResponse> {
        let name = catalog.catalog_name.clone();
        let existing = self.catalogs.read().await.get(&name).cloned();
        let controller = match existing {
            Some(controller) => controller,
            None => {
                let controller = self.open(&name).await?;
                self.insert(controller).await
            }
        };

        let info = controller
            .transact(Precondition::Absent, WriteMode::Snapshot, |tree| {
                tree.create_catalog(catalog)
            })
            .await?;
        Ok(info.into())
    }

    pub async fn get_catalog(
        &self,
        catalog_name: &str,
        opts: ReadOptions,
    ) -> Result<Option<proto::Catalog>> {
        let detail = opts.detail_level;
        self.read(catalog_name, opts, |tree| Ok(tree.to_proto(detail)))
            .await
    }

    pub async fn update_catalog(
        &self,
        catalog_version: i64,
        catalog: proto::Catalog,
    ) -> Result<MutateResponse> {
        let name = catalog.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_catalog(catalog))
            .await
    }

    /// Change the status of a catalog without advancing its version.
    pub async fn update_catalog_status(
        &self,
        catalog_name: &str,
        catalog_version: i64,
        status: EntityStatus,
    ) -> Result<MutateResponse> {
        let controller = self.controller(catalog_name).await?;
        let info = controller
            .transact(
                Precondition::Version(catalog_version),
                WriteMode::Status(status),
                |tree| {
                    tree.set_status(status);
                    Ok(())
                },
            )
            .await?;
        Ok(info.into())
    }

    /// Drop a catalog. Its databases go away with it and the next
    /// reconciliation pass drops its builds. The dropped catalog stays
    /// readable with a `Deleted` status.
    pub async fn drop_catalog(
        &self,
        catalog_name: &str,
        catalog_version: i64,
    ) -> Result<MutateResponse> {
        let resp = self
            .mutate(catalog_name, catalog_version, |tree| {
                tree.drop_catalog(catalog_name)
            })
            .await?;
        info!(catalog = %catalog_name, version = resp.target_catalog_version, "dropped catalog");
        Ok(resp)
    }

    pub async fn list_databases(&self, catalog_name: &str, opts: ReadOptions) -> Result<Vec<String>> {
        let names = self
            .read(catalog_name, opts, |tree| Ok(tree.database_names()))
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_database(
        &self,
        key: &DatabaseKey,
        opts: ReadOptions,
    ) -> Result<Option<proto::Database>> {
        let detail = opts.detail_level;
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.database(key)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_database(
        &self,
        catalog_version: i64,
        database: proto::Database,
    ) -> Result<MutateResponse> {
        let name = database.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.create_database(database))
            .await
    }

    pub async fn update_database(
        &self,
        catalog_version: i64,
        database: proto::Database,
    ) -> Result<MutateResponse> {
        let name = database.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_database(database))
            .await
    }

    pub async fn drop_database(
        &self,
        catalog_version: i64,
        key: &DatabaseKey,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_database(key)
        })
        .await
    }

    pub async fn list_tables(&self, key: &DatabaseKey, opts: ReadOptions) -> Result<Vec<String>> {
        let names = self
            .read(&key.catalog_name, opts, |tree| {
                Ok(tree.database(key)?.tables.keys().cloned().collect())
            })
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_table(&self, key: &TableKey, opts: ReadOptions) -> Result<Option<proto::Table>> {
        let detail = opts.detail_level;
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.table(key)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_table(&self, catalog_version: i64, table: proto::Table) -> Result<MutateResponse> {
        let name = table.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.create_table(table))
            .await
    }

    pub async fn update_table(&self, catalog_version: i64, table: proto::Table) -> Result<MutateResponse> {
        let name = table.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_table(table))
            .await
    }

    pub async fn drop_table(&self, catalog_version: i64, key: &TableKey) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| tree.drop_table(key))
            .await
    }

    pub async fn get_table_structure(
        &self,
        key: &TableKey,
        opts: ReadOptions,
    ) -> Result<Option<proto::TableStructure>> {
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.table_structure(key)?.to_proto(key))
        })
        .await
    }

    pub async fn update_table_structure(
        &self,
        catalog_version: i64,
        structure: proto::TableStructure,
    ) -> Result<MutateResponse> {
        let name = structure.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| {
            tree.update_table_structure(structure)
        })
        .await
    }

    pub async fn add_columns(
        &self,
        catalog_version: i64,
        key: &TableKey,
        columns: Vec<Column>,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.add_columns(key, columns)
        })
        .await
    }

    pub async fn update_column(
        &self,
        catalog_version: i64,
        key: &TableKey,
        column: Column,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.update_column(key, column)
        })
        .await
    }

    pub async fn drop_columns(
        &self,
        catalog_version: i64,
        key: &TableKey,
        names: &[String],
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_columns(key, names)
        })
        .await
    }

    pub async fn create_index(
        &self,
        catalog_version: i64,
        key: &TableKey,
        index: Index,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.create_index(key, index)
        })
        .await
    }

    pub async fn update_index(
        &self,
        catalog_version: i64,
        key: &TableKey,
        index: Index,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.update_index(key, index)
        })
        .await
    }

    pub async fn drop_index(
        &self,
        catalog_version: i64,
        key: &TableKey,
        index_name: &str,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_index(key, index_name)
        })
        .await
    }

    pub async fn list_partitions(&self, key: &TableKey, opts: ReadOptions) -> Result<Vec<String>> {
        let names = self
            .read(&key.catalog_name, opts, |tree| {
                Ok(tree.table(key)?.partitions.keys().cloned().collect())
            })
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_partition(
        &self,
        id: &PartitionId,
        opts: ReadOptions,
    ) -> Result<Option<proto::Partition>> {
        let detail = opts.detail_level;
        self.read(&id.catalog_name, opts, |tree| {
            Ok(tree.partition(id)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_partition(
        &self,
        catalog_version: i64,
        partition: proto::Partition,
    ) -> Result<MutateResponse> {
        let name = partition.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.create_partition(partition))
            .await
    }

    pub async fn update_partition(
        &self,
        catalog_version: i64,
        partition: proto::Partition,
    ) -> Result<MutateResponse> {
        let name = partition.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_partition(partition))
            .await
    }

    pub async fn drop_partition(
        &self,
        catalog_version: i64,
        id: &PartitionId,
    ) -> Result<MutateResponse> {
        self.mutate(&id.catalog_name, catalog_version, |tree| {
            tree.drop_partition(id)
        })
        .await
    }

    pub async fn list_table_groups(
        &self,
        key: &DatabaseKey,
        opts: ReadOptions,
    ) -> Result<Vec<String>> {
        let names = self
            .read(&key.catalog_name, opts, |tree| {
                Ok(tree.database(key)?.table_groups.keys().cloned().collect())
            })
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_table_group(
        &self,
        key: &TableGroupKey,
        opts: ReadOptions,
    ) -> Result<Option<proto::TableGroup>> {
        let detail = opts.detail_level;
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.table_group(key)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_table_group(
        &self,
        catalog_version: i64,
        group: proto::TableGroup,
    ) -> Result<MutateResponse> {
        let name = group.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.create_table_group(group))
            .await
    }

    pub async fn update_table_group(
        &self,
        catalog_version: i64,
        group: proto::TableGroup,
    ) -> Result<MutateResponse> {
        let name = group.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_table_group(group))
            .await
    }

    pub async fn drop_table_group(
        &self,
        catalog_version: i64,
        key: &TableGroupKey,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_table_group(key)
        })
        .await
    }

    /// Load strategies are listed as `<table_group>.<table>`.
    pub async fn list_load_strategies(
        &self,
        key: &DatabaseKey,
        opts: ReadOptions,
    ) -> Result<Vec<String>> {
        let names = self
            .read(&key.catalog_name, opts, |tree| {
                Ok(tree
                    .database(key)?
                    .load_strategies
                    .values()
                    .map(|s| s.display_name())
                    .collect())
            })
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_load_strategy(
        &self,
        key: &LoadStrategyKey,
        opts: ReadOptions,
    ) -> Result<Option<proto::LoadStrategy>> {
        let detail = opts.detail_level;
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.load_strategy(key)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_load_strategy(
        &self,
        catalog_version: i64,
        strategy: proto::LoadStrategy,
    ) -> Result<MutateResponse> {
        let name = strategy.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| {
            tree.create_load_strategy(strategy)
        })
        .await
    }

    pub async fn update_load_strategy(
        &self,
        catalog_version: i64,
        strategy: proto::LoadStrategy,
    ) -> Result<MutateResponse> {
        let name = strategy.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| {
            tree.update_load_strategy(strategy)
        })
        .await
    }

    pub async fn drop_load_strategy(
        &self,
        catalog_version: i64,
        key: &LoadStrategyKey,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_load_strategy(key)
        })
        .await
    }

    pub async fn list_functions(&self, key: &DatabaseKey, opts: ReadOptions) -> Result<Vec<String>> {
        let names = self
            .read(&key.catalog_name, opts, |tree| {
                Ok(tree.database(key)?.functions.keys().cloned().collect())
            })
            .await?;
        Ok(names.unwrap_or_default())
    }

    pub async fn get_function(
        &self,
        key: &FunctionKey,
        opts: ReadOptions,
    ) -> Result<Option<proto::Function>> {
        let detail = opts.detail_level;
        self.read(&key.catalog_name, opts, |tree| {
            Ok(tree.function(key)?.to_proto(detail))
        })
        .await
    }

    pub async fn create_function(
        &self,
        catalog_version: i64,
        function: proto::Function,
    ) -> Result<MutateResponse> {
        let name = function.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.create_function(function))
            .await
    }

    pub async fn update_function(
        &self,
        catalog_version: i64,
        function: proto::Function,
    ) -> Result<MutateResponse> {
        let name = function.catalog_name.clone();
        self.mutate(&name, catalog_version, |tree| tree.update_function(function))
            .await
    }

    pub async fn drop_function(
        &self,
        catalog_version: i64,
        key: &FunctionKey,
    ) -> Result<MutateResponse> {
        self.mutate(&key.catalog_name, catalog_version, |tree| {
            tree.drop_function(key)
        })
        .await
    }

    /// List builds matching a possibly partial id. An empty catalog name
    /// lists the builds of every catalog in the store, opening catalogs as
    /// needed.
    pub async fn list_builds(&self, filter: &BuildId) -> Result<Vec<Build>> {
        if filter.catalog_name.is_empty() {
            let mut builds = Vec::new();
            for name in self.store.list_catalog_names().await? {
                let controller = match self.controller(&name).await {
                    Ok(controller) => controller,
                    // Nothing but builds or temp objects under this name.
                    Err(MetastoreError::MissingCatalog(_)) => continue,
                    Err(e) => return Err(e),
                };
                builds.extend(controller.builds().list(filter).await);
            }
            builds.sort_by(|a, b| a.id.cmp(&b.id));
            return Ok(builds);
        }

        let controller = self.controller(&filter.catalog_name).await?;
        Ok(controller.builds().list(filter).await)
    }

    pub async fn get_build(&self, filter: &BuildId) -> Result<Vec<Build>> {
        let controller = self.build_controller(filter).await?;
        controller.builds().get(filter).await
    }

    /// Create a build for the partition named by `id`, using the current
    /// version of the catalog. The generation of `id` is ignored.
    pub async fn create_build(&self, id: &BuildId, store_root: &str) -> Result<BuildId> {
        let partition = id.partition_id();
        if partition.catalog_name.is_empty()
            || partition.database_name.is_empty()
            || partition.table_name.is_empty()
            || partition.partition_name.is_empty()
        {
            return Err(MetastoreError::InvalidArguments(format!(
                "build id {id} does not name a partition"
            )));
        }

        let controller = self.controller(&partition.catalog_name).await?;
        let snapshot = controller.read(0).await?;
        let info = snapshot.tree().partition_build_info(&partition)?;
        controller.builds().create(&info, store_root).await
    }

    pub async fn update_build(
        &self,
        id: &BuildId,
        target: TargetPatch,
        current: CurrentPatch,
    ) -> Result<()> {
        let controller = self.build_controller(id).await?;
        controller.builds().update(id, target, current).await
    }

    /// Drop all builds matching a possibly partial id. Returns the number of
    /// dropped builds.
    pub async fn drop_build(&self, filter: &BuildId) -> Result<usize> {
        let controller = self.build_controller(filter).await?;
        controller.builds().drop_matching(filter).await
    }

    async fn build_controller(&self, id: &BuildId) -> Result<Arc<CatalogController>> {
        if id.catalog_name.is_empty() {
            return Err(MetastoreError::InvalidArguments(
                "build id is missing a catalog name".to_string(),
            ));
        }
        self.controller(&id.catalog_name).await
    }

    /// Read from a snapshot of the catalog.
    ///
    /// Returns `None` if something wasn't found and `ignore_not_found` is set.
    async fn read<T, F>(&self, catalog_name: &str, opts: ReadOptions, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&Catalog) -> Result<T, CatalogError>,
    {
        let result: Result<T> = async {
            let controller = self.controller(catalog_name).await?;
            let snapshot = controller.read(opts.catalog_version).await?;
            Ok(read(snapshot.tree())?)
        }
        .await;

        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if opts.ignore_not_found && e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn mutate<M>(
        &self,
        catalog_name: &str,
        catalog_version: i64,
        mutate: M,
    ) -> Result<MutateResponse>
    where
        M: FnOnce(&mut Catalog) -> Result<(), CatalogError>,
    {
        let controller = self.controller(catalog_name).await?;
        let info = controller
            .transact(
                Precondition::Version(catalog_version),
                WriteMode::Snapshot,
                mutate,
            )
            .await?;
        Ok(info.into())
    }

    /// Get an open catalog, opening it if it exists in the store.
    async fn controller(&self, catalog_name: &str) -> Result<Arc<CatalogController>> {
        if let Some(controller) = self.catalogs.read().await.get(catalog_name) {
            return Ok(controller.clone());
        }

        let controller = self.open(catalog_name).await?;
        if !controller.exists().await {
            return Err(MetastoreError::MissingCatalog(catalog_name.to_string()));
        }
        Ok(self.insert(controller).await)
    }

    async fn open(&self, catalog_name: &str) -> Result<CatalogController> {
        if catalog_name.is_empty() {
            return Err(MetastoreError::InvalidArguments(
                "catalog name must not be empty".to_string(),
            ));
        }

        debug!(catalog = %catalog_name, "opening catalog");
        let controller = CatalogController::new(
            catalog_name,
            self.store.clone(),
            &self.config,
            self.generator.clone(),
            self.generation.clone(),
        );
        controller.recover().await?;
        Ok(controller)
    }

    async fn insert(&self, controller: CatalogController) -> Arc<CatalogController> {
        let mut catalogs = self.catalogs.write().await;
        // We raced, catalog was opened before we got the lock.
        catalogs
            .entry(controller.catalog_name().to_string())
            .or_insert_with(|| Arc::new(controller))
            .clone()
    }
}
