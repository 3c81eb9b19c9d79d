use std::collections::BTreeMap;

use protogen::catalog::{self as proto, EntityStatus};

use crate::database::Database;
use crate::errors::{CatalogError, Result, validate_name};
use crate::function::Function;
use crate::keys::{
    DatabaseKey, EntityKind, FunctionKey, LoadStrategyKey, PartitionId, TableGroupKey, TableKey,
};
use crate::load_strategy::LoadStrategy;
use crate::partition::{Partition, PartitionBuildInfo};
use crate::table::{Column, Index, Table, TableStructure};
use crate::table_group::TableGroup;
use crate::version::CatalogVersion;
use crate::{DetailLevel, creation_status, status_from_proto};

/// Root of the catalog tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub name: String,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub description: String,
    pub databases: BTreeMap<String, Database>,
}

impl Catalog {
    /// Create an empty tree. The tree only becomes a real catalog once
    /// `create_catalog` has been applied to it.
    pub fn new(name: impl Into<String>) -> Catalog {
        Catalog {
            name: name.into(),
            version: CatalogVersion::INVALID,
            status: EntityStatus::Unspecified,
            description: String::new(),
            databases: BTreeMap::new(),
        }
    }

    pub fn from_proto(proto: proto::Catalog) -> Result<Catalog> {
        validate_name(EntityKind::Catalog, &proto.catalog_name)?;

        let mut databases = BTreeMap::new();
        for db in proto.databases {
            let db = Database::from_proto(&proto.catalog_name, db)?;
            if databases.contains_key(&db.key.database_name) {
                return Err(CatalogError::already_exists(EntityKind::Database, &db.key));
            }
            databases.insert(db.key.database_name.clone(), db);
        }

        Ok(Catalog {
            name: proto.catalog_name,
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            description: proto.description,
            databases,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::Catalog {
        let mut out = proto::Catalog {
            catalog_name: self.name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.description = self.description.clone();
        if detail == DetailLevel::Detailed {
            out.databases = self
                .databases
                .values()
                .map(|db| db.to_proto(detail))
                .collect();
        }
        out
    }

    /// Stamp `version` on the catalog and on every entity changed since the
    /// last stamp.
    pub fn align_version(&mut self, version: CatalogVersion) {
        self.version = version;
        for db in self.databases.values_mut() {
            db.align_version(version);
        }
    }

    fn check_catalog(&self, catalog_name: &str) -> Result<()> {
        if catalog_name != self.name {
            return Err(CatalogError::invalid(
                EntityKind::Catalog,
                format!(
                    "request for catalog '{catalog_name}' sent to catalog '{}'",
                    self.name
                ),
            ));
        }
        Ok(())
    }

    /// Initialize an empty tree from a create request. Databases included in
    /// the request are created along with the catalog.
    pub fn create_catalog(&mut self, proto: proto::Catalog) -> Result<()> {
        self.check_catalog(&proto.catalog_name)?;
        if self.version.is_valid() || !self.databases.is_empty() {
            return Err(CatalogError::already_exists(EntityKind::Catalog, &self.name));
        }

        let mut created = Catalog::from_proto(proto)?;
        created.status = creation_status(created.status);
        created.version = CatalogVersion::INVALID;
        created
            .databases
            .values_mut()
            .for_each(Database::mark_created);

        *self = created;
        Ok(())
    }

    pub fn update_catalog(&mut self, proto: proto::Catalog) -> Result<()> {
        self.check_catalog(&proto.catalog_name)?;
        let status = status_from_proto(proto.status)?;
        if status != EntityStatus::Unspecified {
            self.status = status;
        }
        self.description = proto.description;
        Ok(())
    }

    /// Drop the catalog. Its databases are removed and the catalog is kept
    /// as a `Deleted` tombstone so older versions stay readable.
    pub fn drop_catalog(&mut self, catalog_name: &str) -> Result<()> {
        self.check_catalog(catalog_name)?;
        if self.is_deleted() {
            return Err(CatalogError::not_found(EntityKind::Catalog, &self.name));
        }
        self.databases.clear();
        self.status = EntityStatus::Deleted;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.status == EntityStatus::Deleted
    }

    pub fn set_status(&mut self, status: EntityStatus) {
        self.status = status;
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub fn database(&self, key: &DatabaseKey) -> Result<&Database> {
        self.check_catalog(&key.catalog_name)?;
        self.databases
            .get(&key.database_name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Database, key))
    }

    /// Get a database for modification, marking it as changed.
    fn database_mut(&mut self, key: &DatabaseKey) -> Result<&mut Database> {
        self.check_catalog(&key.catalog_name)?;
        let db = self
            .databases
            .get_mut(&key.database_name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Database, key))?;
        db.version = CatalogVersion::INVALID;
        Ok(db)
    }

    pub fn create_database(&mut self, proto: proto::Database) -> Result<()> {
        self.check_catalog(&proto.catalog_name)?;
        if self.is_deleted() {
            return Err(CatalogError::invalid(
                EntityKind::Database,
                format!("catalog '{}' has been dropped", self.name),
            ));
        }
        let mut db = Database::from_proto(&self.name, proto)?;
        if self.databases.contains_key(&db.key.database_name) {
            return Err(CatalogError::already_exists(EntityKind::Database, &db.key));
        }
        db.mark_created();
        self.databases.insert(db.key.database_name.clone(), db);
        Ok(())
    }

    pub fn update_database(&mut self, proto: proto::Database) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.update_from(proto)
    }

    pub fn drop_database(&mut self, key: &DatabaseKey) -> Result<()> {
        self.check_catalog(&key.catalog_name)?;
        match self.databases.remove(&key.database_name) {
            Some(_) => Ok(()),
            None => Err(CatalogError::not_found(EntityKind::Database, key)),
        }
    }

    pub fn table(&self, key: &TableKey) -> Result<&Table> {
        self.database(&key.database_key())?.table(&key.table_name)
    }

    fn table_mut(&mut self, key: &TableKey) -> Result<&mut Table> {
        self.database_mut(&key.database_key())?
            .table_mut(&key.table_name)
    }

    pub fn create_table(&mut self, proto: proto::Table) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.create_table(proto)
    }

    pub fn update_table(&mut self, proto: proto::Table) -> Result<()> {
        let key = TableKey::new(
            &proto.catalog_name,
            &proto.database_name,
            &proto.table_name,
        );
        self.table_mut(&key)?.update_from(proto)
    }

    pub fn drop_table(&mut self, key: &TableKey) -> Result<()> {
        self.database_mut(&key.database_key())?.drop_table(key)
    }

    pub fn table_structure(&self, key: &TableKey) -> Result<&TableStructure> {
        self.table(key)?.structure()
    }

    /// Replace the structure of a table, creating it if the table had none.
    pub fn update_table_structure(&mut self, proto: proto::TableStructure) -> Result<()> {
        let key = TableKey::new(
            &proto.catalog_name,
            &proto.database_name,
            &proto.table_name,
        );
        self.table_mut(&key)?.set_structure(proto)
    }

    pub fn add_columns(&mut self, key: &TableKey, columns: Vec<Column>) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.add_columns(columns)
    }

    pub fn update_column(&mut self, key: &TableKey, column: Column) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.update_column(column)
    }

    pub fn drop_columns(&mut self, key: &TableKey, names: &[String]) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.drop_columns(names)
    }

    pub fn create_index(&mut self, key: &TableKey, index: Index) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.create_index(index)
    }

    pub fn update_index(&mut self, key: &TableKey, index: Index) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.update_index(index)
    }

    pub fn drop_index(&mut self, key: &TableKey, name: &str) -> Result<()> {
        self.table_mut(key)?.structure_mut()?.drop_index(name)
    }

    pub fn partition(&self, id: &PartitionId) -> Result<&Partition> {
        self.table(&id.table_key())?.partition(&id.partition_name)
    }

    pub fn create_partition(&mut self, proto: proto::Partition) -> Result<()> {
        let key = TableKey::new(
            &proto.catalog_name,
            &proto.database_name,
            &proto.table_name,
        );
        self.table_mut(&key)?.create_partition(proto)
    }

    pub fn update_partition(&mut self, proto: proto::Partition) -> Result<()> {
        let key = TableKey::new(
            &proto.catalog_name,
            &proto.database_name,
            &proto.table_name,
        );
        self.table_mut(&key)?.update_partition(proto)
    }

    pub fn drop_partition(&mut self, id: &PartitionId) -> Result<()> {
        self.table_mut(&id.table_key())?.drop_partition(id)
    }

    pub fn table_group(&self, key: &TableGroupKey) -> Result<&TableGroup> {
        self.database(&key.database_key())?
            .table_group(&key.table_group_name)
    }

    pub fn create_table_group(&mut self, proto: proto::TableGroup) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.create_table_group(proto)
    }

    pub fn update_table_group(&mut self, proto: proto::TableGroup) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.update_table_group(proto)
    }

    pub fn drop_table_group(&mut self, key: &TableGroupKey) -> Result<()> {
        self.database_mut(&key.database_key())?
            .drop_table_group(key)
    }

    pub fn load_strategy(&self, key: &LoadStrategyKey) -> Result<&LoadStrategy> {
        self.database(&key.database_key())?.load_strategy(key)
    }

    pub fn create_load_strategy(&mut self, proto: proto::LoadStrategy) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.create_load_strategy(proto)
    }

    pub fn update_load_strategy(&mut self, proto: proto::LoadStrategy) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.update_load_strategy(proto)
    }

    pub fn drop_load_strategy(&mut self, key: &LoadStrategyKey) -> Result<()> {
        self.database_mut(&key.database_key())?
            .drop_load_strategy(key)
    }

    pub fn function(&self, key: &FunctionKey) -> Result<&Function> {
        self.database(&key.database_key())?
            .function(&key.function_name)
    }

    pub fn create_function(&mut self, proto: proto::Function) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.create_function(proto)
    }

    pub fn update_function(&mut self, proto: proto::Function) -> Result<()> {
        let key = DatabaseKey::new(&proto.catalog_name, &proto.database_name);
        self.database_mut(&key)?.update_function(proto)
    }

    pub fn drop_function(&mut self, key: &FunctionKey) -> Result<()> {
        self.database_mut(&key.database_key())?
            .drop_function(key)
    }

    pub fn partition_build_info(&self, id: &PartitionId) -> Result<PartitionBuildInfo> {
        let table = self.table(&id.table_key())?;
        let part = table.partition(&id.partition_name)?;
        Ok(table.build_info(part))
    }

    /// Every partition in the tree, in key order.
    pub fn partition_build_infos(&self) -> Vec<PartitionBuildInfo> {
        self.databases
            .values()
            .flat_map(|db| db.tables.values())
            .flat_map(|table| table.partitions.values().map(|p| table.build_info(p)))
            .collect()
    }
}
