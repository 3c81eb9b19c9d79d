use std::collections::BTreeMap;

use protogen::catalog::{self as proto, EntityStatus};

use crate::errors::{CatalogError, Result, validate_name};
use crate::function::Function;
use crate::keys::{
    DatabaseKey, EntityKind, FunctionKey, LoadStrategyKey, TableGroupKey, TableKey,
};
use crate::load_strategy::LoadStrategy;
use crate::table::Table;
use crate::table_group::TableGroup;
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub key: DatabaseKey,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub description: String,
    pub tables: BTreeMap<String, Table>,
    pub table_groups: BTreeMap<String, TableGroup>,
    pub functions: BTreeMap<String, Function>,
    /// Keyed by (table group, table).
    pub load_strategies: BTreeMap<(String, String), LoadStrategy>,
}

impl Database {
    pub fn from_proto(catalog_name: &str, proto: proto::Database) -> Result<Database> {
        validate_name(EntityKind::Database, &proto.database_name)?;
        check_parent(
            EntityKind::Database,
            "catalog_name",
            catalog_name,
            &proto.catalog_name,
        )?;

        let mut db = Database {
            key: DatabaseKey::new(catalog_name, proto.database_name),
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            description: proto.description,
            tables: BTreeMap::new(),
            table_groups: BTreeMap::new(),
            functions: BTreeMap::new(),
            load_strategies: BTreeMap::new(),
        };

        for table in proto.tables {
            let table = Table::from_proto(&db.key, table)?;
            db.insert_table(table)?;
        }
        for group in proto.table_groups {
            let group = TableGroup::from_proto(&db.key, group)?;
            db.insert_table_group(group)?;
        }
        for func in proto.functions {
            let func = Function::from_proto(&db.key, func)?;
            db.insert_function(func)?;
        }
        for strategy in proto.load_strategies {
            let strategy = LoadStrategy::from_proto(&db.key, strategy)?;
            db.insert_load_strategy(strategy)?;
        }

        Ok(db)
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::Database {
        let mut out = proto::Database {
            catalog_name: self.key.catalog_name.clone(),
            database_name: self.key.database_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.description = self.description.clone();
        if detail == DetailLevel::Detailed {
            out.tables = self.tables.values().map(|t| t.to_proto(detail)).collect();
            out.table_groups = self
                .table_groups
                .values()
                .map(|g| g.to_proto(detail))
                .collect();
            out.functions = self
                .functions
                .values()
                .map(|f| f.to_proto(detail))
                .collect();
            out.load_strategies = self
                .load_strategies
                .values()
                .map(|s| s.to_proto(detail))
                .collect();
        }
        out
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
        self.tables.values_mut().for_each(Table::mark_created);
        self.table_groups
            .values_mut()
            .for_each(TableGroup::mark_created);
        self.functions.values_mut().for_each(Function::mark_created);
        self.load_strategies
            .values_mut()
            .for_each(LoadStrategy::mark_created);
    }

    pub(crate) fn update_from(&mut self, proto: proto::Database) -> Result<()> {
        let status = status_from_proto(proto.status)?;
        if status != EntityStatus::Unspecified {
            self.status = status;
        }
        self.description = proto.description;
        self.version = CatalogVersion::INVALID;
        Ok(())
    }

    pub(crate) fn align_version(&mut self, version: CatalogVersion) {
        if !self.version.is_valid() {
            self.version = version;
        }
        for table in self.tables.values_mut() {
            table.align_version(version);
        }
        for group in self.table_groups.values_mut() {
            if !group.version.is_valid() {
                group.version = version;
            }
        }
        for func in self.functions.values_mut() {
            if !func.version.is_valid() {
                func.version = version;
            }
        }
        for strategy in self.load_strategies.values_mut() {
            if !strategy.version.is_valid() {
                strategy.version = version;
            }
        }
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| {
            CatalogError::not_found(
                EntityKind::Table,
                TableKey::new(&self.key.catalog_name, &self.key.database_name, name),
            )
        })
    }

    /// Get a table for modification, marking it as changed.
    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        let key = &self.key;
        let table = self.tables.get_mut(name).ok_or_else(|| {
            CatalogError::not_found(
                EntityKind::Table,
                TableKey::new(&key.catalog_name, &key.database_name, name),
            )
        })?;
        table.version = CatalogVersion::INVALID;
        Ok(table)
    }

    fn insert_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(&table.key.table_name) {
            return Err(CatalogError::already_exists(EntityKind::Table, &table.key));
        }
        self.tables.insert(table.key.table_name.clone(), table);
        Ok(())
    }

    pub(crate) fn create_table(&mut self, proto: proto::Table) -> Result<()> {
        let mut table = Table::from_proto(&self.key, proto)?;
        table.mark_created();
        self.insert_table(table)
    }

    pub(crate) fn drop_table(&mut self, key: &TableKey) -> Result<()> {
        if !self.tables.contains_key(&key.table_name) {
            return Err(CatalogError::not_found(EntityKind::Table, key));
        }
        if let Some(group) = self
            .table_groups
            .values()
            .find(|g| g.contains_table(&key.table_name))
        {
            return Err(CatalogError::invalid(
                EntityKind::Table,
                format!(
                    "table {key} is still part of table group {}",
                    group.key.table_group_name
                ),
            ));
        }
        self.tables.remove(&key.table_name);
        self.load_strategies
            .retain(|(_, table), _| table != &key.table_name);
        Ok(())
    }

    pub fn table_group(&self, name: &str) -> Result<&TableGroup> {
        self.table_groups.get(name).ok_or_else(|| {
            CatalogError::not_found(
                EntityKind::TableGroup,
                TableGroupKey::new(&self.key.catalog_name, &self.key.database_name, name),
            )
        })
    }

    fn check_group_tables(&self, group: &TableGroup) -> Result<()> {
        for table in &group.table_names {
            if !self.tables.contains_key(table) {
                return Err(CatalogError::invalid(
                    EntityKind::TableGroup,
                    format!(
                        "table group {} references unknown table {table}",
                        group.key
                    ),
                ));
            }
        }
        Ok(())
    }

    fn insert_table_group(&mut self, group: TableGroup) -> Result<()> {
        if self.table_groups.contains_key(&group.key.table_group_name) {
            return Err(CatalogError::already_exists(EntityKind::TableGroup, &group.key));
        }
        self.check_group_tables(&group)?;
        self.table_groups
            .insert(group.key.table_group_name.clone(), group);
        Ok(())
    }

    pub(crate) fn create_table_group(&mut self, proto: proto::TableGroup) -> Result<()> {
        let mut group = TableGroup::from_proto(&self.key, proto)?;
        group.mark_created();
        self.insert_table_group(group)
    }

    pub(crate) fn update_table_group(&mut self, proto: proto::TableGroup) -> Result<()> {
        let update = TableGroup::from_proto(&self.key, proto)?;
        self.check_group_tables(&update)?;
        let group = self
            .table_groups
            .get_mut(&update.key.table_group_name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::TableGroup, &update.key))?;
        group.update_from(update);
        Ok(())
    }

    /// Drop a table group along with the load strategies defined for it.
    pub(crate) fn drop_table_group(&mut self, key: &TableGroupKey) -> Result<()> {
        if self.table_groups.remove(&key.table_group_name).is_none() {
            return Err(CatalogError::not_found(EntityKind::TableGroup, key));
        }
        self.load_strategies
            .retain(|(group, _), _| group != &key.table_group_name);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Result<&Function> {
        self.functions.get(name).ok_or_else(|| {
            CatalogError::not_found(
                EntityKind::Function,
                FunctionKey::new(&self.key.catalog_name, &self.key.database_name, name),
            )
        })
    }

    fn insert_function(&mut self, func: Function) -> Result<()> {
        if self.functions.contains_key(&func.key.function_name) {
            return Err(CatalogError::already_exists(EntityKind::Function, &func.key));
        }
        self.functions.insert(func.key.function_name.clone(), func);
        Ok(())
    }

    pub(crate) fn create_function(&mut self, proto: proto::Function) -> Result<()> {
        let mut func = Function::from_proto(&self.key, proto)?;
        func.mark_created();
        self.insert_function(func)
    }

    pub(crate) fn update_function(&mut self, proto: proto::Function) -> Result<()> {
        let update = Function::from_proto(&self.key, proto)?;
        let func = self
            .functions
            .get_mut(&update.key.function_name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Function, &update.key))?;
        func.update_from(update);
        Ok(())
    }

    pub(crate) fn drop_function(&mut self, key: &FunctionKey) -> Result<()> {
        match self.functions.remove(&key.function_name) {
            Some(_) => Ok(()),
            None => Err(CatalogError::not_found(EntityKind::Function, key)),
        }
    }

    pub fn load_strategy(&self, key: &LoadStrategyKey) -> Result<&LoadStrategy> {
        self.load_strategies
            .get(&(key.table_group_name.clone(), key.table_name.clone()))
            .ok_or_else(|| CatalogError::not_found(EntityKind::LoadStrategy, key))
    }

    fn insert_load_strategy(&mut self, strategy: LoadStrategy) -> Result<()> {
        self.table_group(&strategy.key.table_group_name)?;
        self.table(&strategy.key.table_name)?;

        let map_key = (
            strategy.key.table_group_name.clone(),
            strategy.key.table_name.clone(),
        );
        if self.load_strategies.contains_key(&map_key) {
            return Err(CatalogError::already_exists(
                EntityKind::LoadStrategy,
                &strategy.key,
            ));
        }
        self.load_strategies.insert(map_key, strategy);
        Ok(())
    }

    pub(crate) fn create_load_strategy(&mut self, proto: proto::LoadStrategy) -> Result<()> {
        let mut strategy = LoadStrategy::from_proto(&self.key, proto)?;
        strategy.mark_created();
        self.insert_load_strategy(strategy)
    }

    pub(crate) fn update_load_strategy(&mut self, proto: proto::LoadStrategy) -> Result<()> {
        let update = LoadStrategy::from_proto(&self.key, proto)?;
        let strategy = self
            .load_strategies
            .get_mut(&(
                update.key.table_group_name.clone(),
                update.key.table_name.clone(),
            ))
            .ok_or_else(|| CatalogError::not_found(EntityKind::LoadStrategy, &update.key))?;
        strategy.update_from(update);
        Ok(())
    }

    pub(crate) fn drop_load_strategy(&mut self, key: &LoadStrategyKey) -> Result<()> {
        match self
            .load_strategies
            .remove(&(key.table_group_name.clone(), key.table_name.clone()))
        {
            Some(_) => Ok(()),
            None => Err(CatalogError::not_found(EntityKind::LoadStrategy, key)),
        }
    }
}
