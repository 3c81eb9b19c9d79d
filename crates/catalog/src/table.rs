use std::collections::{BTreeMap, HashSet};

use protogen::catalog::{self as proto, BuildType, EntityStatus};
pub use protogen::catalog::{Column, Index};

use crate::errors::{CatalogError, Result, validate_name};
use crate::keys::{DatabaseKey, EntityKind, PartitionId, TableKey};
use crate::partition::{Partition, PartitionBuildInfo, PartitionMarker};
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub key: TableKey,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub description: String,
    pub structure: Option<TableStructure>,
    pub partitions: BTreeMap<String, Partition>,
}

impl Table {
    pub fn from_proto(database: &DatabaseKey, proto: proto::Table) -> Result<Table> {
        validate_name(EntityKind::Table, &proto.table_name)?;
        check_parent(
            EntityKind::Table,
            "catalog_name",
            &database.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::Table,
            "database_name",
            &database.database_name,
            &proto.database_name,
        )?;

        let key = TableKey::new(
            &database.catalog_name,
            &database.database_name,
            proto.table_name,
        );

        let structure = proto
            .table_structure
            .map(|s| TableStructure::from_proto(&key, s))
            .transpose()?;

        let mut partitions = BTreeMap::new();
        for part in proto.partitions {
            let part = Partition::from_proto(&key, part)?;
            if partitions.contains_key(&part.id.partition_name) {
                return Err(CatalogError::already_exists(
                    EntityKind::Partition,
                    &part.id,
                ));
            }
            partitions.insert(part.id.partition_name.clone(), part);
        }

        Ok(Table {
            key,
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            description: proto.description,
            structure,
            partitions,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::Table {
        let mut out = proto::Table {
            catalog_name: self.key.catalog_name.clone(),
            database_name: self.key.database_name.clone(),
            table_name: self.key.table_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.description = self.description.clone();
        if detail == DetailLevel::Detailed {
            out.table_structure = self.structure.as_ref().map(|s| s.to_proto(&self.key));
            out.partitions = self
                .partitions
                .values()
                .map(|p| p.to_proto(detail))
                .collect();
        }
        out
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
        if let Some(structure) = &mut self.structure {
            structure.version = CatalogVersion::INVALID;
        }
        for part in self.partitions.values_mut() {
            part.mark_created();
        }
    }

    /// Update the table's own fields. Structure and partitions have their own
    /// operations and are left untouched.
    pub(crate) fn update_from(&mut self, proto: proto::Table) -> Result<()> {
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
        if let Some(structure) = &mut self.structure {
            if !structure.version.is_valid() {
                structure.version = version;
            }
        }
        for part in self.partitions.values_mut() {
            part.align_version(version);
        }
    }

    pub fn structure(&self) -> Result<&TableStructure> {
        self.structure
            .as_ref()
            .ok_or_else(|| CatalogError::not_found(EntityKind::TableStructure, &self.key))
    }

    /// Get the structure for modification, marking it as changed.
    pub(crate) fn structure_mut(&mut self) -> Result<&mut TableStructure> {
        let key = &self.key;
        let structure = self
            .structure
            .as_mut()
            .ok_or_else(|| CatalogError::not_found(EntityKind::TableStructure, key))?;
        structure.version = CatalogVersion::INVALID;
        Ok(structure)
    }

    pub(crate) fn set_structure(&mut self, proto: proto::TableStructure) -> Result<()> {
        let mut structure = TableStructure::from_proto(&self.key, proto)?;
        structure.version = CatalogVersion::INVALID;
        self.structure = Some(structure);
        Ok(())
    }

    pub fn partition(&self, name: &str) -> Result<&Partition> {
        self.partitions.get(name).ok_or_else(|| {
            CatalogError::not_found(
                EntityKind::Partition,
                PartitionId::new(
                    &self.key.catalog_name,
                    &self.key.database_name,
                    &self.key.table_name,
                    name,
                ),
            )
        })
    }

    pub(crate) fn create_partition(&mut self, proto: proto::Partition) -> Result<()> {
        let mut part = Partition::from_proto(&self.key, proto)?;
        if self.partitions.contains_key(&part.id.partition_name) {
            return Err(CatalogError::already_exists(EntityKind::Partition, &part.id));
        }
        part.mark_created();
        self.partitions.insert(part.id.partition_name.clone(), part);
        Ok(())
    }

    pub(crate) fn update_partition(&mut self, proto: proto::Partition) -> Result<()> {
        // Validates the key.
        let id = Partition::from_proto(&self.key, proto.clone())?.id;
        let part = self
            .partitions
            .get_mut(&id.partition_name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Partition, &id))?;
        part.update_from(proto)
    }

    pub(crate) fn drop_partition(&mut self, id: &PartitionId) -> Result<()> {
        match self.partitions.remove(&id.partition_name) {
            Some(_) => Ok(()),
            None => Err(CatalogError::not_found(EntityKind::Partition, id)),
        }
    }

    pub fn build_info(&self, partition: &Partition) -> PartitionBuildInfo {
        let (build_type, structure_version, shard_count) = match &self.structure {
            Some(s) => (s.build_type, s.version, s.shard_count),
            None => (BuildType::Unspecified, CatalogVersion::INVALID, 0),
        };
        PartitionBuildInfo {
            id: partition.id.clone(),
            build_type,
            marker: PartitionMarker {
                partition_version: partition.version,
                structure_version,
            },
            shard_count,
            data_source: partition.data_source.clone(),
            data_version: partition.data_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableStructure {
    pub version: CatalogVersion,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub build_type: BuildType,
    pub shard_count: u32,
    pub comment: String,
}

impl TableStructure {
    pub fn from_proto(table: &TableKey, proto: proto::TableStructure) -> Result<TableStructure> {
        check_parent(
            EntityKind::TableStructure,
            "catalog_name",
            &table.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::TableStructure,
            "database_name",
            &table.database_name,
            &proto.database_name,
        )?;
        check_parent(
            EntityKind::TableStructure,
            "table_name",
            &table.table_name,
            &proto.table_name,
        )?;

        let structure = TableStructure {
            version: CatalogVersion::new(proto.version),
            build_type: protogen::enum_from_i32("BuildType", proto.build_type)?,
            columns: proto.columns,
            indexes: proto.indexes,
            shard_count: proto.shard_count,
            comment: proto.comment,
        };
        structure.validate()?;

        Ok(structure)
    }

    pub fn to_proto(&self, table: &TableKey) -> proto::TableStructure {
        let mut out = proto::TableStructure {
            catalog_name: table.catalog_name.clone(),
            database_name: table.database_name.clone(),
            table_name: table.table_name.clone(),
            version: self.version.get(),
            columns: self.columns.clone(),
            indexes: self.indexes.clone(),
            shard_count: self.shard_count,
            comment: self.comment.clone(),
            ..Default::default()
        };
        out.set_build_type(self.build_type);
        out
    }

    /// Check column names are unique and every index only references existing
    /// columns.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::with_capacity(self.columns.len());
        for col in &self.columns {
            validate_name(EntityKind::Column, &col.name)?;
            if !names.insert(col.name.as_str()) {
                return Err(CatalogError::already_exists(EntityKind::Column, &col.name));
            }
        }

        let mut index_names = HashSet::with_capacity(self.indexes.len());
        for index in &self.indexes {
            validate_name(EntityKind::Index, &index.name)?;
            if !index_names.insert(index.name.as_str()) {
                return Err(CatalogError::already_exists(EntityKind::Index, &index.name));
            }
            if index.fields.is_empty() {
                return Err(CatalogError::invalid(
                    EntityKind::Index,
                    format!("index {} has no fields", index.name),
                ));
            }
            for field in &index.fields {
                if !names.contains(field.as_str()) {
                    return Err(CatalogError::invalid(
                        EntityKind::Index,
                        format!("index {} references unknown column {field}", index.name),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub(crate) fn add_columns(&mut self, columns: Vec<Column>) -> Result<()> {
        self.columns.extend(columns);
        self.validate()
    }

    pub(crate) fn update_column(&mut self, column: Column) -> Result<()> {
        let existing = self
            .columns
            .iter_mut()
            .find(|c| c.name == column.name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Column, &column.name))?;
        *existing = column;
        self.validate()
    }

    pub(crate) fn drop_columns(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if self.column(name).is_none() {
                return Err(CatalogError::not_found(EntityKind::Column, name));
            }
            if let Some(index) = self.indexes.iter().find(|i| i.fields.contains(name)) {
                return Err(CatalogError::invalid(
                    EntityKind::Column,
                    format!("column {name} is referenced by index {}", index.name),
                ));
            }
        }
        self.columns.retain(|c| !names.contains(&c.name));
        Ok(())
    }

    pub(crate) fn create_index(&mut self, index: Index) -> Result<()> {
        if self.index(&index.name).is_some() {
            return Err(CatalogError::already_exists(EntityKind::Index, &index.name));
        }
        self.indexes.push(index);
        self.validate()
    }

    pub(crate) fn update_index(&mut self, index: Index) -> Result<()> {
        let existing = self
            .indexes
            .iter_mut()
            .find(|i| i.name == index.name)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Index, &index.name))?;
        *existing = index;
        self.validate()
    }

    pub(crate) fn drop_index(&mut self, name: &str) -> Result<()> {
        let len = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        if self.indexes.len() == len {
            return Err(CatalogError::not_found(EntityKind::Index, name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            column_type: "STRING".to_string(),
            ..Default::default()
        }
    }

    fn index(name: &str, fields: &[&str]) -> Index {
        Index {
            name: name.to_string(),
            index_type: "STRING".to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn structure() -> TableStructure {
        TableStructure::from_proto(
            &TableKey::new("ct1", "db1", "tb1"),
            proto::TableStructure {
                columns: vec![column("id"), column("title")],
                indexes: vec![index("pk", &["id"])],
                build_type: BuildType::Offline as i32,
                shard_count: 2,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn duplicate_columns_rejected() {
        let mut s = structure();
        let err = s.add_columns(vec![column("title")]).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }), "{err}");
    }

    #[test]
    fn index_must_reference_columns() {
        let mut s = structure();
        let err = s.create_index(index("body_idx", &["body"])).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }), "{err}");

        s.create_index(index("title_idx", &["title"])).unwrap();
        assert!(s.index("title_idx").is_some());
    }

    #[test]
    fn cannot_drop_indexed_column() {
        let mut s = structure();
        let err = s.drop_columns(&["id".to_string()]).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }), "{err}");

        s.drop_columns(&["title".to_string()]).unwrap();
        assert_eq!(1, s.columns.len());
    }

    #[test]
    fn drop_missing_index() {
        let mut s = structure();
        let err = s.drop_index("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn build_info_without_structure_is_ineligible() {
        let table = Table::from_proto(
            &DatabaseKey::new("ct1", "db1"),
            proto::Table {
                table_name: "tb1".to_string(),
                partitions: vec![proto::Partition {
                    partition_name: "part1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
        .unwrap();

        let info = table.build_info(table.partition("part1").unwrap());
        assert!(!info.is_build_eligible());
        assert_eq!(CatalogVersion::INVALID, info.marker.structure_version);
    }
}
