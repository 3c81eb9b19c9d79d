use protogen::catalog::{self as proto, EntityStatus};

use crate::errors::{Result, validate_name};
use crate::keys::{DatabaseKey, EntityKind, TableGroupKey};
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

/// A set of tables of one database that are served together.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGroup {
    pub key: TableGroupKey,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub table_names: Vec<String>,
    pub comment: String,
}

impl TableGroup {
    pub fn from_proto(database: &DatabaseKey, proto: proto::TableGroup) -> Result<TableGroup> {
        validate_name(EntityKind::TableGroup, &proto.table_group_name)?;
        check_parent(
            EntityKind::TableGroup,
            "catalog_name",
            &database.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::TableGroup,
            "database_name",
            &database.database_name,
            &proto.database_name,
        )?;

        Ok(TableGroup {
            key: TableGroupKey::new(
                &database.catalog_name,
                &database.database_name,
                proto.table_group_name,
            ),
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            table_names: proto.table_names,
            comment: proto.comment,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::TableGroup {
        let mut out = proto::TableGroup {
            catalog_name: self.key.catalog_name.clone(),
            database_name: self.key.database_name.clone(),
            table_group_name: self.key.table_group_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.table_names = self.table_names.clone();
        out.comment = self.comment.clone();
        out
    }

    pub fn contains_table(&self, table_name: &str) -> bool {
        self.table_names.iter().any(|t| t == table_name)
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
    }

    pub(crate) fn update_from(&mut self, other: TableGroup) {
        if other.status != EntityStatus::Unspecified {
            self.status = other.status;
        }
        self.table_names = other.table_names;
        self.comment = other.comment;
        self.version = CatalogVersion::INVALID;
    }
}
