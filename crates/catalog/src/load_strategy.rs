use protogen::catalog::{self as proto, EntityStatus};

use crate::errors::{Result, validate_name};
use crate::keys::{DatabaseKey, EntityKind, LoadStrategyKey};
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

/// How a table is loaded when served as part of a table group.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStrategy {
    pub key: LoadStrategyKey,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub online_index_config: String,
}

impl LoadStrategy {
    pub fn from_proto(database: &DatabaseKey, proto: proto::LoadStrategy) -> Result<LoadStrategy> {
        validate_name(EntityKind::TableGroup, &proto.table_group_name)?;
        validate_name(EntityKind::Table, &proto.table_name)?;
        check_parent(
            EntityKind::LoadStrategy,
            "catalog_name",
            &database.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::LoadStrategy,
            "database_name",
            &database.database_name,
            &proto.database_name,
        )?;

        Ok(LoadStrategy {
            key: LoadStrategyKey::new(
                &database.catalog_name,
                &database.database_name,
                proto.table_group_name,
                proto.table_name,
            ),
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            online_index_config: proto.online_index_config,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::LoadStrategy {
        let mut out = proto::LoadStrategy {
            catalog_name: self.key.catalog_name.clone(),
            database_name: self.key.database_name.clone(),
            table_group_name: self.key.table_group_name.clone(),
            table_name: self.key.table_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.online_index_config = self.online_index_config.clone();
        out
    }

    /// Name used when listing load strategies: `<table_group>.<table>`.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.key.table_group_name, self.key.table_name)
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
    }

    pub(crate) fn update_from(&mut self, other: LoadStrategy) {
        if other.status != EntityStatus::Unspecified {
            self.status = other.status;
        }
        self.online_index_config = other.online_index_config;
        self.version = CatalogVersion::INVALID;
    }
}
