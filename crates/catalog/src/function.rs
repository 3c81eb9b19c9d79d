use protogen::catalog::{self as proto, EntityStatus};

use crate::errors::{Result, validate_name};
use crate::keys::{DatabaseKey, EntityKind, FunctionKey};
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

/// A user defined function registered in a database.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub key: FunctionKey,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub function_type: String,
    pub function_content: String,
}

impl Function {
    pub fn from_proto(database: &DatabaseKey, proto: proto::Function) -> Result<Function> {
        validate_name(EntityKind::Function, &proto.function_name)?;
        check_parent(
            EntityKind::Function,
            "catalog_name",
            &database.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::Function,
            "database_name",
            &database.database_name,
            &proto.database_name,
        )?;

        Ok(Function {
            key: FunctionKey::new(
                &database.catalog_name,
                &database.database_name,
                proto.function_name,
            ),
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            function_type: proto.function_type,
            function_content: proto.function_content,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::Function {
        let mut out = proto::Function {
            catalog_name: self.key.catalog_name.clone(),
            database_name: self.key.database_name.clone(),
            function_name: self.key.function_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.function_type = self.function_type.clone();
        out.function_content = self.function_content.clone();
        out
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
    }

    pub(crate) fn update_from(&mut self, other: Function) {
        if other.status != EntityStatus::Unspecified {
            self.status = other.status;
        }
        self.function_type = other.function_type;
        self.function_content = other.function_content;
        self.version = CatalogVersion::INVALID;
    }
}
