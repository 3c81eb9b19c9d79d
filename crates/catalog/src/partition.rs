use protogen::catalog::{self as proto, BuildType, EntityStatus};

use crate::errors::{CatalogError, Result, validate_name};
use crate::keys::{EntityKind, PartitionId, TableKey};
use crate::version::CatalogVersion;
use crate::{DetailLevel, check_parent, creation_status, status_from_proto};

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub id: PartitionId,
    pub version: CatalogVersion,
    pub status: EntityStatus,
    pub data_source: String,
    pub data_version: u64,
}

impl Partition {
    /// Build a partition belonging to `table` from its wire form.
    pub fn from_proto(table: &TableKey, proto: proto::Partition) -> Result<Partition> {
        validate_name(EntityKind::Partition, &proto.partition_name)?;
        check_parent(
            EntityKind::Partition,
            "catalog_name",
            &table.catalog_name,
            &proto.catalog_name,
        )?;
        check_parent(
            EntityKind::Partition,
            "database_name",
            &table.database_name,
            &proto.database_name,
        )?;
        check_parent(
            EntityKind::Partition,
            "table_name",
            &table.table_name,
            &proto.table_name,
        )?;

        Ok(Partition {
            id: PartitionId::new(
                &table.catalog_name,
                &table.database_name,
                &table.table_name,
                proto.partition_name,
            ),
            version: CatalogVersion::new(proto.version),
            status: status_from_proto(proto.status)?,
            data_source: proto.data_source,
            data_version: proto.data_version,
        })
    }

    pub fn to_proto(&self, detail: DetailLevel) -> proto::Partition {
        let mut out = proto::Partition {
            catalog_name: self.id.catalog_name.clone(),
            database_name: self.id.database_name.clone(),
            table_name: self.id.table_name.clone(),
            partition_name: self.id.partition_name.clone(),
            ..Default::default()
        };
        if detail == DetailLevel::Minimal {
            return out;
        }
        out.version = self.version.get();
        out.set_status(self.status);
        out.data_source = self.data_source.clone();
        out.data_version = self.data_version;
        out
    }

    pub(crate) fn mark_created(&mut self) {
        self.version = CatalogVersion::INVALID;
        self.status = creation_status(self.status);
    }

    pub(crate) fn update_from(&mut self, proto: proto::Partition) -> Result<()> {
        if proto.partition_name != self.id.partition_name {
            return Err(CatalogError::invalid(
                EntityKind::Partition,
                format!(
                    "cannot rename partition {} to {}",
                    self.id, proto.partition_name
                ),
            ));
        }
        let status = status_from_proto(proto.status)?;
        if status != EntityStatus::Unspecified {
            self.status = status;
        }
        self.data_source = proto.data_source;
        self.data_version = proto.data_version;
        self.version = CatalogVersion::INVALID;
        Ok(())
    }

    pub(crate) fn align_version(&mut self, version: CatalogVersion) {
        if !self.version.is_valid() {
            self.version = version;
        }
    }
}

/// Versions that change whenever anything deciding how a partition is built
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionMarker {
    pub partition_version: CatalogVersion,
    pub structure_version: CatalogVersion,
}

/// A partition flattened together with the table state that determines its
/// build.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionBuildInfo {
    pub id: PartitionId,
    pub build_type: BuildType,
    pub marker: PartitionMarker,
    pub shard_count: u32,
    pub data_source: String,
    pub data_version: u64,
}

impl PartitionBuildInfo {
    /// Only offline built partitions get a build record.
    pub fn is_build_eligible(&self) -> bool {
        self.build_type == BuildType::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableKey {
        TableKey::new("ct1", "db1", "tb1")
    }

    #[test]
    fn from_proto_fills_parent_names() {
        let part = Partition::from_proto(
            &table(),
            proto::Partition {
                partition_name: "part1".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(PartitionId::new("ct1", "db1", "tb1", "part1"), part.id);
        let out = part.to_proto(DetailLevel::Detailed);
        assert_eq!("tb1", out.table_name);
    }

    #[test]
    fn from_proto_rejects_mismatched_parent() {
        let err = Partition::from_proto(
            &table(),
            proto::Partition {
                table_name: "other".to_string(),
                partition_name: "part1".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();

        assert!(matches!(err, CatalogError::Invalid { .. }), "{err}");
    }

    #[test]
    fn minimal_detail_only_has_key() {
        let mut part = Partition::from_proto(
            &table(),
            proto::Partition {
                partition_name: "part1".to_string(),
                data_source: "swift://topic".to_string(),
                version: 4,
                ..Default::default()
            },
        )
        .unwrap();
        part.mark_created();

        let out = part.to_proto(DetailLevel::Minimal);
        assert_eq!("part1", out.partition_name);
        assert_eq!("", out.data_source);
        assert_eq!(0, out.version);
    }
}
