use std::fmt;

use catalog::PartitionBuildInfo;

use crate::build::BuildId;
use crate::errors::{MetastoreError, Result};

/// Produces the location of the config a build worker runs with.
pub trait BuildConfigGenerator: fmt::Debug + Send + Sync {
    fn generate(
        &self,
        store_root: &str,
        id: &BuildId,
        partition: &PartitionBuildInfo,
    ) -> Result<String>;
}

/// Places configs next to the index data of the build:
///
/// `<store_root>/<catalog>/<db>/<table>/<partition>/generation_<gen>/config/<partition_version>_<structure_version>`
///
/// A new path is produced every time the partition or its table structure
/// changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfigGenerator;

impl BuildConfigGenerator for DefaultConfigGenerator {
    fn generate(
        &self,
        store_root: &str,
        id: &BuildId,
        partition: &PartitionBuildInfo,
    ) -> Result<String> {
        let root = store_root.trim_end_matches('/');
        if root.is_empty() {
            return Err(MetastoreError::InvalidArguments(
                "store root must not be empty".to_string(),
            ));
        }
        if id.generation_id == 0 {
            return Err(MetastoreError::InvalidArguments(format!(
                "build {id} has no generation"
            )));
        }

        Ok(format!(
            "{root}/{}/{}/{}/{}/generation_{}/config/{}_{}",
            id.catalog_name,
            id.database_name,
            id.table_name,
            id.partition_name,
            id.generation_id,
            partition.marker.partition_version,
            partition.marker.structure_version,
        ))
    }
}
