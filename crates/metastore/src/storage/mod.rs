//! Metastore persistent storage.

pub mod persist;

#[cfg(test)]
pub(crate) mod flaky;

use async_trait::async_trait;
use catalog::{CatalogError, CatalogVersion};
use object_store::path::Path as ObjectPath;
use protogen::catalog::EntityStatus;
use uuid::Uuid;

use crate::build::Build;
use crate::snapshot::CatalogSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Missing snapshot for catalog '{catalog}' at version {version}")]
    MissingSnapshot {
        catalog: String,
        version: CatalogVersion,
    },

    #[error(
        "Attempted to write catalog '{catalog}' with an out of date version; previous: {previous}, new: {new}"
    )]
    AttemptedOutOfDateCatalogWrite {
        catalog: String,
        previous: CatalogVersion,
        new: CatalogVersion,
    },

    #[error("Snapshot for catalog '{catalog}' already written at version {version}")]
    SnapshotAlreadyExists {
        catalog: String,
        version: CatalogVersion,
    },

    #[error("Snapshot belongs to catalog '{have}', expected '{expected}'")]
    CatalogNameMismatch { expected: String, have: String },

    #[error("Stored snapshot is not valid: {0}")]
    InvalidSnapshot(#[from] CatalogError),

    #[error(transparent)]
    ProtoConv(#[from] protogen::ProtoConvError),

    #[error("Failed to encode protobuf for storage: {0}")]
    ProstEncode(#[from] prost::EncodeError),

    #[error("Failed to decode protobuf from storage: {0}")]
    ProstDecode(#[from] prost::DecodeError),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::MissingSnapshot { .. }
                | StorageError::ObjectStore(object_store::Error::NotFound { .. })
        )
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Durable storage of catalog snapshots and build lists.
///
/// A catalog is stored as a sequence of immutable snapshots, one per version,
/// next to a single build list.
#[async_trait]
pub trait CatalogStore: std::fmt::Debug + Sync + Send {
    /// Names of every catalog with at least one stored object.
    async fn list_catalog_names(&self) -> Result<Vec<String>>;

    /// Latest stored version for a catalog, `None` if nothing was written yet.
    async fn latest_version(&self, catalog: &str) -> Result<Option<CatalogVersion>>;

    /// Read a snapshot at a specific version.
    ///
    /// Errors with `MissingSnapshot` if the version doesn't exist.
    async fn read_snapshot(&self, catalog: &str, version: CatalogVersion)
    -> Result<CatalogSnapshot>;

    /// Write a new snapshot.
    ///
    /// The write is all or nothing. A snapshot whose version doesn't come
    /// after `old`, or that was already written, is rejected.
    async fn write_snapshot(
        &self,
        old: Option<&CatalogSnapshot>,
        new: &CatalogSnapshot,
    ) -> Result<()>;

    /// Read the build list for a catalog. Empty if never written.
    async fn read_builds(&self, catalog: &str) -> Result<Vec<Build>>;

    /// Replace the build list for a catalog.
    async fn write_builds(&self, catalog: &str, builds: &[Build]) -> Result<()>;

    /// Rewrite the status of an already stored snapshot.
    async fn update_catalog_status(
        &self,
        snapshot: &CatalogSnapshot,
        status: EntityStatus,
    ) -> Result<()>;
}

/// Root prefix of all catalogs.
pub const CATALOGS_PREFIX: &str = "catalogs";

pub trait StorageObject<S: AsRef<str>> {
    /// The name of the storage object.
    fn object_name(&self) -> S;

    /// Get a temporary path to use for this process.
    ///
    /// Path format: 'catalogs/<catalog>/tmp/<proc_id>/<object_name>'
    fn tmp_path(&self, catalog: &str, process_id: &Uuid) -> ObjectPath {
        ObjectPath::from(format!(
            "{CATALOGS_PREFIX}/{}/tmp/{}/{}",
            catalog,
            process_id,
            self.object_name().as_ref(),
        ))
    }

    /// Get the visible object path of this file for a catalog. Objects at this
    /// path will be visible to other processes.
    ///
    /// Path format: 'catalogs/<catalog>/visible/<object_name>'
    ///
    /// Scanning all visible objects only need to do a prefix scan on
    /// 'catalogs/<catalog>/visible/'. Temporary objects will not be included in
    /// such a scan.
    fn visible_path(&self, catalog: &str) -> ObjectPath {
        ObjectPath::from(format!(
            "{CATALOGS_PREFIX}/{}/visible/{}",
            catalog,
            self.object_name().as_ref(),
        ))
    }
}

/// Prefix containing every visible object of a catalog.
pub fn visible_prefix(catalog: &str) -> ObjectPath {
    ObjectPath::from(format!("{CATALOGS_PREFIX}/{catalog}/visible"))
}

/// An object that has only one version for a catalog.
#[derive(Debug, Clone, Copy)]
pub struct SingletonStorageObject(pub &'static str);

impl StorageObject<&'static str> for SingletonStorageObject {
    fn object_name(&self) -> &'static str {
        self.0
    }
}

/// An object that has multiple versions.
#[derive(Debug, Clone, Copy)]
pub struct VersionedStorageObject(pub &'static str, pub i64);

impl VersionedStorageObject {
    pub fn with_version(&self, version: CatalogVersion) -> VersionedStorageObject {
        VersionedStorageObject(self.0, version.get())
    }

    /// Parse the version out of an object name produced by this object, if
    /// the name belongs to it.
    pub fn parse_version(&self, object_name: &str) -> Option<CatalogVersion> {
        let version = object_name.strip_prefix(self.0)?.strip_prefix('.')?;
        version.parse::<i64>().ok().map(CatalogVersion::new)
    }
}

impl StorageObject<String> for VersionedStorageObject {
    fn object_name(&self) -> String {
        format!("{}.{}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths() {
        let process_id = Uuid::nil();
        let builds = SingletonStorageObject("builds");
        assert_eq!(
            "catalogs/ct1/visible/builds",
            builds.visible_path("ct1").to_string()
        );
        assert_eq!(
            "catalogs/ct1/tmp/00000000-0000-0000-0000-000000000000/builds",
            builds.tmp_path("ct1", &process_id).to_string()
        );

        let snapshot = VersionedStorageObject("catalog", 0).with_version(CatalogVersion::new(12));
        assert_eq!(
            "catalogs/ct1/visible/catalog.12",
            snapshot.visible_path("ct1").to_string()
        );
    }

    #[test]
    fn parse_versions() {
        let obj = VersionedStorageObject("catalog", 0);
        assert_eq!(Some(CatalogVersion::new(7)), obj.parse_version("catalog.7"));
        assert_eq!(None, obj.parse_version("catalog"));
        assert_eq!(None, obj.parse_version("catalogue.7"));
        assert_eq!(None, obj.parse_version("builds"));
        assert_eq!(None, obj.parse_version("catalog.x"));
    }
}
