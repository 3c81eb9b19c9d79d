use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use catalog::CatalogVersion;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode};
use prost::Message;
use protogen::build::BuildList;
use protogen::catalog::{self as proto, EntityStatus};
use tracing::debug;
use uuid::Uuid;

use crate::build::Build;
use crate::snapshot::CatalogSnapshot;
use crate::storage::{
    CATALOGS_PREFIX, CatalogStore, Result, SingletonStorageObject, StorageError, StorageObject,
    VersionedStorageObject, visible_prefix,
};

const SNAPSHOT_OBJECT: VersionedStorageObject = VersionedStorageObject("catalog", 0);
const BUILDS_OBJECT: SingletonStorageObject = SingletonStorageObject("builds");

/// Persistent storage for catalogs backed by an object store.
///
/// Snapshots are only ever created, never overwritten, with the exception of
/// status updates. The build list is written to a temporary location first
/// and then moved into place.
#[derive(Debug, Clone)]
pub struct Storage {
    process_id: Uuid,
    store: Arc<dyn ObjectStore>,
}

impl Storage {
    pub fn new(process_id: Uuid, store: Arc<dyn ObjectStore>) -> Storage {
        Storage { process_id, store }
    }

    fn encode<M: Message>(msg: &M) -> Result<Bytes> {
        let mut bs = BytesMut::new();
        msg.encode(&mut bs)?;
        Ok(bs.freeze())
    }

    fn snapshot_path(catalog: &str, version: CatalogVersion) -> ObjectPath {
        SNAPSHOT_OBJECT.with_version(version).visible_path(catalog)
    }
}

#[async_trait]
impl CatalogStore for Storage {
    async fn list_catalog_names(&self) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(CATALOGS_PREFIX);
        let listed = self.store.list_with_delimiter(Some(&prefix)).await?;

        let mut names: Vec<String> = listed
            .common_prefixes
            .iter()
            .filter_map(|path| path.filename().map(str::to_string))
            .collect();
        names.sort();

        Ok(names)
    }

    async fn latest_version(&self, catalog: &str) -> Result<Option<CatalogVersion>> {
        let listed = self
            .store
            .list_with_delimiter(Some(&visible_prefix(catalog)))
            .await?;

        Ok(listed
            .objects
            .iter()
            .filter_map(|meta| {
                meta.location
                    .filename()
                    .and_then(|name| SNAPSHOT_OBJECT.parse_version(name))
            })
            .max())
    }

    async fn read_snapshot(
        &self,
        catalog: &str,
        version: CatalogVersion,
    ) -> Result<CatalogSnapshot> {
        let path = Self::snapshot_path(catalog, version);
        let bs = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::MissingSnapshot {
                    catalog: catalog.to_string(),
                    version,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let proto = proto::Catalog::decode(bs)?;
        if proto.catalog_name != catalog {
            return Err(StorageError::CatalogNameMismatch {
                expected: catalog.to_string(),
                have: proto.catalog_name,
            });
        }

        Ok(CatalogSnapshot::from_proto(proto)?)
    }

    async fn write_snapshot(
        &self,
        old: Option<&CatalogSnapshot>,
        new: &CatalogSnapshot,
    ) -> Result<()> {
        let catalog = new.catalog_name();
        if let Some(old) = old {
            if old.catalog_name() != catalog {
                return Err(StorageError::CatalogNameMismatch {
                    expected: old.catalog_name().to_string(),
                    have: catalog.to_string(),
                });
            }
            if new.version() <= old.version() {
                return Err(StorageError::AttemptedOutOfDateCatalogWrite {
                    catalog: catalog.to_string(),
                    previous: old.version(),
                    new: new.version(),
                });
            }
        }
        if !new.version().is_valid() {
            return Err(StorageError::AttemptedOutOfDateCatalogWrite {
                catalog: catalog.to_string(),
                previous: old.map(|s| s.version()).unwrap_or_default(),
                new: new.version(),
            });
        }

        let bs = Self::encode(&new.to_proto())?;
        let path = Self::snapshot_path(catalog, new.version());
        debug!(%catalog, version = %new.version(), %path, "writing catalog snapshot");

        match self
            .store
            .put_opts(&path, bs.into(), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => {
                Err(StorageError::SnapshotAlreadyExists {
                    catalog: catalog.to_string(),
                    version: new.version(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_builds(&self, catalog: &str) -> Result<Vec<Build>> {
        let path = BUILDS_OBJECT.visible_path(catalog);
        let bs = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let list = BuildList::decode(bs)?;
        let builds = list
            .builds
            .into_iter()
            .map(Build::try_from)
            .collect::<Result<_, _>>()?;

        Ok(builds)
    }

    async fn write_builds(&self, catalog: &str, builds: &[Build]) -> Result<()> {
        let list = BuildList {
            builds: builds.iter().cloned().map(Into::into).collect(),
        };
        let bs = Self::encode(&list)?;

        let tmp_path = BUILDS_OBJECT.tmp_path(catalog, &self.process_id);
        let visible_path = BUILDS_OBJECT.visible_path(catalog);
        debug!(%catalog, num_builds = builds.len(), %visible_path, "writing build list");

        self.store.put(&tmp_path, bs.into()).await?;
        self.store.rename(&tmp_path, &visible_path).await?;

        Ok(())
    }

    async fn update_catalog_status(
        &self,
        snapshot: &CatalogSnapshot,
        status: EntityStatus,
    ) -> Result<()> {
        let catalog = snapshot.catalog_name();
        let path = Self::snapshot_path(catalog, snapshot.version());

        // Only existing snapshots may have their status rewritten.
        match self.store.head(&path).await {
            Ok(_) => (),
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::MissingSnapshot {
                    catalog: catalog.to_string(),
                    version: snapshot.version(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut proto = snapshot.to_proto();
        proto.set_status(status);
        let bs = Self::encode(&proto)?;
        debug!(%catalog, version = %snapshot.version(), status = status.as_str(), "updating catalog status");

        self.store.put(&path, bs.into()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use catalog::Catalog;
    use object_store::memory::InMemory;
    use protogen::build::BuildState;
    use protogen::catalog::BuildType;

    use super::*;
    use crate::build::{BuildCurrent, BuildId, BuildTarget};

    fn storage() -> Storage {
        Storage::new(Uuid::new_v4(), Arc::new(InMemory::new()))
    }

    fn snapshot(name: &str, version: i64) -> CatalogSnapshot {
        let mut tree = Catalog::new(name);
        tree.create_catalog(proto::Catalog {
            catalog_name: name.to_string(),
            description: format!("version {version}"),
            ..Default::default()
        })
        .unwrap();
        tree.align_version(CatalogVersion::new(version));
        CatalogSnapshot::new(tree)
    }

    #[tokio::test]
    async fn empty_store() {
        let storage = storage();
        assert!(storage.list_catalog_names().await.unwrap().is_empty());
        assert_eq!(None, storage.latest_version("ct1").await.unwrap());
        assert!(storage.read_builds("ct1").await.unwrap().is_empty());

        let err = storage
            .read_snapshot("ct1", CatalogVersion::INITIAL)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn write_and_read_snapshots() {
        let storage = storage();

        let v0 = snapshot("ct1", 0);
        storage.write_snapshot(None, &v0).await.unwrap();
        let v1 = snapshot("ct1", 1);
        storage.write_snapshot(Some(&v0), &v1).await.unwrap();
        storage
            .write_snapshot(None, &snapshot("ct2", 0))
            .await
            .unwrap();

        assert_eq!(
            Some(CatalogVersion::new(1)),
            storage.latest_version("ct1").await.unwrap()
        );
        assert_eq!(
            vec!["ct1".to_string(), "ct2".to_string()],
            storage.list_catalog_names().await.unwrap()
        );

        let read = storage
            .read_snapshot("ct1", CatalogVersion::INITIAL)
            .await
            .unwrap();
        assert_eq!(v0, read);
    }

    #[tokio::test]
    async fn snapshots_never_overwritten() {
        let storage = storage();

        let v0 = snapshot("ct1", 0);
        storage.write_snapshot(None, &v0).await.unwrap();

        let err = storage.write_snapshot(None, &v0).await.unwrap_err();
        assert!(
            matches!(err, StorageError::SnapshotAlreadyExists { .. }),
            "{err}"
        );

        let err = storage.write_snapshot(Some(&v0), &v0).await.unwrap_err();
        assert!(
            matches!(err, StorageError::AttemptedOutOfDateCatalogWrite { .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn status_update_rewrites_in_place() {
        let storage = storage();

        let v0 = snapshot("ct1", 0);
        let err = storage
            .update_catalog_status(&v0, EntityStatus::Published)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");

        storage.write_snapshot(None, &v0).await.unwrap();
        storage
            .update_catalog_status(&v0, EntityStatus::Published)
            .await
            .unwrap();

        let read = storage
            .read_snapshot("ct1", CatalogVersion::INITIAL)
            .await
            .unwrap();
        assert_eq!(EntityStatus::Published, read.status());
        assert_eq!(CatalogVersion::INITIAL, read.version());
    }

    #[tokio::test]
    async fn write_and_read_builds() {
        let storage = storage();

        let builds = vec![Build {
            id: BuildId::new("ct1", "db1", "tb1", "part1", 17),
            target: BuildTarget {
                build_type: BuildType::Offline,
                build_state: BuildState::Running,
                config_path: "/tmp/config".to_string(),
            },
            current: BuildCurrent::default(),
        }];
        storage.write_builds("ct1", &builds).await.unwrap();
        assert_eq!(builds, storage.read_builds("ct1").await.unwrap());

        storage.write_builds("ct1", &[]).await.unwrap();
        assert!(storage.read_builds("ct1").await.unwrap().is_empty());
    }
}
