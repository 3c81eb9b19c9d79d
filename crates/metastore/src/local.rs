use std::path::Path;
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use tracing::info;
use uuid::Uuid;

use crate::config::MetastoreConfig;
use crate::errors::{MetastoreError, Result};
use crate::srv::Service;
use crate::storage::StorageError;
use crate::storage::persist::Storage;

/// Starts an in-memory metastore. Nothing survives a restart.
pub async fn start_inmemory(config: MetastoreConfig) -> Result<Service> {
    info!("starting in-memory metastore");
    start_with_store(Arc::new(InMemory::new()), config).await
}

/// Starts a metastore persisting to a directory on the local filesystem.
pub async fn start_local(path: impl AsRef<Path>, config: MetastoreConfig) -> Result<Service> {
    let path = path.as_ref();
    info!(?path, "starting local metastore");
    std::fs::create_dir_all(path).map_err(|source| MetastoreError::LocalStore {
        path: path.to_path_buf(),
        source,
    })?;
    let local = LocalFileSystem::new_with_prefix(path).map_err(StorageError::from)?;
    start_with_store(Arc::new(local), config).await
}

/// Starts a metastore on top of an arbitrary object store, recovering every
/// catalog already in it.
pub async fn start_with_store(store: Arc<dyn ObjectStore>, config: MetastoreConfig) -> Result<Service> {
    let storage = Storage::new(Uuid::new_v4(), store);
    let service = Service::new(Arc::new(storage), config);
    service.recover_all().await?;
    Ok(service)
}
