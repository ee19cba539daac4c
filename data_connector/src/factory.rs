//! Storage factory: builds the configured registry backend.

use std::sync::Arc;

use tracing::info;

use crate::{
    config::{StorageBackend, StorageConfig},
    core::RegistryStorage,
    file::FileRegistryStorage,
    memory::MemoryRegistryStorage,
    redis::RedisRegistryStorage,
};

/// Create the registry storage selected by `config`.
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn RegistryStorage>, String> {
    config.validate()?;

    match config.backend {
        StorageBackend::Memory => {
            info!("Initializing in-memory registry storage");
            Ok(Arc::new(MemoryRegistryStorage::new()))
        }
        StorageBackend::File => {
            let path = config
                .path
                .as_ref()
                .ok_or("file backend requires storage.path")?;
            info!(path = %path.display(), "Initializing file registry storage");
            let store = FileRegistryStorage::open(path)
                .await
                .map_err(|e| format!("failed to open registry snapshot: {e}"))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .ok_or("redis backend requires storage.redis")?;
            info!(key_prefix = %redis.key_prefix, "Initializing redis registry storage");
            Ok(Arc::new(RedisRegistryStorage::new(redis)?))
        }
    }
}
