//! Durable storage for the MCP gateway registry.
//!
//! Persists registered upstream server definitions and per-tool enabled
//! flags. Backends:
//! - Memory (default)
//! - File (JSON snapshot)
//! - Redis

mod common;
pub mod config;
mod core;
mod factory;
mod file;
mod memory;
mod redis;

pub use crate::core::{RegistryStorage, StorageError, StorageResult, StoredServer, ToolState};

pub use config::{RedisConfig, StorageBackend, StorageConfig};
pub use factory::create_storage;
pub use file::FileRegistryStorage;
pub use memory::MemoryRegistryStorage;
pub use crate::redis::RedisRegistryStorage;
