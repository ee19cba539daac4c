// core.rs
//
// Core types for the data connector module.
// Contains the registry storage trait, its record types and the error type
// shared by all storage backends.
//
// Structure:
// 1. Server records
// 2. Tool enablement records
// 3. Storage trait

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// PART 1: Server records
// ============================================================================

/// Durable record of a registered upstream server.
///
/// The transport configuration is stored as an opaque JSON document; the
/// storage layer never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredServer {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub transport: Value,
    pub created_at: DateTime<Utc>,
}

impl StoredServer {
    pub fn new(name: impl Into<String>, description: impl Into<String>, transport: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            transport,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// PART 2: Tool enablement records
// ============================================================================

/// Persisted enabled flag for one tool of one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ToolState {
    pub server_name: String,
    pub tool_name: String,
    pub enabled: bool,
}

impl ToolState {
    pub fn new(server_name: impl Into<String>, tool_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            server_name: server_name.into(),
            tool_name: tool_name.into(),
            enabled,
        }
    }
}

impl Display for ToolState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}={}",
            self.server_name,
            self.tool_name,
            if self.enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// PART 3: Storage trait
// ============================================================================

/// Result alias for registry storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error type for registry storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Server already exists: {0}")]
    AlreadyExists(String),

    #[error("Server not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Transactional record store for server definitions and tool flags.
///
/// Every method is atomic: it either applies completely or leaves the store
/// unchanged.
#[async_trait]
pub trait RegistryStorage: Send + Sync + 'static {
    /// Insert a server together with its initial tool flags.
    /// Fails with `AlreadyExists` if the name is taken.
    async fn create_server(&self, server: StoredServer, tools: Vec<ToolState>)
        -> StorageResult<()>;

    /// Remove a server and all of its tool flags. Returns false if unknown.
    async fn delete_server(&self, name: &str) -> StorageResult<bool>;

    async fn get_server(&self, name: &str) -> StorageResult<Option<StoredServer>>;

    async fn list_servers(&self) -> StorageResult<Vec<StoredServer>>;

    /// List tool flags, optionally restricted to one server.
    async fn list_tool_states(&self, server_name: Option<&str>) -> StorageResult<Vec<ToolState>>;

    /// Upsert a batch of tool flags. Fails with `NotFound` if any flag
    /// references an unknown server.
    async fn set_tool_states(&self, states: Vec<ToolState>) -> StorageResult<()>;

    /// Replace every tool flag of one server with `states`.
    async fn replace_tool_states(
        &self,
        server_name: &str,
        states: Vec<ToolState>,
    ) -> StorageResult<()>;
}
