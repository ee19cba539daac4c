//! Durable catalog of upstream server definitions.
//!
//! Wraps a [`RegistryStorage`] backend with an in-memory mirror of the server
//! definitions so lookups on the invocation path never touch storage.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use data_connector::{RegistryStorage, StoredServer, ToolState};
use parking_lot::RwLock;
use tracing::error;

use super::config::{McpServerConfig, McpTransport};
use crate::error::{McpError, McpResult};

pub struct ServerRegistry {
    storage: Arc<dyn RegistryStorage>,
    servers: RwLock<BTreeMap<String, McpServerConfig>>,
}

impl ServerRegistry {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self {
            storage,
            servers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load every persisted definition into memory.
    ///
    /// Records whose transport no longer parses are logged and skipped.
    pub async fn load(&self) -> McpResult<Vec<McpServerConfig>> {
        let stored = self.storage.list_servers().await?;
        let mut loaded = Vec::with_capacity(stored.len());
        for record in stored {
            match Self::from_record(&record) {
                Ok(config) => loaded.push(config),
                Err(e) => {
                    error!(server = %record.name, error = %e, "Skipping unreadable server record")
                }
            }
        }
        let mut servers = self.servers.write();
        servers.clear();
        servers.extend(loaded.iter().map(|c| (c.name.clone(), c.clone())));
        Ok(loaded)
    }

    fn to_record(config: &McpServerConfig) -> McpResult<StoredServer> {
        let transport = serde_json::to_value(&config.transport)
            .map_err(|e| McpError::Validation(format!("transport: {e}")))?;
        Ok(StoredServer::new(
            config.name.clone(),
            config.description.clone(),
            transport,
        ))
    }

    fn from_record(record: &StoredServer) -> McpResult<McpServerConfig> {
        let transport: McpTransport = serde_json::from_value(record.transport.clone())
            .map_err(|e| McpError::Config(format!("stored transport: {e}")))?;
        Ok(McpServerConfig::new(record.name.clone(), transport)
            .with_description(record.description.clone()))
    }

    /// Persist a new server with its initial tool flags in one store operation.
    pub async fn create(&self, config: &McpServerConfig, flags: Vec<ToolState>) -> McpResult<()> {
        let record = Self::to_record(config)?;
        self.storage.create_server(record, flags).await?;
        self.servers
            .write()
            .insert(config.name.clone(), config.clone());
        Ok(())
    }

    /// Remove a server and its tool flags. Returns false if it was unknown.
    pub async fn delete(&self, name: &str) -> McpResult<bool> {
        let removed = self.storage.delete_server(name).await?;
        let cached = self.servers.write().remove(name).is_some();
        Ok(removed || cached)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<McpServerConfig> {
        self.servers.read().get(name).cloned()
    }

    /// All definitions sorted by name.
    pub fn list(&self) -> Vec<McpServerConfig> {
        self.servers.read().values().cloned().collect()
    }

    /// Persisted tool flags of one server, by local tool name.
    pub async fn tool_flags(&self, server_name: &str) -> McpResult<HashMap<String, bool>> {
        Ok(self
            .storage
            .list_tool_states(Some(server_name))
            .await?
            .into_iter()
            .map(|s| (s.tool_name, s.enabled))
            .collect())
    }

    pub async fn set_tool_flags(&self, flags: Vec<ToolState>) -> McpResult<()> {
        Ok(self.storage.set_tool_states(flags).await?)
    }

    pub async fn replace_tool_flags(&self, server_name: &str, flags: Vec<ToolState>) -> McpResult<()> {
        Ok(self.storage.replace_tool_states(server_name, flags).await?)
    }
}
