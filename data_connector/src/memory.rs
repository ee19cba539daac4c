//! In-memory registry storage.
//!
//! Default backend; state is lost on restart.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    common::RegistryState,
    core::{RegistryStorage, StorageResult, StoredServer, ToolState},
};

#[derive(Default)]
pub struct MemoryRegistryStorage {
    state: RwLock<RegistryState>,
}

impl MemoryRegistryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStorage for MemoryRegistryStorage {
    async fn create_server(
        &self,
        server: StoredServer,
        tools: Vec<ToolState>,
    ) -> StorageResult<()> {
        self.state.write().create_server(server, tools)
    }

    async fn delete_server(&self, name: &str) -> StorageResult<bool> {
        Ok(self.state.write().delete_server(name))
    }

    async fn get_server(&self, name: &str) -> StorageResult<Option<StoredServer>> {
        Ok(self.state.read().get_server(name))
    }

    async fn list_servers(&self) -> StorageResult<Vec<StoredServer>> {
        Ok(self.state.read().list_servers())
    }

    async fn list_tool_states(&self, server_name: Option<&str>) -> StorageResult<Vec<ToolState>> {
        Ok(self.state.read().list_tool_states(server_name))
    }

    async fn set_tool_states(&self, states: Vec<ToolState>) -> StorageResult<()> {
        self.state.write().set_tool_states(states)
    }

    async fn replace_tool_states(
        &self,
        server_name: &str,
        states: Vec<ToolState>,
    ) -> StorageResult<()> {
        self.state.write().replace_tool_states(server_name, states)
    }
}
