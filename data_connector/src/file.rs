//! JSON snapshot file storage.
//!
//! The whole registry lives in one JSON document. Every mutation is applied
//! to a copy of the state, written to a sibling temp file and renamed over
//! the snapshot; the in-memory state only advances once the rename succeeds.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    common::RegistryState,
    core::{RegistryStorage, StorageResult, StoredServer, ToolState},
};

pub struct FileRegistryStorage {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl FileRegistryStorage {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => RegistryState::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened registry snapshot");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &RegistryState) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `f` to a copy of the state, persist it, then commit.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl RegistryStorage for FileRegistryStorage {
    async fn create_server(
        &self,
        server: StoredServer,
        tools: Vec<ToolState>,
    ) -> StorageResult<()> {
        self.mutate(|s| s.create_server(server, tools)).await
    }

    async fn delete_server(&self, name: &str) -> StorageResult<bool> {
        let mut guard = self.state.lock().await;
        if guard.get_server(name).is_none() {
            return Ok(false);
        }
        let mut next = guard.clone();
        next.delete_server(name);
        self.persist(&next).await?;
        *guard = next;
        Ok(true)
    }

    async fn get_server(&self, name: &str) -> StorageResult<Option<StoredServer>> {
        Ok(self.state.lock().await.get_server(name))
    }

    async fn list_servers(&self) -> StorageResult<Vec<StoredServer>> {
        Ok(self.state.lock().await.list_servers())
    }

    async fn list_tool_states(&self, server_name: Option<&str>) -> StorageResult<Vec<ToolState>> {
        Ok(self.state.lock().await.list_tool_states(server_name))
    }

    async fn set_tool_states(&self, states: Vec<ToolState>) -> StorageResult<()> {
        if states.is_empty() {
            return Ok(());
        }
        self.mutate(|s| s.set_tool_states(states)).await
    }

    async fn replace_tool_states(
        &self,
        server_name: &str,
        states: Vec<ToolState>,
    ) -> StorageResult<()> {
        self.mutate(|s| s.replace_tool_states(server_name, states))
            .await
    }
}
