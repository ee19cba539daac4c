use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{StorageError, StorageResult, StoredServer, ToolState};

/// In-process registry state shared by the memory and file backends.
///
/// Mutations are applied to a clone first by callers that need
/// all-or-nothing semantics across a fallible side effect (disk writes).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct RegistryState {
    #[serde(default)]
    servers: BTreeMap<String, StoredServer>,
    /// server name -> tool name -> enabled
    #[serde(default)]
    tools: BTreeMap<String, BTreeMap<String, bool>>,
}

impl RegistryState {
    pub fn create_server(
        &mut self,
        server: StoredServer,
        tools: Vec<ToolState>,
    ) -> StorageResult<()> {
        if self.servers.contains_key(&server.name) {
            return Err(StorageError::AlreadyExists(server.name));
        }
        let flags = tools
            .into_iter()
            .filter(|t| t.server_name == server.name)
            .map(|t| (t.tool_name, t.enabled))
            .collect();
        self.tools.insert(server.name.clone(), flags);
        self.servers.insert(server.name.clone(), server);
        Ok(())
    }

    pub fn delete_server(&mut self, name: &str) -> bool {
        self.tools.remove(name);
        self.servers.remove(name).is_some()
    }

    pub fn get_server(&self, name: &str) -> Option<StoredServer> {
        self.servers.get(name).cloned()
    }

    pub fn list_servers(&self) -> Vec<StoredServer> {
        self.servers.values().cloned().collect()
    }

    pub fn list_tool_states(&self, server_name: Option<&str>) -> Vec<ToolState> {
        self.tools
            .iter()
            .filter(|(server, _)| server_name.is_none_or(|s| s == server.as_str()))
            .flat_map(|(server, flags)| {
                flags
                    .iter()
                    .map(move |(tool, enabled)| ToolState::new(server, tool, *enabled))
            })
            .collect()
    }

    pub fn set_tool_states(&mut self, states: Vec<ToolState>) -> StorageResult<()> {
        if let Some(unknown) = states
            .iter()
            .find(|s| !self.servers.contains_key(&s.server_name))
        {
            return Err(StorageError::NotFound(unknown.server_name.clone()));
        }
        for state in states {
            self.tools
                .entry(state.server_name)
                .or_default()
                .insert(state.tool_name, state.enabled);
        }
        Ok(())
    }

    pub fn replace_tool_states(
        &mut self,
        server_name: &str,
        states: Vec<ToolState>,
    ) -> StorageResult<()> {
        if !self.servers.contains_key(server_name) {
            return Err(StorageError::NotFound(server_name.to_string()));
        }
        let flags = states
            .into_iter()
            .filter(|t| t.server_name == server_name)
            .map(|t| (t.tool_name, t.enabled))
            .collect();
        self.tools.insert(server_name.to_string(), flags);
        Ok(())
    }
}
