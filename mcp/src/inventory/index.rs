//! Qualified tool index.
//!
//! In-memory projection of every tool advertised by every registered server.
//! Entries are keyed by qualified name and sorted; a per-server index keeps
//! the tool set of each server, including servers that currently have none.
//! All reads take a shared lock and observe a consistent state.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use super::types::{QualifiedToolName, ToolEntry};

#[derive(Default)]
struct CatalogState {
    tools: BTreeMap<QualifiedToolName, ToolEntry>,
    by_server: BTreeMap<String, BTreeSet<String>>,
}

impl CatalogState {
    fn remove_server(&mut self, server_name: &str) -> usize {
        let Some(names) = self.by_server.remove(server_name) else {
            return 0;
        };
        for tool_name in &names {
            self.tools
                .remove(&QualifiedToolName::new(server_name, tool_name.as_str()));
        }
        names.len()
    }
}

#[derive(Default)]
pub struct ToolCatalog {
    state: RwLock<CatalogState>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole tool set of a server in one step.
    ///
    /// Entries owned by other servers are ignored.
    pub fn replace_server_tools(&self, server_name: &str, entries: Vec<ToolEntry>) {
        let mut state = self.state.write();
        state.remove_server(server_name);
        let names = state.by_server.entry(server_name.to_string()).or_default();
        let mut owned = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.server_name() == server_name {
                names.insert(entry.tool_name().to_string());
                owned.push(entry);
            }
        }
        for entry in owned {
            state.tools.insert(entry.qualified_name.clone(), entry);
        }
    }

    /// Drop a server and all of its tools. Returns the number of tools removed.
    pub fn remove_server(&self, server_name: &str) -> usize {
        self.state.write().remove_server(server_name)
    }

    pub fn get(&self, name: &QualifiedToolName) -> Option<ToolEntry> {
        self.state.read().tools.get(name).cloned()
    }

    /// All tools sorted by qualified name.
    pub fn list(&self) -> Vec<ToolEntry> {
        self.state.read().tools.values().cloned().collect()
    }

    /// Tools of one server sorted by qualified name, `None` if the server is unknown.
    pub fn list_by_server(&self, server_name: &str) -> Option<Vec<ToolEntry>> {
        let state = self.state.read();
        let names = state.by_server.get(server_name)?;
        Some(
            names
                .iter()
                .filter_map(|tool| {
                    state
                        .tools
                        .get(&QualifiedToolName::new(server_name, tool.as_str()))
                        .cloned()
                })
                .collect(),
        )
    }

    pub fn list_enabled(&self) -> Vec<ToolEntry> {
        self.state
            .read()
            .tools
            .values()
            .filter(|e| e.enabled)
            .cloned()
            .collect()
    }

    /// Set the enabled flag on each named tool; unknown names are skipped.
    /// Returns the names that exist, in sorted order.
    pub fn set_enabled(&self, names: &[QualifiedToolName], enabled: bool) -> Vec<QualifiedToolName> {
        let mut state = self.state.write();
        let mut touched: Vec<QualifiedToolName> = names
            .iter()
            .filter_map(|name| {
                state.tools.get_mut(name).map(|entry| {
                    entry.enabled = enabled;
                    name.clone()
                })
            })
            .collect();
        touched.sort();
        touched.dedup();
        touched
    }

    /// Returns (total tools, enabled tools).
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.read();
        let enabled = state.tools.values().filter(|e| e.enabled).count();
        (state.tools.len(), enabled)
    }
}
