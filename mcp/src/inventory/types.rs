//! Core types for the tool catalog.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

use crate::core::config::Tool;

/// Reserved separator between server and tool in a qualified name.
pub const SEPARATOR: &str = "::";

/// Unique tool identifier: `server::tool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedToolName {
    pub server_name: String,
    pub tool_name: String,
}

impl QualifiedToolName {
    pub fn new(server_name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Parse from "server::tool" format, splitting at the first separator.
    ///
    /// Returns `None` if the separator is missing or either side is empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (server, tool) = s.split_once(SEPARATOR)?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self::new(server, tool))
    }

    #[inline]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    #[inline]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.server_name, SEPARATOR, self.tool_name)
    }
}

/// Catalog entry: the upstream descriptor plus its enabled flag.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub qualified_name: QualifiedToolName,
    /// Descriptor as advertised by the upstream, under its local name
    pub tool: Tool,
    pub enabled: bool,
}

impl ToolEntry {
    pub fn new(qualified_name: QualifiedToolName, tool: Tool, enabled: bool) -> Self {
        Self {
            qualified_name,
            tool,
            enabled,
        }
    }

    pub fn from_server_tool(server_name: impl Into<String>, tool: Tool, enabled: bool) -> Self {
        let name = tool.name.to_string();
        Self::new(QualifiedToolName::new(server_name, name), tool, enabled)
    }

    #[inline]
    pub fn server_name(&self) -> &str {
        self.qualified_name.server_name()
    }

    #[inline]
    pub fn tool_name(&self) -> &str {
        self.qualified_name.tool_name()
    }

    /// Descriptor as advertised downstream: renamed to the qualified name.
    pub fn surfaced_tool(&self) -> Tool {
        let mut tool = self.tool.clone();
        tool.name = Cow::Owned(self.qualified_name.to_string());
        tool
    }

    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.qualified_name.to_string(),
            server: self.server_name().to_string(),
            tool: self.tool_name().to_string(),
            enabled: self.enabled,
            description: self.tool.description.as_ref().map(|d| d.to_string()),
            input_schema: serde_json::Value::Object((*self.tool.input_schema).clone()),
        }
    }
}

/// Serializable view of a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInfo {
    /// Qualified name
    pub name: String,
    pub server: String,
    /// Local name on the upstream server
    pub tool: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}
