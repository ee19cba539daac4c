//! MCP configuration types and utilities.
//!
//! Defines upstream server definitions, their transports, and the gateway
//! timeouts and discovery policy.

use std::{collections::HashMap, fmt, time::Duration};

pub use rmcp::model::Tool;
use serde::{Deserialize, Serialize};

use crate::{
    error::{McpError, McpResult},
    inventory::SEPARATOR,
};

const REDACTED: &str = "****";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct McpConfig {
    /// Servers registered at startup when not already persisted
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,

    /// Upper bound for a single tool invocation or tool listing
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// TCP connect timeout for HTTP upstreams
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Retry budget for establishing HTTP upstream sessions
    #[serde(default = "default_connect_retry_max_elapsed_secs")]
    pub connect_retry_max_elapsed_secs: u64,

    /// Enabled flag given to newly discovered tools
    #[serde(default = "default_true")]
    pub enable_tools_on_discovery: bool,

    /// How long shutdown waits for in-flight invocations
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_connect_retry_max_elapsed_secs() -> u64 {
    15
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            call_timeout_secs: default_call_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_retry_max_elapsed_secs: default_connect_retry_max_elapsed_secs(),
            enable_tools_on_discovery: true,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl McpConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.connect_retry_max_elapsed_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.call_timeout_secs == 0 {
            return Err(McpError::Config("call_timeout_secs must be > 0".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(McpError::Config("connect_timeout_secs must be > 0".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.name.as_str()) {
                return Err(McpError::Config(format!(
                    "duplicate server '{}' in configuration",
                    server.name
                )));
            }
        }
        Ok(())
    }
}

/// Definition of one upstream tool server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct McpServerConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub transport: McpTransport,

    /// Only meaningful for servers seeded from the config file:
    /// - true: gateway startup fails if this server cannot be registered
    /// - false: log a warning and continue (default)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, transport: McpTransport) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            transport,
            required: false,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn validate(&self) -> McpResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(McpError::Validation("server name must not be empty".into()));
        }
        if name != self.name {
            return Err(McpError::Validation(format!(
                "server name '{}' has leading or trailing whitespace",
                self.name
            )));
        }
        if self.name.contains(SEPARATOR) {
            return Err(McpError::Validation(format!(
                "server name '{}' must not contain '{}'",
                self.name, SEPARATOR
            )));
        }
        self.transport.validate()
    }

    /// Copy safe to log or return to API callers.
    pub fn redacted(&self) -> Self {
        Self {
            transport: self.transport.redacted(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        /// Bearer token for Authorization header
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

impl McpTransport {
    pub fn kind(&self) -> &'static str {
        match self {
            McpTransport::Stdio { .. } => "stdio",
            McpTransport::StreamableHttp { .. } => "streamable_http",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, McpTransport::StreamableHttp { .. })
    }

    fn validate(&self) -> McpResult<()> {
        match self {
            McpTransport::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(McpError::Validation(
                        "stdio transport requires a command".into(),
                    ));
                }
            }
            McpTransport::StreamableHttp { url, token } => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| McpError::Validation(format!("invalid url '{url}': {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(McpError::Validation(format!(
                        "unsupported url scheme '{}'",
                        parsed.scheme()
                    )));
                }
                if token.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    return Err(McpError::Validation("bearer token must not be empty".into()));
                }
            }
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        match self {
            McpTransport::StreamableHttp { url, token } => McpTransport::StreamableHttp {
                url: url.clone(),
                token: token.as_ref().map(|_| REDACTED.to_string()),
            },
            stdio => stdio.clone(),
        }
    }
}

impl fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpTransport::Stdio { command, args, env } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("env", &format!("{} vars", env.len()))
                .finish(),
            McpTransport::StreamableHttp { url, token } => f
                .debug_struct("StreamableHttp")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| REDACTED))
                .finish(),
        }
    }
}
