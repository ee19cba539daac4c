//! MCP gateway error types.
//!
//! Every failure carries a stable [`ErrorKind`] consumed by metrics and the
//! HTTP layer.

use std::{fmt, time::Duration};

use data_connector::StorageError;
use serde::Serialize;
use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Server already exists: {0}")]
    ServerExists(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool is disabled: {0}")]
    ToolDisabled(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Upstream reported a failure for the call itself.
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Disabled,
    Connection,
    Timeout,
    Permission,
    ToolError,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Disabled => "disabled",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permission => "permission",
            ErrorKind::ToolError => "tool_error",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl McpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Validation(_) | McpError::ServerExists(_) | McpError::Config(_) => {
                ErrorKind::Validation
            }
            McpError::ServerNotFound(_) | McpError::ToolNotFound(_) => ErrorKind::NotFound,
            McpError::ToolDisabled(_) => ErrorKind::Disabled,
            McpError::ConnectionFailed(_) => ErrorKind::Connection,
            McpError::Timeout { .. } => ErrorKind::Timeout,
            McpError::PermissionDenied(_) => ErrorKind::Permission,
            McpError::ToolExecution(_) => ErrorKind::ToolError,
            McpError::Storage(StorageError::AlreadyExists(_)) => ErrorKind::Validation,
            McpError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            McpError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        McpError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}
