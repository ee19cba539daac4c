//! MCP tool registry and invocation router.
//!
//! ## Modules
//!
//! - [`core`]: transports, client pool, server registry, router, proxy surface
//! - [`inventory`]: tool catalog and qualified naming
//! - [`error`]: error taxonomy shared by every layer

pub mod core;
pub mod error;
pub mod inventory;

pub use crate::core::{
    ClientFactory, InvocationRouter, JsonObject, LatencySnapshot, McpConfig, McpManager,
    McpManagerStats, McpMetrics, McpServerConfig, McpTransport, MetricsSnapshot, ProxySurface,
    ProxySurfaceHandler, RefreshRequest, RmcpClientFactory, Tool, UpstreamClient,
};
pub use error::{ErrorKind, McpError, McpResult};
pub use inventory::{QualifiedToolName, ToolCatalog, ToolEntry, ToolInfo, SEPARATOR};
