//! Gateway core: transports, client pool, registry, router and surface.

pub mod client;
pub mod config;
pub mod handler;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod router;
pub mod surface;

pub use client::{ClientFactory, JsonObject, RmcpClientFactory, RmcpUpstreamClient, UpstreamClient};
pub use config::{McpConfig, McpServerConfig, McpTransport, Tool};
pub use handler::{GatewayClientHandler, RefreshRequest};
pub use manager::{McpManager, McpManagerStats};
pub use metrics::{LatencySnapshot, McpMetrics, MetricsSnapshot};
pub use pool::ClientPool;
pub use registry::ServerRegistry;
pub use router::InvocationRouter;
pub use surface::{ProxySurface, ProxySurfaceHandler, SurfaceSnapshot};
