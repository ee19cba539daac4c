//! Downstream MCP surface.
//!
//! [`ProxySurface`] holds the immutable snapshot of enabled tools advertised
//! to downstream clients. [`ProxySurfaceHandler`] serves that snapshot over
//! MCP and routes calls through the [`InvocationRouter`].

use std::{collections::HashSet, sync::Arc};

use arc_swap::ArcSwap;
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ErrorData, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    RoleServer, ServerHandler,
};
use serde_json::json;
use tracing::{debug, info};

use super::{config::Tool, router::InvocationRouter};
use crate::{
    error::{ErrorKind, McpError},
    inventory::ToolCatalog,
};

/// Tools advertised to downstream clients, under their qualified names.
#[derive(Debug, Default)]
pub struct SurfaceSnapshot {
    tools: Vec<Tool>,
    names: HashSet<String>,
}

impl SurfaceSnapshot {
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Published set of enabled tools, swapped atomically on every catalog change.
#[derive(Default)]
pub struct ProxySurface {
    snapshot: ArcSwap<SurfaceSnapshot>,
}

impl ProxySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from the catalog's enabled tools and publish it.
    pub fn reconcile(&self, catalog: &ToolCatalog) {
        let tools: Vec<Tool> = catalog
            .list_enabled()
            .iter()
            .map(|entry| entry.surfaced_tool())
            .collect();
        let names = tools.iter().map(|t| t.name.to_string()).collect();
        let count = tools.len();

        self.snapshot.store(Arc::new(SurfaceSnapshot { tools, names }));
        info!(tools = count, "Published proxy surface");
    }

    pub fn snapshot(&self) -> Arc<SurfaceSnapshot> {
        self.snapshot.load_full()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot.load().contains(name)
    }
}

/// MCP server handler exposing the current surface.
#[derive(Clone)]
pub struct ProxySurfaceHandler {
    surface: Arc<ProxySurface>,
    router: Arc<InvocationRouter>,
}

impl ProxySurfaceHandler {
    pub fn new(surface: Arc<ProxySurface>, router: Arc<InvocationRouter>) -> Self {
        Self { surface, router }
    }

    /// Streamable HTTP service for mounting under an axum router.
    pub fn streamable_http_service(self) -> StreamableHttpService<Self, LocalSessionManager> {
        StreamableHttpService::new(
            move || Ok(self.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        )
    }
}

fn to_error_data(err: &McpError) -> ErrorData {
    let message = err.to_string();
    let data = Some(json!({ "kind": err.kind() }));
    match err.kind() {
        ErrorKind::Validation => ErrorData::invalid_params(message, data),
        ErrorKind::NotFound => ErrorData::resource_not_found(message, data),
        ErrorKind::Disabled => ErrorData::invalid_request(message, data),
        _ => ErrorData::internal_error(message, data),
    }
}

impl ServerHandler for ProxySurfaceHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Tools are named <server>::<tool> and routed to the owning upstream server."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(
            self.surface.snapshot().tools().to_vec(),
        ))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let name = request.name.as_ref();
        if !self.surface.contains(name) {
            return Err(to_error_data(&McpError::ToolNotFound(name.to_string())));
        }

        let outcome = tokio::select! {
            _ = context.ct.cancelled() => {
                debug!(tool = %name, "Downstream cancelled tool call");
                return Err(ErrorData::internal_error("request cancelled", None));
            }
            outcome = self.router.invoke(name, request.arguments) => outcome,
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(McpError::ToolExecution(message)) => {
                Ok(CallToolResult::error(vec![Content::text(message)]))
            }
            Err(e) => Err(to_error_data(&e)),
        }
    }
}
