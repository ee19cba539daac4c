//! Invocation routing.
//!
//! Resolves a qualified tool name to its owning server and forwards the call
//! over that server's shared client.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use rmcp::model::CallToolResult;
use tracing::{debug, warn};

use super::{
    client::{result_text, JsonObject, UpstreamClient},
    metrics::McpMetrics,
    pool::ClientPool,
    registry::ServerRegistry,
};
use crate::{
    error::{ErrorKind, McpError, McpResult},
    inventory::{QualifiedToolName, ToolCatalog, SEPARATOR},
};

pub struct InvocationRouter {
    catalog: Arc<ToolCatalog>,
    registry: Arc<ServerRegistry>,
    pool: Arc<ClientPool>,
    metrics: Arc<McpMetrics>,
    call_timeout: Duration,
    active_executions: Arc<AtomicUsize>,
}

impl InvocationRouter {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        registry: Arc<ServerRegistry>,
        pool: Arc<ClientPool>,
        metrics: Arc<McpMetrics>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            registry,
            pool,
            metrics,
            call_timeout,
            active_executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Invocations currently awaiting an upstream.
    pub fn active_executions(&self) -> usize {
        self.active_executions.load(Ordering::SeqCst)
    }

    /// Resolve `name` and forward the call. Never retried.
    ///
    /// A result flagged `isError` by the upstream is returned as
    /// [`McpError::ToolExecution`] carrying its text.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        let qualified = QualifiedToolName::parse(name).ok_or_else(|| {
            McpError::Validation(format!(
                "tool name '{name}' is not of the form server{SEPARATOR}tool"
            ))
        })?;

        let entry = match self.catalog.get(&qualified) {
            Some(entry) => entry,
            None => {
                self.metrics.record_error(ErrorKind::NotFound);
                return Err(McpError::ToolNotFound(qualified.to_string()));
            }
        };
        if !entry.enabled {
            self.metrics.record_error(ErrorKind::Disabled);
            return Err(McpError::ToolDisabled(qualified.to_string()));
        }

        self.active_executions.fetch_add(1, Ordering::SeqCst);
        let _active = scopeguard::guard(Arc::clone(&self.active_executions), |count| {
            count.fetch_sub(1, Ordering::SeqCst);
        });

        self.metrics.record_call_start(&qualified);
        let started = Instant::now();
        // Dropped without an outcome when the caller goes away mid-call.
        let mut outcome = scopeguard::guard(Some(ErrorKind::Connection), |outcome| {
            let elapsed = started.elapsed().as_millis() as u64;
            self.metrics.record_call_end(&qualified, outcome, elapsed);
        });

        let result = self.dispatch(&qualified, arguments).await;
        *outcome = result.as_ref().err().map(McpError::kind);

        match &result {
            Ok(_) => debug!(tool = %qualified, "Tool call succeeded"),
            Err(e) => warn!(tool = %qualified, kind = %e.kind(), error = %e, "Tool call failed"),
        }
        result
    }

    async fn dispatch(
        &self,
        qualified: &QualifiedToolName,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        let config = self
            .registry
            .get(qualified.server_name())
            .ok_or_else(|| McpError::ToolNotFound(qualified.to_string()))?;

        let client = self.pool.get_or_connect(&config).await?;
        let result = self.call_with_timeout(&client, qualified, arguments).await;

        if let Err(McpError::ConnectionFailed(_)) = &result {
            if !client.is_alive() {
                self.pool.evict(qualified.server_name(), &client).await;
            }
        }

        let result = result?;
        if result.is_error == Some(true) {
            return Err(McpError::ToolExecution(result_text(&result)));
        }
        Ok(result)
    }

    async fn call_with_timeout(
        &self,
        client: &Arc<dyn UpstreamClient>,
        qualified: &QualifiedToolName,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        tokio::time::timeout(
            self.call_timeout,
            client.call_tool(qualified.tool_name(), arguments),
        )
        .await
        .map_err(|_| McpError::timeout(format!("tools/call {qualified}"), self.call_timeout))?
    }
}
