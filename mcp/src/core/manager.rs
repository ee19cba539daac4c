//! Gateway facade.
//!
//! `McpManager` owns the registry, catalog, client pool, router and proxy
//! surface, and serializes every administrative mutation behind one async
//! lock. Reads and invocations never take that lock.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use data_connector::{RegistryStorage, ToolState};
use rmcp::model::CallToolResult;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    client::{ClientFactory, JsonObject, RmcpClientFactory, UpstreamClient},
    config::{McpConfig, McpServerConfig, Tool},
    handler::RefreshRequest,
    metrics::{McpMetrics, MetricsSnapshot},
    pool::ClientPool,
    registry::ServerRegistry,
    router::InvocationRouter,
    surface::{ProxySurface, ProxySurfaceHandler},
};
use crate::{
    error::{McpError, McpResult},
    inventory::{QualifiedToolName, ToolCatalog, ToolEntry, ToolInfo, SEPARATOR},
};

const REFRESH_QUEUE_CAPACITY: usize = 64;

/// Counts reported by [`McpManager::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct McpManagerStats {
    pub servers: usize,
    pub tools: usize,
    pub enabled_tools: usize,
    pub surfaced_tools: usize,
    pub active_executions: usize,
}

pub struct McpManager {
    config: McpConfig,
    registry: Arc<ServerRegistry>,
    catalog: Arc<ToolCatalog>,
    pool: Arc<ClientPool>,
    router: Arc<InvocationRouter>,
    surface: Arc<ProxySurface>,
    metrics: Arc<McpMetrics>,
    mutations: Mutex<()>,
    shutdown_token: CancellationToken,
}

impl McpManager {
    /// Build the gateway over `storage`, restore persisted servers and
    /// register any configured servers that are not yet persisted.
    pub async fn new(
        config: McpConfig,
        storage: Arc<dyn RegistryStorage>,
        factory: Arc<dyn ClientFactory>,
    ) -> McpResult<Arc<Self>> {
        config.validate()?;

        let metrics = Arc::new(McpMetrics::new());
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
        let registry = Arc::new(ServerRegistry::new(storage));
        let catalog = Arc::new(ToolCatalog::new());
        let pool = Arc::new(ClientPool::new(factory, refresh_tx, Arc::clone(&metrics)));
        let router = Arc::new(InvocationRouter::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&pool),
            Arc::clone(&metrics),
            config.call_timeout(),
        ));

        let manager = Arc::new(Self {
            config,
            registry,
            catalog,
            pool,
            router,
            surface: Arc::new(ProxySurface::new()),
            metrics,
            mutations: Mutex::new(()),
            shutdown_token: CancellationToken::new(),
        });

        manager.restore().await?;
        manager.register_configured().await?;
        manager.surface.reconcile(&manager.catalog);
        manager.spawn_refresh_handler(refresh_rx);

        Ok(manager)
    }

    /// [`McpManager::new`] with the rmcp stdio / streamable HTTP transports.
    pub async fn with_rmcp(
        config: McpConfig,
        storage: Arc<dyn RegistryStorage>,
    ) -> McpResult<Arc<Self>> {
        let factory = Arc::new(RmcpClientFactory::new(&config));
        Self::new(config, storage, factory).await
    }

    // ========================================================================
    // Startup
    // ========================================================================

    async fn restore(&self) -> McpResult<()> {
        let servers = self.registry.load().await?;
        if servers.is_empty() {
            info!("No persisted MCP servers");
            return Ok(());
        }

        for config in servers {
            let stored = self.registry.tool_flags(&config.name).await?;
            match self.discover(&config).await {
                Ok((client, tools)) => {
                    let entries = self.entries_with_flags(&config.name, tools, &stored);
                    self.registry
                        .replace_tool_flags(&config.name, flags_of(&entries))
                        .await?;
                    info!(server = %config.name, tools = entries.len(), "Restored server");
                    self.catalog.replace_server_tools(&config.name, entries);
                    self.pool.install(&config.name, client).await;
                }
                Err(e) => {
                    warn!(
                        server = %config.name,
                        error = %e,
                        "Persisted server unreachable, keeping it registered without tools"
                    );
                    self.catalog.replace_server_tools(&config.name, Vec::new());
                }
            }
        }
        Ok(())
    }

    async fn register_configured(&self) -> McpResult<()> {
        for server in self.config.servers.clone() {
            if self.registry.contains(&server.name) {
                debug!(server = %server.name, "Configured server already registered");
                continue;
            }
            let required = server.required;
            let name = server.name.clone();
            match self.register(server).await {
                Ok(_) => {}
                Err(e) if required => {
                    error!(server = %name, error = %e, "Required server failed to register");
                    return Err(McpError::Config(format!(
                        "required server '{name}' failed to register: {e}"
                    )));
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "Configured server failed to register");
                }
            }
        }
        Ok(())
    }

    /// Queue consumer for upstream "tool list changed" notifications.
    fn spawn_refresh_handler(self: &Arc<Self>, mut rx: mpsc::Receiver<RefreshRequest>) {
        let token = self.shutdown_token.clone();
        let manager = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Refresh handler shutting down");
                        break;
                    }
                    Some(request) = rx.recv() => {
                        let Some(manager) = manager.upgrade() else { break };
                        match manager.refresh_server(&request.server_name).await {
                            Ok(tools) => info!(
                                server = %request.server_name,
                                tools = tools.len(),
                                "Refreshed tools after upstream change"
                            ),
                            Err(e) => warn!(
                                server = %request.server_name,
                                error = %e,
                                "Background refresh failed"
                            ),
                        }
                    }
                    else => break,
                }
            }
        });
    }

    // ========================================================================
    // Discovery helpers
    // ========================================================================

    /// Connect a fresh client and list its tools. The client is closed if
    /// listing or validation fails.
    async fn discover(
        &self,
        config: &McpServerConfig,
    ) -> McpResult<(Arc<dyn UpstreamClient>, Vec<Tool>)> {
        let client = self
            .pool
            .connect_detached(config)
            .await
            .inspect_err(|e| self.metrics.record_error(e.kind()))?;
        let listed = self
            .list_upstream_tools(&config.name, &client)
            .await
            .and_then(|tools| validate_tool_set(&config.name, tools));
        match listed {
            Ok(tools) => Ok((client, tools)),
            Err(e) => {
                self.pool.discard(client).await;
                Err(e)
            }
        }
    }

    async fn list_upstream_tools(
        &self,
        server_name: &str,
        client: &Arc<dyn UpstreamClient>,
    ) -> McpResult<Vec<Tool>> {
        let timeout = self.config.call_timeout();
        tokio::time::timeout(timeout, client.list_tools())
            .await
            .map_err(|_| McpError::timeout(format!("tools/list {server_name}"), timeout))?
    }

    /// Pair tools with their persisted flag, or the discovery default.
    fn entries_with_flags(
        &self,
        server_name: &str,
        tools: Vec<Tool>,
        stored: &HashMap<String, bool>,
    ) -> Vec<ToolEntry> {
        tools
            .into_iter()
            .map(|tool| {
                let enabled = stored
                    .get(&*tool.name)
                    .copied()
                    .unwrap_or(self.config.enable_tools_on_discovery);
                ToolEntry::from_server_tool(server_name, tool, enabled)
            })
            .collect()
    }

    // ========================================================================
    // Server administration
    // ========================================================================

    /// Register an upstream server and discover its tools.
    ///
    /// Nothing is persisted or published unless every step succeeds.
    pub async fn register(&self, config: McpServerConfig) -> McpResult<McpServerConfig> {
        config.validate()?;
        if self.registry.contains(&config.name) {
            return Err(McpError::ServerExists(config.name));
        }

        let (client, tools) = self.discover(&config).await?;

        let _guard = self.mutations.lock().await;
        if self.registry.contains(&config.name) {
            self.pool.discard(client).await;
            return Err(McpError::ServerExists(config.name));
        }

        let entries: Vec<ToolEntry> = tools
            .into_iter()
            .map(|tool| {
                ToolEntry::from_server_tool(
                    &config.name,
                    tool,
                    self.config.enable_tools_on_discovery,
                )
            })
            .collect();

        if let Err(e) = self.registry.create(&config, flags_of(&entries)).await {
            self.pool.discard(client).await;
            return Err(e);
        }

        // Cache the client before the tools become invocable.
        let tool_count = entries.len();
        self.pool.install(&config.name, client).await;
        self.catalog.replace_server_tools(&config.name, entries);
        self.surface.reconcile(&self.catalog);
        self.metrics.record_server_registered();

        info!(
            server = %config.name,
            transport = config.transport.kind(),
            tools = tool_count,
            "Registered server"
        );
        Ok(config.redacted())
    }

    /// Remove a server, its tools and its persisted flags.
    pub async fn deregister(&self, name: &str) -> McpResult<()> {
        let _guard = self.mutations.lock().await;
        if !self.registry.contains(name) {
            return Err(McpError::ServerNotFound(name.to_string()));
        }

        let removed = self.catalog.list_by_server(name).unwrap_or_default();
        self.catalog.remove_server(name);

        if let Err(e) = self.registry.delete(name).await {
            self.catalog.replace_server_tools(name, removed);
            return Err(e);
        }

        self.pool.release(name).await;
        self.surface.reconcile(&self.catalog);
        self.metrics.record_server_deregistered();

        info!(server = %name, tools = removed.len(), "Deregistered server");
        Ok(())
    }

    /// All servers sorted by name, credentials redacted.
    pub fn list_servers(&self) -> Vec<McpServerConfig> {
        self.registry.list().iter().map(McpServerConfig::redacted).collect()
    }

    pub fn get_server(&self, name: &str) -> McpResult<McpServerConfig> {
        self.registry
            .get(name)
            .map(|c| c.redacted())
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))
    }

    /// Re-list a server's tools and replace its tool set.
    ///
    /// Surviving tools keep their flags, new tools get the discovery default.
    pub async fn refresh_server(&self, name: &str) -> McpResult<Vec<ToolInfo>> {
        let config = self
            .registry
            .get(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;

        let client = self
            .pool
            .get_or_connect(&config)
            .await
            .inspect_err(|e| self.metrics.record_error(e.kind()))?;
        let tools = match self.list_upstream_tools(name, &client).await {
            Ok(tools) => validate_tool_set(name, tools)?,
            Err(e) => {
                if !client.is_alive() {
                    self.pool.evict(name, &client).await;
                }
                return Err(e);
            }
        };

        let _guard = self.mutations.lock().await;
        if !self.registry.contains(name) {
            return Err(McpError::ServerNotFound(name.to_string()));
        }

        let stored = self.registry.tool_flags(name).await?;
        let entries = self.entries_with_flags(name, tools, &stored);
        self.registry
            .replace_tool_flags(name, flags_of(&entries))
            .await?;
        self.catalog.replace_server_tools(name, entries);
        self.surface.reconcile(&self.catalog);

        let tools = self.server_tools(name);
        info!(server = %name, tools = tools.len(), "Refreshed server tools");
        Ok(tools)
    }

    // ========================================================================
    // Tool catalog
    // ========================================================================

    /// Every tool with its enabled flag, sorted by qualified name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.catalog.list().iter().map(ToolEntry::info).collect()
    }

    pub fn list_tools_by_server(&self, server_name: &str) -> McpResult<Vec<ToolInfo>> {
        if !self.registry.contains(server_name) {
            return Err(McpError::ServerNotFound(server_name.to_string()));
        }
        Ok(self.server_tools(server_name))
    }

    fn server_tools(&self, server_name: &str) -> Vec<ToolInfo> {
        self.catalog
            .list_by_server(server_name)
            .unwrap_or_default()
            .iter()
            .map(ToolEntry::info)
            .collect()
    }

    pub fn get_tool(&self, qualified_name: &str) -> McpResult<ToolInfo> {
        QualifiedToolName::parse(qualified_name)
            .and_then(|q| self.catalog.get(&q))
            .map(|entry| entry.info())
            .ok_or_else(|| McpError::ToolNotFound(qualified_name.to_string()))
    }

    pub async fn enable_tools(&self, entity: &str) -> McpResult<Vec<String>> {
        self.set_enabled(entity, true).await
    }

    pub async fn disable_tools(&self, entity: &str) -> McpResult<Vec<String>> {
        self.set_enabled(entity, false).await
    }

    /// Set the enabled flag of every tool `entity` resolves to.
    ///
    /// `entity` is a server name (all of its tools) or a qualified tool
    /// name. Returns the affected qualified names, sorted.
    pub async fn set_enabled(&self, entity: &str, enabled: bool) -> McpResult<Vec<String>> {
        let _guard = self.mutations.lock().await;

        let targets = self.resolve_entity(entity)?;
        let flags = targets
            .iter()
            .map(|q| ToolState::new(q.server_name(), q.tool_name(), enabled))
            .collect();
        self.registry.set_tool_flags(flags).await?;

        let touched = self.catalog.set_enabled(&targets, enabled);
        self.surface.reconcile(&self.catalog);
        self.metrics.record_tools_toggled(touched.len(), enabled);

        info!(entity = %entity, enabled, tools = touched.len(), "Updated tool availability");
        Ok(touched.iter().map(ToString::to_string).collect())
    }

    fn resolve_entity(&self, entity: &str) -> McpResult<Vec<QualifiedToolName>> {
        if self.registry.contains(entity) {
            let targets: Vec<QualifiedToolName> = self
                .catalog
                .list_by_server(entity)
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.qualified_name)
                .collect();
            if targets.is_empty() {
                return Err(McpError::Validation(format!(
                    "server '{entity}' has no tools"
                )));
            }
            return Ok(targets);
        }

        QualifiedToolName::parse(entity)
            .filter(|q| self.catalog.get(q).is_some())
            .map(|q| vec![q])
            .ok_or_else(|| {
                McpError::Validation(format!("no server or tool named '{entity}'"))
            })
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke a tool by qualified name.
    pub async fn invoke(
        &self,
        qualified_name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        self.router.invoke(qualified_name, arguments).await
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// MCP server handler for the downstream surface.
    pub fn proxy_handler(&self) -> ProxySurfaceHandler {
        ProxySurfaceHandler::new(Arc::clone(&self.surface), Arc::clone(&self.router))
    }

    pub fn surface(&self) -> Arc<ProxySurface> {
        Arc::clone(&self.surface)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stats(&self) -> McpManagerStats {
        let (tools, enabled_tools) = self.catalog.counts();
        McpManagerStats {
            servers: self.registry.list().len(),
            tools,
            enabled_tools,
            surfaced_tools: self.surface.snapshot().len(),
            active_executions: self.router.active_executions(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop background work, wait for in-flight invocations (bounded) and
    /// close every upstream session.
    pub async fn shutdown(&self) {
        info!("Starting graceful shutdown of McpManager");
        self.shutdown_token.cancel();

        let start = Instant::now();
        let timeout = self.config.shutdown_timeout();
        while self.router.active_executions() > 0 {
            if start.elapsed() >= timeout {
                warn!(
                    active = self.router.active_executions(),
                    "Shutdown timeout reached with invocations still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.pool.close_all().await;
        info!("McpManager shutdown complete");
    }
}

fn flags_of(entries: &[ToolEntry]) -> Vec<ToolState> {
    entries
        .iter()
        .map(|e| ToolState::new(e.server_name(), e.tool_name(), e.enabled))
        .collect()
}

/// Reject listings the catalog cannot index unambiguously.
fn validate_tool_set(server_name: &str, tools: Vec<Tool>) -> McpResult<Vec<Tool>> {
    let mut seen = HashSet::with_capacity(tools.len());
    for tool in &tools {
        let name: &str = &tool.name;
        if name.trim().is_empty() {
            return Err(McpError::Validation(format!(
                "server '{server_name}' advertised a tool with an empty name"
            )));
        }
        if name.contains(SEPARATOR) {
            return Err(McpError::Validation(format!(
                "server '{server_name}' tool '{name}' contains '{SEPARATOR}'"
            )));
        }
        if !seen.insert(name) {
            return Err(McpError::Validation(format!(
                "server '{server_name}' advertised tool '{name}' more than once"
            )));
        }
    }
    Ok(tools)
}
