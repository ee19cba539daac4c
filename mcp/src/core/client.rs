//! Upstream transport clients.
//!
//! [`UpstreamClient`] is the capability surface the gateway needs from an
//! upstream server regardless of transport. [`RmcpClientFactory`] builds the
//! rmcp-backed implementation for stdio subprocesses and streamable HTTP.

use std::{
    borrow::Cow,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use parking_lot::Mutex;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, RawContent},
    service::{ClientInitializeError, Peer, RunningService, ServiceError},
    transport::{
        streamable_http_client::{StreamableHttpClientTransportConfig, StreamableHttpError},
        ConfigureCommandExt, DynamicTransportError, StreamableHttpClientTransport,
        TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    config::{McpConfig, McpServerConfig, McpTransport, Tool},
    handler::{GatewayClientHandler, RefreshRequest},
};
use crate::error::{McpError, McpResult};

pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Tool capabilities of one upstream server.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// List every tool the server advertises (all pages).
    async fn list_tools(&self) -> McpResult<Vec<Tool>>;

    /// Call a tool by its local name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult>;

    /// False once the underlying session is known to be unusable.
    fn is_alive(&self) -> bool {
        true
    }

    /// Shut the session down. Further calls fail with a connection error.
    async fn close(&self) {}
}

/// Builds clients from server definitions.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        config: &McpServerConfig,
        refresh_tx: mpsc::Sender<RefreshRequest>,
    ) -> McpResult<Arc<dyn UpstreamClient>>;
}

type McpClient = RunningService<RoleClient, GatewayClientHandler>;

/// rmcp-backed client for either transport.
pub struct RmcpUpstreamClient {
    server_name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<McpClient>>,
    dead: AtomicBool,
}

impl RmcpUpstreamClient {
    fn new(server_name: impl Into<String>, service: McpClient) -> Self {
        Self {
            server_name: server_name.into(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            dead: AtomicBool::new(false),
        }
    }

    fn classify(&self, operation: &str, err: ServiceError) -> McpError {
        let classified = classify_service_error(&self.server_name, operation, err);
        if matches!(classified, McpError::ConnectionFailed(_)) {
            self.dead.store(true, Ordering::Release);
        }
        classified
    }
}

#[async_trait]
impl UpstreamClient for RmcpUpstreamClient {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.peer
            .list_all_tools()
            .await
            .map_err(|e| self.classify("tools/list", e))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        if !self.is_alive() {
            return Err(McpError::ConnectionFailed(format!(
                "{}: session closed",
                self.server_name
            )));
        }
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };
        self.peer
            .call_tool(request)
            .await
            .map_err(|e| self.classify("tools/call", e))
    }

    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::Acquire) && !self.peer.is_transport_closed()
    }

    async fn close(&self) {
        self.dead.store(true, Ordering::Release);
        let service = self.service.lock().take();
        if let Some(service) = service {
            if let Err(e) = service.cancel().await {
                warn!(server = %self.server_name, error = %e, "Error closing upstream session");
            }
        }
    }
}

/// True when a streamable HTTP upstream answered 401 or 403.
fn rejected_credentials(error: &DynamicTransportError) -> bool {
    match error.error.downcast_ref::<StreamableHttpError<reqwest::Error>>() {
        Some(StreamableHttpError::AuthRequired(_)) => true,
        Some(StreamableHttpError::Client(e)) => e.status().is_some_and(|status| {
            status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        }),
        _ => false,
    }
}

fn classify_init_error(server: &str, err: ClientInitializeError) -> McpError {
    let auth_rejected = matches!(
        &err,
        ClientInitializeError::TransportError { error, .. } if rejected_credentials(error)
    );
    let msg = format!("{server}: initialize: {err}");
    if auth_rejected {
        McpError::PermissionDenied(msg)
    } else {
        McpError::ConnectionFailed(msg)
    }
}

/// Map an rmcp service error onto the gateway taxonomy.
pub(crate) fn classify_service_error(server: &str, operation: &str, err: ServiceError) -> McpError {
    match err {
        ServiceError::McpError(data) => McpError::ToolExecution(data.message.to_string()),
        ServiceError::TransportClosed => {
            McpError::ConnectionFailed(format!("{server}: transport closed during {operation}"))
        }
        ServiceError::TransportSend(e) => {
            let auth_rejected = rejected_credentials(&e);
            let msg = format!("{server}: {operation}: {e}");
            if auth_rejected {
                McpError::PermissionDenied(msg)
            } else {
                McpError::ConnectionFailed(msg)
            }
        }
        ServiceError::UnexpectedResponse => {
            McpError::Validation(format!("{server}: malformed response to {operation}"))
        }
        ServiceError::Timeout { timeout } => {
            McpError::timeout(format!("{server}: {operation}"), timeout)
        }
        ServiceError::Cancelled { .. } => {
            McpError::ConnectionFailed(format!("{server}: {operation} cancelled"))
        }
        other => McpError::ConnectionFailed(format!("{server}: {operation}: {other}")),
    }
}

/// Concatenated text content of a tool result.
pub(crate) fn result_text(result: &CallToolResult) -> String {
    let text: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect();
    if text.is_empty() {
        "tool reported an error".to_string()
    } else {
        text.join("\n")
    }
}

/// Connects rmcp clients over stdio or streamable HTTP.
#[derive(Debug, Clone)]
pub struct RmcpClientFactory {
    connect_timeout: Duration,
    init_timeout: Duration,
    retry_max_elapsed: Duration,
}

impl RmcpClientFactory {
    pub fn new(config: &McpConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            init_timeout: config.call_timeout(),
            retry_max_elapsed: config.connect_retry_max_elapsed(),
        }
    }

    /// Connect with exponential backoff retry for remote servers
    async fn connect_with_retry(
        &self,
        config: &McpServerConfig,
        refresh_tx: &mpsc::Sender<RefreshRequest>,
    ) -> McpResult<McpClient> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(self.retry_max_elapsed))
            .build();

        backoff::future::retry(backoff, || async {
            match self.connect_once(config, refresh_tx.clone()).await {
                Ok(client) => Ok(client),
                Err(e) if Self::is_permanent_error(&e) => {
                    error!(server = %config.name, error = %e, "Permanent connect error, not retrying");
                    Err(backoff::Error::permanent(e))
                }
                Err(e) => {
                    warn!(server = %config.name, error = %e, "Failed to connect, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
    }

    fn is_permanent_error(error: &McpError) -> bool {
        matches!(
            error,
            McpError::Validation(_) | McpError::Config(_) | McpError::PermissionDenied(_)
        )
    }

    async fn connect_once(
        &self,
        config: &McpServerConfig,
        refresh_tx: mpsc::Sender<RefreshRequest>,
    ) -> McpResult<McpClient> {
        let handler = GatewayClientHandler::new(&config.name).with_refresh_channel(refresh_tx);
        let operation = format!("initialize {}", config.name);

        match &config.transport {
            McpTransport::Stdio { command, args, env } => {
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args)
                            .envs(env.iter())
                            .stderr(Stdio::inherit());
                    }),
                )
                .map_err(|e| McpError::ConnectionFailed(format!("spawn '{command}': {e}")))?;

                tokio::time::timeout(self.init_timeout, handler.serve(transport))
                    .await
                    .map_err(|_| McpError::timeout(operation, self.init_timeout))?
                    .map_err(|e| classify_init_error(&config.name, e))
            }

            McpTransport::StreamableHttp { url, token } => {
                let http_client = build_http_client(token.as_deref(), self.connect_timeout)?;
                let cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                let transport = StreamableHttpClientTransport::with_client(http_client, cfg);

                tokio::time::timeout(self.init_timeout, handler.serve(transport))
                    .await
                    .map_err(|_| McpError::timeout(operation, self.init_timeout))?
                    .map_err(|e| classify_init_error(&config.name, e))
            }
        }
    }
}

#[async_trait]
impl ClientFactory for RmcpClientFactory {
    async fn connect(
        &self,
        config: &McpServerConfig,
        refresh_tx: mpsc::Sender<RefreshRequest>,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        debug!(server = %config.name, transport = ?config.transport, "Connecting to upstream");

        let service = if config.transport.is_remote() {
            self.connect_with_retry(config, &refresh_tx).await?
        } else {
            self.connect_once(config, refresh_tx).await?
        };

        info!(server = %config.name, kind = config.transport.kind(), "Connected to upstream");
        Ok(Arc::new(RmcpUpstreamClient::new(&config.name, service)))
    }
}

fn build_http_client(token: Option<&str>, connect_timeout: Duration) -> McpResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);

    if let Some(token) = token {
        let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| McpError::Validation(format!("auth token: {e}")))?;
        value.set_sensitive(true);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| McpError::Config(format!("build HTTP client: {e}")))
}
