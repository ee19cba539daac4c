//! Client handler for upstream MCP server notifications.
//!
//! Implements RMCP's `ClientHandler` trait to handle:
//! - Tool list change notifications (queued as catalog refresh requests)
//! - Logging and progress notifications

use std::sync::Arc;

use rmcp::{
    model::{
        CancelledNotificationParam, ClientInfo, LoggingLevel, LoggingMessageNotificationParam,
        ProgressNotificationParam,
    },
    service::NotificationContext,
    ClientHandler, RoleClient,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Request to refresh one server's catalog entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub server_name: String,
}

#[derive(Clone)]
pub struct GatewayClientHandler {
    server_name: Arc<str>,
    client_info: ClientInfo,
    refresh_tx: Option<mpsc::Sender<RefreshRequest>>,
}

impl GatewayClientHandler {
    pub fn new(server_name: impl AsRef<str>) -> Self {
        let mut client_info = ClientInfo::default();
        client_info.client_info.name = "mcp-gateway".to_string();
        client_info.client_info.version = env!("CARGO_PKG_VERSION").to_string();

        Self {
            server_name: Arc::from(server_name.as_ref()),
            client_info,
            refresh_tx: None,
        }
    }

    #[must_use]
    pub fn with_refresh_channel(mut self, tx: mpsc::Sender<RefreshRequest>) -> Self {
        self.refresh_tx = Some(tx);
        self
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    fn send_refresh(&self) {
        if let Some(tx) = &self.refresh_tx {
            let _ = tx
                .try_send(RefreshRequest {
                    server_name: self.server_name.to_string(),
                })
                .map_err(|e| {
                    warn!(
                        server = %self.server_name,
                        error = %e,
                        "Failed to queue refresh request"
                    );
                });
        }
    }
}

impl ClientHandler for GatewayClientHandler {
    async fn on_cancelled(
        &self,
        params: CancelledNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        info!(
            server = %self.server_name,
            request_id = %params.request_id,
            reason = ?params.reason,
            "Upstream cancelled request"
        );
    }

    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            server = %self.server_name,
            token = ?params.progress_token,
            progress = %params.progress,
            total = ?params.total,
            "Upstream progress"
        );
    }

    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        info!(server = %self.server_name, "Upstream tool list changed");
        self.send_refresh();
    }

    fn get_info(&self) -> ClientInfo {
        self.client_info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let logger = params.logger.as_deref().unwrap_or("mcp");

        match params.level {
            LoggingLevel::Emergency
            | LoggingLevel::Alert
            | LoggingLevel::Critical
            | LoggingLevel::Error => {
                error!(server = %self.server_name, logger = %logger, level = ?params.level, "upstream: {}", params.data);
            }
            LoggingLevel::Warning => {
                warn!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
            LoggingLevel::Notice | LoggingLevel::Info => {
                info!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
            LoggingLevel::Debug => {
                debug!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
        }
    }
}
