//! In-process upstream servers for gateway tests.

#![allow(dead_code)]

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use data_connector::{MemoryRegistryStorage, RegistryStorage};
use gateway_mcp::{
    ClientFactory, JsonObject, McpConfig, McpError, McpManager, McpResult, McpServerConfig,
    McpTransport, RefreshRequest, Tool, UpstreamClient,
};
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, Content};
use tokio::sync::mpsc;

pub fn tool(name: &str) -> Tool {
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "a": {"type": "number"},
            "b": {"type": "number"}
        }
    });
    let schema = match schema {
        serde_json::Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    Tool {
        name: Cow::Owned(name.to_string()),
        title: None,
        description: Some(Cow::Owned(format!("{name} tool"))),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

pub fn stdio(name: &str, command: &str) -> McpServerConfig {
    McpServerConfig::new(
        name,
        McpTransport::Stdio {
            command: command.to_string(),
            args: vec![],
            env: HashMap::new(),
        },
    )
}

pub fn args(value: serde_json::Value) -> Option<JsonObject> {
    value.as_object().cloned()
}

/// Upstream that adds numbers, echoes input and can fail on demand.
pub struct MockUpstream {
    tools: Mutex<Vec<Tool>>,
    calls: AtomicUsize,
    fail_listing: AtomicBool,
    call_delay: Mutex<Option<Duration>>,
    refresh_tx: Mutex<Option<mpsc::Sender<RefreshRequest>>>,
    server_name: String,
}

impl MockUpstream {
    fn new(server_name: &str, tools: &[&str]) -> Self {
        Self {
            tools: Mutex::new(tools.iter().map(|t| tool(t)).collect()),
            calls: AtomicUsize::new(0),
            fail_listing: AtomicBool::new(false),
            call_delay: Mutex::new(None),
            refresh_tx: Mutex::new(None),
            server_name: server_name.to_string(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_tools(&self, tools: &[&str]) {
        *self.tools.lock() = tools.iter().map(|t| tool(t)).collect();
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock() = Some(delay);
    }

    /// Emulate a "tool list changed" notification.
    pub async fn notify_tools_changed(&self) {
        let tx = self.refresh_tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(RefreshRequest {
                server_name: self.server_name.clone(),
            })
            .await
            .unwrap();
        }
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionFailed("listing refused".into()));
        }
        Ok(self.tools.lock().clone())
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> McpResult<CallToolResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.call_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let arguments = arguments.unwrap_or_default();
        let number = |k: &str| arguments.get(k).and_then(|v| v.as_i64()).unwrap_or(0);
        match name {
            "add" => Ok(CallToolResult::success(vec![Content::text(
                (number("a") + number("b")).to_string(),
            )])),
            "fail" => Ok(CallToolResult::error(vec![Content::text("upstream says no")])),
            other => Ok(CallToolResult::success(vec![Content::text(format!(
                "{}:{other}",
                self.server_name
            ))])),
        }
    }
}

/// Factory serving [`MockUpstream`]s by server name.
#[derive(Default)]
pub struct MockFactory {
    upstreams: Mutex<HashMap<String, Arc<MockUpstream>>>,
    unreachable: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_server(&self, name: &str, tools: &[&str]) -> Arc<MockUpstream> {
        let upstream = Arc::new(MockUpstream::new(name, tools));
        self.upstreams
            .lock()
            .insert(name.to_string(), Arc::clone(&upstream));
        upstream
    }

    pub fn upstream(&self, name: &str) -> Arc<MockUpstream> {
        Arc::clone(&self.upstreams.lock()[name])
    }

    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn connect(
        &self,
        config: &McpServerConfig,
        refresh_tx: mpsc::Sender<RefreshRequest>,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().contains(&config.name) {
            return Err(McpError::ConnectionFailed(format!(
                "{}: connection refused",
                config.name
            )));
        }
        let upstream = self
            .upstreams
            .lock()
            .get(&config.name)
            .cloned()
            .ok_or_else(|| McpError::ConnectionFailed(format!("{}: no such upstream", config.name)))?;
        *upstream.refresh_tx.lock() = Some(refresh_tx);
        Ok(upstream)
    }
}

pub fn memory_storage() -> Arc<dyn RegistryStorage> {
    Arc::new(MemoryRegistryStorage::new())
}

pub async fn manager(factory: &Arc<MockFactory>) -> Arc<McpManager> {
    manager_with(McpConfig::default(), memory_storage(), factory).await
}

pub async fn manager_with(
    config: McpConfig,
    storage: Arc<dyn RegistryStorage>,
    factory: &Arc<MockFactory>,
) -> Arc<McpManager> {
    McpManager::new(config, storage, factory.clone())
        .await
        .unwrap()
}
