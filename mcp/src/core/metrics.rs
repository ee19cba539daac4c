//! MCP gateway metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::{error::ErrorKind, inventory::QualifiedToolName};

/// Metrics for gateway operations.
pub struct McpMetrics {
    // Call metrics
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,

    // Failures by kind
    errors_by_kind: DashMap<ErrorKind, AtomicU64>,

    // Registry metrics
    servers_registered: AtomicU64,
    servers_deregistered: AtomicU64,
    tools_enabled: AtomicU64,
    tools_disabled: AtomicU64,

    // Connection metrics
    connection_errors: AtomicU64,
    active_connections: AtomicU64,

    // Execution metrics
    active_executions: AtomicU64,

    // Per-tool latency tracking
    tool_latencies: DashMap<QualifiedToolName, LatencyStats>,
}

impl McpMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            errors_by_kind: DashMap::new(),
            servers_registered: AtomicU64::new(0),
            servers_deregistered: AtomicU64::new(0),
            tools_enabled: AtomicU64::new(0),
            tools_disabled: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            active_executions: AtomicU64::new(0),
            tool_latencies: DashMap::new(),
        }
    }

    /// Record the start of a tool call.
    pub fn record_call_start(&self, _tool: &QualifiedToolName) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.active_executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a tool call. `outcome` is `None` on success.
    pub fn record_call_end(
        &self,
        tool: &QualifiedToolName,
        outcome: Option<ErrorKind>,
        duration_ms: u64,
    ) {
        self.active_executions.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            None => {
                self.successful_calls.fetch_add(1, Ordering::Relaxed);
            }
            Some(kind) => {
                self.failed_calls.fetch_add(1, Ordering::Relaxed);
                self.record_error(kind);
            }
        }

        self.tool_latencies
            .entry(tool.clone())
            .or_insert_with(LatencyStats::new)
            .record(duration_ms);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        if kind == ErrorKind::Connection {
            self.connection_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.errors_by_kind
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_registered(&self) {
        self.servers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_deregistered(&self) {
        self.servers_deregistered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record tools changing availability.
    pub fn record_tools_toggled(&self, count: usize, enabled: bool) {
        let counter = if enabled {
            &self.tools_enabled
        } else {
            &self.tools_disabled
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn active_executions(&self) -> u64 {
        self.active_executions.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut errors_by_kind: Vec<(ErrorKind, u64)> = self
            .errors_by_kind
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .collect();
        errors_by_kind.sort_by_key(|(k, _)| k.as_str());

        let mut tool_latencies = self.all_tool_latencies();
        tool_latencies.sort_by(|a, b| a.tool.cmp(&b.tool));

        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            errors_by_kind: errors_by_kind
                .into_iter()
                .map(|(k, v)| (k.as_str().to_string(), v))
                .collect(),
            servers_registered: self.servers_registered.load(Ordering::Relaxed),
            servers_deregistered: self.servers_deregistered.load(Ordering::Relaxed),
            tools_enabled: self.tools_enabled.load(Ordering::Relaxed),
            tools_disabled: self.tools_disabled.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_executions: self.active_executions.load(Ordering::Relaxed),
            tool_latencies,
        }
    }

    /// Get latency stats for a specific tool.
    pub fn tool_latency(&self, tool: &QualifiedToolName) -> Option<LatencySnapshot> {
        self.tool_latencies
            .get(tool)
            .map(|stats| stats.snapshot(tool))
    }

    fn all_tool_latencies(&self) -> Vec<LatencySnapshot> {
        self.tool_latencies
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect()
    }
}

impl Default for McpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tool latency statistics.
struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self, tool: &QualifiedToolName) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);

        LatencySnapshot {
            tool: tool.to_string(),
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of overall metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub errors_by_kind: Vec<(String, u64)>,
    pub servers_registered: u64,
    pub servers_deregistered: u64,
    pub tools_enabled: u64,
    pub tools_disabled: u64,
    pub connection_errors: u64,
    pub active_connections: u64,
    pub active_executions: u64,
    pub tool_latencies: Vec<LatencySnapshot>,
}

impl MetricsSnapshot {
    /// Calculate success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            100.0
        } else {
            (self.successful_calls as f64 / completed as f64) * 100.0
        }
    }

    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind
            .iter()
            .find(|(k, _)| k == kind.as_str())
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }
}

/// Snapshot of latency statistics for a tool.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub tool: String,
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}
