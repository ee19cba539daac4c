//! Upstream client pool.
//!
//! One initialize-once slot per registered server. Clients are created
//! lazily, shared by every caller and replaced only after they die.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::{
    client::{ClientFactory, UpstreamClient},
    config::McpServerConfig,
    handler::RefreshRequest,
    metrics::McpMetrics,
};
use crate::error::McpResult;

type Slot = Arc<Mutex<Option<Arc<dyn UpstreamClient>>>>;

fn same_client(a: &Arc<dyn UpstreamClient>, b: &Arc<dyn UpstreamClient>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub struct ClientPool {
    slots: DashMap<String, Slot>,
    factory: Arc<dyn ClientFactory>,
    refresh_tx: mpsc::Sender<RefreshRequest>,
    metrics: Arc<McpMetrics>,
}

impl ClientPool {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        refresh_tx: mpsc::Sender<RefreshRequest>,
        metrics: Arc<McpMetrics>,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            factory,
            refresh_tx,
            metrics,
        }
    }

    fn slot(&self, server_name: &str) -> Slot {
        Arc::clone(&self.slots.entry(server_name.to_string()).or_default())
    }

    /// Connect a client that is not yet cached.
    ///
    /// Used for discovery before a registration commits; hand the client to
    /// [`ClientPool::install`] once it should be shared. Failures are left
    /// for the caller to count.
    pub async fn connect_detached(
        &self,
        config: &McpServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        let client = self.factory.connect(config, self.refresh_tx.clone()).await?;
        self.metrics.record_connection_opened();
        Ok(client)
    }

    /// Return the cached client for `config.name`, connecting if the slot is
    /// empty or holds a dead client. Concurrent callers share one attempt.
    pub async fn get_or_connect(
        &self,
        config: &McpServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        let slot = self.slot(&config.name);
        let mut guard = slot.lock().await;

        if let Some(client) = guard.as_ref() {
            if client.is_alive() {
                return Ok(Arc::clone(client));
            }
        }
        if let Some(stale) = guard.take() {
            debug!(server = %config.name, "Replacing dead upstream client");
            self.discard(stale).await;
        }

        let client = self.connect_detached(config).await?;
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Cache `client` for `server_name`, closing any client it replaces.
    pub async fn install(&self, server_name: &str, client: Arc<dyn UpstreamClient>) {
        let slot = self.slot(server_name);
        let previous = slot.lock().await.replace(client);
        if let Some(previous) = previous {
            self.discard(previous).await;
        }
    }

    /// Drop `client` from the cache if it is still the cached one.
    pub async fn evict(&self, server_name: &str, client: &Arc<dyn UpstreamClient>) {
        let Some(slot) = self.slots.get(server_name).map(|s| Arc::clone(&s)) else {
            return;
        };
        let evicted = {
            let mut guard = slot.lock().await;
            match guard.as_ref() {
                Some(cached) if same_client(cached, client) => guard.take(),
                _ => None,
            }
        };
        if let Some(evicted) = evicted {
            info!(server = %server_name, "Evicted dead upstream client");
            self.discard(evicted).await;
        }
    }

    /// Remove the server's slot and close its client.
    pub async fn release(&self, server_name: &str) {
        let Some((_, slot)) = self.slots.remove(server_name) else {
            return;
        };
        let client = slot.lock().await.take();
        if let Some(client) = client {
            self.discard(client).await;
        }
    }

    pub async fn close_all(&self) {
        let names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.release(&name).await;
        }
    }

    pub fn contains(&self, server_name: &str) -> bool {
        self.slots
            .get(server_name)
            .is_some_and(|slot| slot.try_lock().map(|g| g.is_some()).unwrap_or(true))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Close a client that is not (or no longer) cached.
    pub(crate) async fn discard(&self, client: Arc<dyn UpstreamClient>) {
        client.close().await;
        self.metrics.record_connection_closed();
    }
}
