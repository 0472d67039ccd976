//! Mesh replicator: store ⇄ transport bridge
//!
//! - **Outbound**: drains the store's outbox and publishes each local insert
//!   under its own generated key (`item_<id>_<suffix>`), so unrelated
//!   concurrent inserts never overwrite each other.
//! - **Inbound**: the transport feeds a bounded channel; a single consumer task
//!   validates each node and hands it to `KnowledgeStore::merge_remote`.
//! - **Link**: `connected` flips on after a fixed delay. It is a status
//!   indicator only; nothing waits on it.
//!
//! A replicator is opened at most once and closed explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use knowmesh_core::config::MeshConfig;
use knowmesh_core::{KnowledgeRecord, KnowledgeStore, MergeOutcome};

use crate::error::MeshError;
use crate::transport::{MeshEnvelope, MeshTransport};
use crate::wire::{parse_remote, WireRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshStatus {
    pub connected: bool,
    pub transport: String,
    pub channel: String,
    pub peers: Vec<String>,
}

pub struct MeshReplicator {
    transport: Arc<dyn MeshTransport>,
    store: Arc<KnowledgeStore>,
    config: MeshConfig,
    connected: Arc<AtomicBool>,
    outbox: Mutex<Option<mpsc::UnboundedReceiver<KnowledgeRecord>>>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for MeshReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshReplicator")
            .field("transport", &self.transport.name())
            .field("channel", &self.config.channel)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MeshReplicator {
    /// `outbox` is the receiving half of the channel given to
    /// [`KnowledgeStore::with_outbox`].
    pub fn new(
        transport: Arc<dyn MeshTransport>,
        store: Arc<KnowledgeStore>,
        outbox: mpsc::UnboundedReceiver<KnowledgeRecord>,
        config: MeshConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            transport,
            store,
            config,
            connected: Arc::new(AtomicBool::new(false)),
            outbox: Mutex::new(Some(outbox)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn status(&self) -> MeshStatus {
        MeshStatus {
            connected: self.is_connected(),
            transport: self.transport.name().to_string(),
            channel: self.config.channel.clone(),
            peers: self.config.peers.clone(),
        }
    }

    /// Subscribe to the channel and start the inbound, outbound and link tasks.
    ///
    /// On error the replicator stays unopened and can be retried; local store
    /// operations are unaffected either way.
    pub async fn open(&self) -> Result<(), MeshError> {
        let outbox = self
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(MeshError::AlreadyOpen)?;

        tracing::info!(
            transport = self.transport.name(),
            channel = %self.config.channel,
            peers = self.config.peers.len(),
            "Connecting to knowledge mesh"
        );

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity.max(1));
        if let Err(e) = self.transport.subscribe(&self.config.channel, inbound_tx).await {
            *self.outbox.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbox);
            return Err(e);
        }

        let handles = vec![
            tokio::spawn(run_inbound(
                Arc::clone(&self.store),
                inbound_rx,
                self.shutdown.subscribe(),
            )),
            tokio::spawn(run_outbound(
                Arc::clone(&self.transport),
                self.config.channel.clone(),
                outbox,
                self.shutdown.subscribe(),
            )),
            tokio::spawn(run_link_delay(
                Arc::clone(&self.connected),
                Duration::from_millis(self.config.connect_delay_ms),
                self.shutdown.subscribe(),
            )),
        ];
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);

        Ok(())
    }

    /// Stop all tasks and mark the link down. Records still queued in the
    /// outbox are not published.
    pub async fn close(&self) {
        let _ = self.shutdown.send(());
        self.connected.store(false, Ordering::Release);

        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Mesh task ended abnormally");
            }
        }
        tracing::info!(channel = %self.config.channel, "Mesh link closed");
    }
}

/// Validate one remote node and merge it. `None` when the node was dropped.
pub fn apply_remote(store: &KnowledgeStore, envelope: &MeshEnvelope) -> Option<MergeOutcome> {
    match parse_remote(&envelope.payload, store.ids()) {
        Ok(record) => Some(store.merge_remote(record)),
        Err(reason) => {
            tracing::debug!(key = %envelope.key, reason = %reason, "Dropped remote node");
            None
        }
    }
}

/// Per-item key inside the shared channel.
pub fn node_key(record: &KnowledgeRecord) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("item_{}_{}", record.id, &suffix[..5])
}

pub async fn publish_record(
    transport: &dyn MeshTransport,
    channel: &str,
    record: &KnowledgeRecord,
) -> Result<(), MeshError> {
    let payload = serde_json::to_value(WireRecord::from(record))?;
    let key = node_key(record);
    transport.publish(channel, &key, payload).await?;
    tracing::debug!(id = record.id, key = %key, "Published record to mesh");
    Ok(())
}

async fn run_inbound(
    store: Arc<KnowledgeStore>,
    mut inbound: mpsc::Receiver<MeshEnvelope>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            envelope = inbound.recv() => {
                let Some(envelope) = envelope else {
                    tracing::debug!("Mesh inbound feed ended");
                    break;
                };
                let store = Arc::clone(&store);
                let merged =
                    tokio::task::spawn_blocking(move || apply_remote(&store, &envelope)).await;
                if let Err(e) = merged {
                    tracing::warn!(error = %e, "Remote merge task failed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn run_outbound(
    transport: Arc<dyn MeshTransport>,
    channel: String,
    mut outbox: mpsc::UnboundedReceiver<KnowledgeRecord>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            record = outbox.recv() => {
                let Some(record) = record else { break };
                if let Err(e) = publish_record(transport.as_ref(), &channel, &record).await {
                    tracing::warn!(id = record.id, error = %e, "Mesh publish failed, record kept local");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn run_link_delay(
    connected: Arc<AtomicBool>,
    delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            connected.store(true, Ordering::Release);
            tracing::info!("Mesh link up");
        }
        _ = shutdown.recv() => {}
    }
}
