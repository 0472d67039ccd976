//! In-process mesh hub.
//!
//! Every clone of a [`LocalMesh`] is a peer attached to the same graph. Nodes
//! are kept per channel and replayed to new subscribers before live traffic,
//! which mirrors how a gossip graph hands a late joiner the existing data.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::MeshError;
use crate::transport::{MeshEnvelope, MeshTransport};

const FEED_CAPACITY: usize = 1024;

type Graph = HashMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Clone)]
pub struct LocalMesh {
    graph: Arc<Mutex<Graph>>,
    feed: broadcast::Sender<(String, MeshEnvelope)>,
}

impl Default for LocalMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMesh")
            .field("subscribers", &self.feed.receiver_count())
            .finish_non_exhaustive()
    }
}

impl LocalMesh {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            graph: Arc::new(Mutex::new(HashMap::new())),
            feed,
        }
    }

    /// Number of nodes stored under `channel`.
    pub fn node_count(&self, channel: &str) -> usize {
        let graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        graph.get(channel).map_or(0, BTreeMap::len)
    }

    /// Write a node without going through a replicator, e.g. to simulate a
    /// misbehaving peer.
    pub fn inject(&self, channel: &str, key: &str, payload: serde_json::Value) {
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        graph
            .entry(channel.to_string())
            .or_default()
            .insert(key.to_string(), payload.clone());
        // No live subscribers is fine; the node is replayed on subscribe.
        let _ = self.feed.send((
            channel.to_string(),
            MeshEnvelope {
                key: key.to_string(),
                payload,
            },
        ));
    }
}

#[async_trait]
impl MeshTransport for LocalMesh {
    async fn publish(
        &self,
        channel: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<(), MeshError> {
        self.inject(channel, key, payload);
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        sink: mpsc::Sender<MeshEnvelope>,
    ) -> Result<(), MeshError> {
        // Snapshot and live feed are taken under one lock so no node falls
        // between them.
        let (backlog, mut live) = {
            let graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
            let backlog: Vec<MeshEnvelope> = graph
                .get(channel)
                .map(|nodes| {
                    nodes
                        .iter()
                        .map(|(key, payload)| MeshEnvelope {
                            key: key.clone(),
                            payload: payload.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            (backlog, self.feed.subscribe())
        };

        let channel = channel.to_string();
        tokio::spawn(async move {
            for envelope in backlog {
                if sink.send(envelope).await.is_err() {
                    return;
                }
            }
            loop {
                match live.recv().await {
                    Ok((ch, envelope)) => {
                        if ch != channel {
                            continue;
                        }
                        if sink.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, channel = %channel, "Local mesh subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscriber_receives_backlog_then_live() {
        let mesh = LocalMesh::new();
        mesh.publish("ch", "item_1", json!({"n": 1})).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        mesh.subscribe("ch", tx).await.unwrap();
        mesh.publish("ch", "item_2", json!({"n": 2})).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.key, "item_1");
        assert_eq!(second.key, "item_2");
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let mesh = LocalMesh::new();
        let (tx, mut rx) = mpsc::channel(8);
        mesh.subscribe("a", tx).await.unwrap();

        mesh.publish("b", "k", json!({})).await.unwrap();
        mesh.publish("a", "k", json!({"mine": true})).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.payload["mine"], true);
        assert_eq!(mesh.node_count("a"), 1);
        assert_eq!(mesh.node_count("b"), 1);
    }

    #[tokio::test]
    async fn test_clones_share_graph() {
        let peer_a = LocalMesh::new();
        let peer_b = peer_a.clone();
        peer_a.publish("ch", "k", json!({})).await.unwrap();
        assert_eq!(peer_b.node_count("ch"), 1);
    }
}
