use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MeshError;

/// One node delivered by the mesh: the peer-assigned key and its loosely
/// typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshEnvelope {
    pub key: String,
    pub payload: serde_json::Value,
}

/// Publish/subscribe contract over a flat map of independent keys per channel.
///
/// Delivery is best-effort, unordered and at-least-once. A subscriber may see
/// nodes that existed before it subscribed, and may see its own publishes.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Write `payload` under `key` inside `channel`.
    async fn publish(
        &self,
        channel: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<(), MeshError>;

    /// Start forwarding every node of `channel` into `sink`. Forwarding stops
    /// once the receiving half of `sink` is dropped.
    async fn subscribe(
        &self,
        channel: &str,
        sink: mpsc::Sender<MeshEnvelope>,
    ) -> Result<(), MeshError>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}
