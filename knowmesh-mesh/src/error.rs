use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Replicator already opened")]
    AlreadyOpen,

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
