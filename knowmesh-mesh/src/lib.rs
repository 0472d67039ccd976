//! Mesh replication for the knowledge table
//!
//! Bridges [`knowmesh_core::KnowledgeStore`] to an external publish/subscribe
//! collaborator abstracted as [`MeshTransport`]. Peer discovery and relays
//! live behind that trait.

pub mod error;
pub mod local;
pub mod replicator;
pub mod transport;
pub mod wire;

pub use error::MeshError;
pub use local::LocalMesh;
pub use replicator::{MeshReplicator, MeshStatus};
pub use transport::{MeshEnvelope, MeshTransport};
pub use wire::{parse_remote, RemoteRejection, WireRecord};
