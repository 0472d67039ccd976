use std::sync::Arc;

use knowmesh_core::config::StorageBackend;
use knowmesh_core::{
    ArithmeticEvaluator, ByteStore, FileByteStore, KnowMeshConfig, KnowMeshError, KnowledgeStore,
    MemoryByteStore, MonotonicIdGenerator,
};
use knowmesh_mesh::{MeshReplicator, MeshTransport};
use tokio::sync::mpsc;

/// Process-wide collaborators, constructed once and shared by every session.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KnowledgeStore>,
    pub replicator: Option<Arc<MeshReplicator>>,
    pub evaluator: ArithmeticEvaluator,
    pub config: KnowMeshConfig,
}

impl AppState {
    /// Wire store, replicator and evaluator from config. The replicator is
    /// created but not opened.
    pub fn build(
        config: KnowMeshConfig,
        transport: Arc<dyn MeshTransport>,
    ) -> Result<Self, KnowMeshError> {
        let bytes: Box<dyn ByteStore> = match config.storage.backend {
            StorageBackend::File => {
                let files = FileByteStore::open(&config.storage.path)?;
                tracing::info!(root = %files.root().display(), "Using file byte store");
                Box::new(files)
            }
            StorageBackend::Memory => Box::new(MemoryByteStore::new()),
        };
        let ids = Arc::new(MonotonicIdGenerator::new());
        let store = KnowledgeStore::new(bytes, config.storage.namespace_key.clone(), ids);

        let (store, replicator) = if config.mesh.enabled {
            let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
            let store = Arc::new(store.with_outbox(outbox_tx));
            let replicator = MeshReplicator::new(
                transport,
                Arc::clone(&store),
                outbox_rx,
                config.mesh.clone(),
            );
            (store, Some(Arc::new(replicator)))
        } else {
            (Arc::new(store), None)
        };

        let evaluator = ArithmeticEvaluator::from_config(&config.engine)?;

        Ok(Self {
            store,
            replicator,
            evaluator,
            config,
        })
    }
}
