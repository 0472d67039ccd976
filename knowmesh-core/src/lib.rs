pub mod arithmetic;
pub mod bytestore;
pub mod config;
pub mod error;
pub mod ids;
pub mod ipc;
pub mod matcher;
pub mod models;
pub mod seed;
pub mod store;

pub use arithmetic::ArithmeticEvaluator;
pub use bytestore::{ByteStore, FileByteStore, MemoryByteStore};
pub use config::KnowMeshConfig;
pub use error::{ByteStoreError, KnowMeshError};
pub use ids::{IdGenerator, MonotonicIdGenerator, SequenceIdGenerator};
pub use models::{KnowledgeKind, KnowledgeRecord, Message, Sender};
pub use store::{ChangeCause, KnowledgeStore, MergeOutcome, TableChange};
