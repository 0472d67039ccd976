pub mod message;
pub mod record;

pub use message::{Message, Sender};
pub use record::{KnowledgeKind, KnowledgeRecord};
