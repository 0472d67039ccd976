pub mod engine;
pub mod router;
pub mod server;
pub mod state;

pub use engine::{EngineState, Reply, ResolutionEngine};
pub use state::AppState;
