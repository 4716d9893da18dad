//! Checkpointing: the progress state shared by producer and consumers, and its durable store.

pub mod state;
pub mod store;

pub use state::{ProcessingState, SharedState};
pub use store::CheckpointStore;
