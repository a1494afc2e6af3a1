// src/lib.rs

// Import the top-level `engine` module.
pub mod engine;

// Re-exporting key items for easier external access.
pub use engine::errors::{AdapterError, DispatchError, OrchestrationError};
pub use engine::message::{
    Agent, ChatRequest, ChatResponse, Message, Role, ToolCall, ToolDef,
};
pub use engine::orchestration::{Orchestrator, TurnOutcome};
pub use engine::registry::Registry;
