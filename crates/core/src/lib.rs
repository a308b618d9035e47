//! # Palaver Core
//!
//! Domain types, traits, and error definitions for the palaver conversation
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the model
//! provider, the tool registry, and the state store. Implementations live in
//! their respective crates (or in the integrator's application). This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod state;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StateError, StoreError, StreamError, ToolError};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    GenerateOptions, GenerateRequest, ModelProvider, ModelResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use state::ConversationState;
pub use store::StateStore;
pub use tool::{LocalToolRegistry, ParameterKind, Tool, ToolParameter, ToolRegistry};
