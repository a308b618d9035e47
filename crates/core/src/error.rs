//! Error types for the palaver domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. The propagation rule is:
//! anything attributable to a single tool call stays local (the engine turns
//! it into conversation content); anything that breaks an orchestration
//! invariant or the upstream model call surfaces whole.

use thiserror::Error;

/// The top-level error type for all palaver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No agent registered under the requested id.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The caller named a conversation the store does not have.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// The model kept requesting tools past the configured round limit.
    #[error("Tool round limit reached after {rounds} rounds")]
    RecursionLimit { rounds: u32 },

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Conversation state errors ---
    #[error("Conversation state error: {0}")]
    State(#[from] StateError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- State store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Streaming errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised when a conversation's history violates an engine invariant.
/// These are fatal to the request: the engine never sends a malformed window
/// to the model.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("Context window opens on a {role} message; must open on user or tool")]
    MalformedWindow { role: String },

    #[error("Context window is empty for conversation {0}")]
    EmptyWindow(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("Upstream stream ended unexpectedly: {0}")]
    Interrupted(String),

    #[error("Consumer went away before the stream completed")]
    ConsumerGone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "get_price".into(),
            reason: "upstream returned 500".into(),
        });
        assert!(err.to_string().contains("get_price"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn malformed_window_names_the_role() {
        let err = Error::State(StateError::MalformedWindow {
            role: "assistant".into(),
        });
        assert!(err.to_string().contains("assistant"));
    }

    #[test]
    fn recursion_limit_reports_rounds() {
        let err = Error::RecursionLimit { rounds: 8 };
        assert!(err.to_string().contains('8'));
    }
}
