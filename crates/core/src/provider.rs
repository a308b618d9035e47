//! ModelProvider trait — the abstraction over LLM backends.
//!
//! A provider turns a context window, system prompt, and tool catalog into
//! an assistant reply, either as one value or as a stream of chunks. All
//! vendor-specific request/response shaping (tool-call encodings, content
//! block formats) lives behind this trait; the engine only ever sees the
//! neutral types below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Sampling and sizing options for one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

pub(crate) fn default_temperature() -> f32 {
    0.7
}

/// A request for one model round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The context window for this round
    pub messages: Vec<Message>,

    /// System instructions
    pub system_prompt: String,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Sampling options
    #[serde(default)]
    pub options: GenerateOptions,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) response from a provider.
///
/// Requested tool calls ride on `message.tool_calls`; the engine decides
/// whether the round is final by looking there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Provider-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// An incremental piece of one tool call in a streaming response.
///
/// Providers deliver tool calls in slices keyed by call id: the first slice
/// carries the name, later slices append argument text. The engine
/// concatenates per id until the stream completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// The call this slice belongs to
    pub id: String,

    /// Tool name (first slice of a call)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument text to append
    #[serde(default)]
    pub arguments: String,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Usage info (typically only near the end of the stream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }
}

/// The core ModelProvider trait.
///
/// Every LLM backend implements this trait. The engine calls `generate` or
/// `generate_stream` without knowing which vendor is behind it.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, ProviderError>;

    /// Send a request and get a stream of response chunks. The channel
    /// closing signals upstream completion.
    ///
    /// Default implementation calls `generate()` and replays the result as
    /// chunks.
    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let response = self.generate(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let mut chunk = StreamChunk {
            content: Some(response.message.content.clone()),
            tool_calls: response
                .message
                .tool_calls
                .iter()
                .map(|tc| ToolCallDelta {
                    id: tc.id.clone(),
                    name: Some(tc.name.clone()),
                    arguments: tc.arguments.clone(),
                })
                .collect(),
            usage: response.usage,
        };
        if chunk.content.as_deref() == Some("") {
            chunk.content = None;
        }
        let _ = tx.send(Ok(chunk)).await;
        Ok(rx)
    }

    /// Generate an embedding for the given text (used by knowledge
    /// retrieval, not by the engine's control flow).
    ///
    /// Default implementation reports embeddings as unsupported.
    async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageToolCall;

    struct FixedProvider;

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<ModelResponse, ProviderError> {
            Ok(ModelResponse {
                message: Message::assistant("hello").with_tool_calls(vec![MessageToolCall {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: "{}".into(),
                }]),
                usage: Some(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
                metadata: serde_json::Map::new(),
            })
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            messages: vec![Message::user("hi")],
            system_prompt: "You are helpful".into(),
            tools: Vec::new(),
            options: GenerateOptions::default(),
        }
    }

    #[test]
    fn options_default_temperature() {
        let opts = GenerateOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert!(opts.max_tokens.is_none());
    }

    #[tokio::test]
    async fn default_stream_replays_complete_response() {
        let provider = FixedProvider;
        let mut rx = provider.generate_stream(request()).await.unwrap();

        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("hello"));
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].id, "call_1");
        assert_eq!(chunk.usage.as_ref().unwrap().total_tokens, 5);

        // Channel closes after the single replayed chunk.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_embedding_is_unsupported() {
        let provider = FixedProvider;
        let err = provider.generate_embedding("text").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
