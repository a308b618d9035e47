//! The message-processing engine — the core control loop.
//!
//! One top-level request drives zero or more rounds of model calls
//! interleaved with tool execution:
//!
//! 1. Load or create the conversation, append the user turn
//! 2. Build the context window and check it opens on a user/tool turn
//! 3. Call the model provider
//! 4. If the reply requests tools: execute them concurrently, append the
//!    results, rebuild the window from full history, go to 3
//! 5. Persist the conversation exactly once and return the final reply
//!
//! Failures attributable to a single tool call become conversation content
//! the model can react to; provider and window-invariant failures abort the
//! request whole.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use palaver_core::error::{Error, Result, StateError};
use palaver_core::message::{ConversationId, Message, MessageToolCall};
use palaver_core::provider::{GenerateOptions, GenerateRequest, ModelProvider, ToolDefinition};
use palaver_core::state::ConversationState;
use palaver_core::store::StateStore;
use palaver_core::tool::ToolRegistry;

use crate::agent_profile::AgentProfile;
use crate::config::{EngineConfig, ProcessOptions};
use crate::session_lock::SessionLocks;

/// One inbound request: a user utterance addressed to an agent, optionally
/// continuing an existing conversation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub agent_id: String,
    pub conversation_id: Option<ConversationId>,
    pub text: String,
    pub options: ProcessOptions,
}

impl ProcessRequest {
    pub fn new(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id: None,
            text: text.into(),
            options: ProcessOptions::default(),
        }
    }

    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }
}

/// The result of one tool call, before it becomes a persisted tool message.
#[derive(Debug, Clone)]
pub(crate) struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub(crate) fn into_message(self) -> Message {
        Message::tool_result(self.call_id, self.tool_name, self.output)
            .with_tool_error(self.is_error)
    }
}

/// Parse a tool call's argument text.
///
/// Malformed argument text never aborts a round: it is kept verbatim under a
/// `rawArguments` wrapper so the call still executes (and typically fails
/// validation, which also stays local to the call).
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "rawArguments": raw }))
}

/// Serialize a tool's result for conversation content.
pub(crate) fn render_output(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Everything a request needs after round-0 setup, shared by the sync and
/// streaming paths.
pub(crate) struct PreparedRequest {
    pub profile: AgentProfile,
    pub state: ConversationState,
    pub guard: tokio::sync::OwnedMutexGuard<()>,
    pub window: Vec<Message>,
    pub catalog: Vec<ToolDefinition>,
    pub options: GenerateOptions,
    pub memory_size: usize,
}

/// The message-processing engine.
///
/// Holds the three external contracts (provider, tool registry, state
/// store), the registered agent profiles, and the per-conversation locks.
/// Cheap to clone; clones share the locks and contracts.
#[derive(Clone)]
pub struct MessageProcessor {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolRegistry>,
    store: Arc<dyn StateStore>,
    agents: HashMap<String, AgentProfile>,
    config: EngineConfig,
    locks: SessionLocks,
}

impl MessageProcessor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolRegistry>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            agents: HashMap::new(),
            config: EngineConfig::default(),
            locks: SessionLocks::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an agent profile. Replaces any profile with the same id.
    pub fn with_agent(mut self, profile: AgentProfile) -> Self {
        self.agents.insert(profile.id.clone(), profile);
        self
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub(crate) fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Round-0 setup shared by both entry points: resolve the agent, take
    /// the conversation lock, load or create state, append the user turn,
    /// and build the first context window. Everything that can abort before
    /// a model call happens here.
    pub(crate) async fn prepare(&self, request: ProcessRequest) -> Result<PreparedRequest> {
        let profile = self
            .agents
            .get(&request.agent_id)
            .cloned()
            .ok_or_else(|| Error::AgentNotFound(request.agent_id.clone()))?;

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(ConversationId::new);
        let guard = self.locks.acquire(&conversation_id).await;

        let mut state = match &request.conversation_id {
            Some(id) => self
                .store
                .find_by_id(id)
                .await?
                .ok_or_else(|| Error::ConversationNotFound(id.to_string()))?,
            None => ConversationState::with_id(conversation_id.clone(), &request.agent_id),
        };

        info!(
            conversation_id = %state.id,
            agent_id = %profile.id,
            messages = state.history.len(),
            "Processing message"
        );

        state.append(Message::user(request.text));

        let memory_size = request
            .options
            .memory_size
            .unwrap_or(self.config.default_memory_size);
        let window = self.build_window(&state, memory_size)?;

        let options = GenerateOptions {
            temperature: request
                .options
                .temperature
                .unwrap_or(self.config.default_temperature),
            max_tokens: request.options.max_tokens,
        };
        let catalog = profile.catalog(self.tools.as_ref());

        Ok(PreparedRequest {
            profile,
            state,
            guard,
            window,
            catalog,
            options,
            memory_size,
        })
    }

    /// Build the context window and enforce the opening invariant: the model
    /// must never see a window that opens mid-turn on an assistant message.
    pub(crate) fn build_window(
        &self,
        state: &ConversationState,
        memory_size: usize,
    ) -> Result<Vec<Message>> {
        let window = state.last_n_interactions(memory_size);
        match window.first() {
            Some(first) if first.role.can_open_window() => Ok(window),
            Some(first) => Err(StateError::MalformedWindow {
                role: first.role.to_string(),
            }
            .into()),
            None => Err(StateError::EmptyWindow(state.id.to_string()).into()),
        }
    }

    /// Process a user message and return the final assistant reply.
    ///
    /// Recurses through tool rounds until the model answers without
    /// requesting tools, then persists the conversation exactly once.
    pub async fn process(&self, request: ProcessRequest) -> Result<Message> {
        let PreparedRequest {
            profile,
            mut state,
            guard: _guard,
            mut window,
            catalog,
            options,
            memory_size,
        } = self.prepare(request).await?;

        let environment = json!({
            "agent_id": profile.id,
            "conversation_id": state.id.to_string(),
        });

        let mut rounds = 0u32;
        loop {
            rounds += 1;
            if rounds > self.config.max_rounds {
                return Err(Error::RecursionLimit {
                    rounds: self.config.max_rounds,
                });
            }
            debug!(conversation_id = %state.id, round = rounds, "Model round");

            let response = self
                .provider
                .generate(GenerateRequest {
                    messages: window,
                    system_prompt: profile.system_prompt.clone(),
                    tools: catalog.clone(),
                    options: options.clone(),
                })
                .await?;

            if let Some(usage) = &response.usage {
                debug!(
                    conversation_id = %state.id,
                    tokens = usage.total_tokens,
                    "Round usage"
                );
            }

            let mut assistant = response.message;
            assistant.conversation_id = Some(state.id.clone());
            let tool_calls = assistant.tool_calls.clone();
            state.append(assistant.clone());

            if tool_calls.is_empty() {
                self.store.save(&state).await?;
                return Ok(assistant);
            }

            debug!(
                conversation_id = %state.id,
                tool_count = tool_calls.len(),
                "Executing tool calls"
            );
            for outcome in self.execute_tool_calls(&tool_calls, &environment).await {
                state.append(outcome.into_message());
            }

            // The next round sees the full updated history, not the
            // original window.
            window = self.build_window(&state, memory_size)?;
        }
    }

    /// Execute one round's tool calls concurrently and collect the results
    /// in completion order.
    ///
    /// Each call runs as its own task; one call failing — bad arguments, a
    /// missing tool, a handler error, even a panic — never cancels or blocks
    /// the others. Every requested call produces exactly one outcome.
    pub(crate) async fn execute_tool_calls(
        &self,
        calls: &[MessageToolCall],
        environment: &serde_json::Value,
    ) -> Vec<ToolOutcome> {
        let mut set: JoinSet<(usize, ToolOutcome)> = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            let registry = Arc::clone(&self.tools);
            let env = environment.clone();
            let task_call = call.clone();
            set.spawn(async move {
                let args = parse_arguments(&task_call.arguments);
                let outcome = match registry
                    .execute_by_name(&task_call.name, args, Some(&env))
                    .await
                {
                    Ok(value) => ToolOutcome {
                        call_id: task_call.id,
                        tool_name: task_call.name,
                        output: render_output(value),
                        is_error: false,
                    },
                    Err(e) => {
                        warn!(tool = %task_call.name, error = %e, "Tool call failed");
                        ToolOutcome {
                            call_id: task_call.id,
                            tool_name: task_call.name,
                            output: e.to_string(),
                            is_error: true,
                        }
                    }
                };
                (index, outcome)
            });
        }

        let mut pending: HashSet<usize> = (0..calls.len()).collect();
        let mut outcomes = Vec::with_capacity(calls.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    pending.remove(&index);
                    outcomes.push(outcome);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Tool task aborted");
                }
            }
        }
        // Panicked handlers still owe the round an outcome; whatever index
        // never reported is theirs.
        for index in pending {
            let call = &calls[index];
            outcomes.push(ToolOutcome {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: format!("tool task aborted: {}", call.name),
                is_error: true,
            });
        }
        outcomes
    }
}
