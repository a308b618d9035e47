//! Agent profiles — who is speaking, and with which tools.
//!
//! A profile owns the system prompt and scopes the tool catalog an agent is
//! allowed to see. The engine resolves profiles by id before any model call;
//! an unknown id aborts the request.

use serde::{Deserialize, Serialize};

use palaver_core::provider::ToolDefinition;
use palaver_core::tool::ToolRegistry;

/// One configured agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent ID
    pub id: String,

    /// Display name
    pub name: String,

    /// System instructions sent with every model round
    pub system_prompt: String,

    /// Names of tools this agent may call; empty means the whole catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_names: Vec<String>,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            system_prompt: system_prompt.into(),
            tool_names: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict the agent to the named tools.
    pub fn with_tools(mut self, tool_names: Vec<String>) -> Self {
        self.tool_names = tool_names;
        self
    }

    /// The tool definitions this agent may use, drawn from the registry.
    pub fn catalog(&self, registry: &dyn ToolRegistry) -> Vec<ToolDefinition> {
        let definitions = registry.definitions();
        if self.tool_names.is_empty() {
            return definitions;
        }
        definitions
            .into_iter()
            .filter(|d| self.tool_names.iter().any(|n| n == &d.name))
            .collect()
    }
}
