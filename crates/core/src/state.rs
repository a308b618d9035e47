//! Conversation state — ordered history, free-form memory, and expiry.
//!
//! One `ConversationState` is one logical session for one agent. It is pure
//! data plus invariant-preserving operations: history stays sorted by
//! timestamp no matter the arrival order, and every mutation touches
//! `updated_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, Message, Role};

/// One logical session for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Unique conversation ID
    pub id: ConversationId,

    /// The agent this session belongs to
    pub agent_id: String,

    /// Ordered messages, non-decreasing by `created_at`
    pub history: Vec<Message>,

    /// Free-form key/value memory scoped to this session
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub memory: serde_json::Map<String, serde_json::Value>,

    /// Seconds of inactivity after which the session counts as expired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When this conversation was last mutated
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a new empty conversation for an agent.
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            agent_id: agent_id.into(),
            history: Vec::new(),
            memory: serde_json::Map::new(),
            ttl: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new empty conversation with a caller-chosen id.
    pub fn with_id(id: ConversationId, agent_id: impl Into<String>) -> Self {
        let mut state = Self::new(agent_id);
        state.id = id;
        state
    }

    /// Set the inactivity TTL in seconds.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }

    /// Insert a message at its timestamp position.
    ///
    /// History must stay non-decreasing by `created_at`, so insertion scans
    /// from the back for the first message at or before the new timestamp
    /// rather than always appending. Equal timestamps keep arrival order.
    /// The message is stamped with this conversation's id.
    pub fn append(&mut self, mut message: Message) {
        message.conversation_id = Some(self.id.clone());
        let pos = self
            .history
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map_or(0, |i| i + 1);
        self.history.insert(pos, message);
        self.touch();
    }

    /// The last `n` raw messages in history order.
    pub fn last_n(&self, n: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Build a context window holding the last `n` completed interactions.
    ///
    /// Walks history backward, prepending messages. Prepending an assistant
    /// message directly in front of an already-collected user or tool
    /// message closes one completed interaction; the walk stops once `n`
    /// interactions are closed or history is exhausted. The window is then
    /// trimmed so it opens on a user or tool turn: any leading run of
    /// assistant/system messages is discarded, and a window with no user or
    /// tool message at all collapses to empty.
    ///
    /// A clean window start wins over strict pair counting — a dangling
    /// unanswered user turn at the tail can push an earlier completed
    /// interaction out of the window entirely.
    pub fn last_n_interactions(&self, n: usize) -> Vec<Message> {
        if n == 0 || self.history.is_empty() {
            return Vec::new();
        }

        let mut window: std::collections::VecDeque<&Message> = std::collections::VecDeque::new();
        let mut completed = 0usize;
        for msg in self.history.iter().rev() {
            let closes_interaction = msg.role == Role::Assistant
                && window
                    .front()
                    .is_some_and(|next| next.role.can_open_window());
            window.push_front(msg);
            if closes_interaction {
                completed += 1;
                if completed >= n {
                    break;
                }
            }
        }

        match window.iter().position(|m| m.role.can_open_window()) {
            Some(skip) => window.into_iter().skip(skip).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Set a memory key.
    pub fn memory_set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.memory.insert(key.into(), value);
        self.touch();
    }

    /// Read a memory key.
    pub fn memory_get(&self, key: &str) -> Option<&serde_json::Value> {
        self.memory.get(key)
    }

    /// Delete a memory key, returning the previous value if any.
    pub fn memory_delete(&mut self, key: &str) -> Option<serde_json::Value> {
        let removed = self.memory.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Drop all memory keys.
    pub fn memory_clear(&mut self) {
        if !self.memory.is_empty() {
            self.memory.clear();
            self.touch();
        }
    }

    /// Whether the session has outlived its TTL since the last mutation.
    /// Expired sessions are deleted by the owning application, not here.
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(secs) => Utc::now() > self.updated_at + Duration::seconds(secs as i64),
            None => false,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn user_at(content: &str, secs: i64) -> Message {
        Message::user(content).with_created_at(at(secs))
    }

    fn assistant_at(content: &str, secs: i64) -> Message {
        Message::assistant(content).with_created_at(at(secs))
    }

    #[test]
    fn append_stamps_conversation_id() {
        let mut state = ConversationState::new("agent-1");
        state.append(Message::user("hi"));
        assert_eq!(state.history[0].conversation_id.as_ref(), Some(&state.id));
    }

    #[test]
    fn append_keeps_history_sorted_under_out_of_order_arrival() {
        let mut state = ConversationState::new("agent-1");
        state.append(user_at("third", 30));
        state.append(user_at("first", 10));
        state.append(user_at("second", 20));
        state.append(user_at("fourth", 40));

        let contents: Vec<&str> = state.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third", "fourth"]);
        assert!(
            state
                .history
                .windows(2)
                .all(|w| w[0].created_at <= w[1].created_at)
        );
    }

    #[test]
    fn append_equal_timestamps_keep_arrival_order() {
        let mut state = ConversationState::new("agent-1");
        state.append(user_at("a", 10));
        state.append(user_at("b", 10));
        state.append(user_at("c", 10));
        let contents: Vec<&str> = state.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn last_n_returns_tail() {
        let mut state = ConversationState::new("agent-1");
        for i in 0..5 {
            state.append(user_at(&format!("m{i}"), i));
        }
        let tail = state.last_n(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(tail[1].content, "m4");

        assert_eq!(state.last_n(100).len(), 5);
    }

    #[test]
    fn last_n_interactions_counts_pairs() {
        // [U1, A1, U2, A2, U3, A3], n=2 -> [U2, A2, U3, A3]
        let mut state = ConversationState::new("agent-1");
        state.append(user_at("U1", 0));
        state.append(assistant_at("A1", 1));
        state.append(user_at("U2", 2));
        state.append(assistant_at("A2", 3));
        state.append(user_at("U3", 4));
        state.append(assistant_at("A3", 5));

        let window = state.last_n_interactions(2);
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["U2", "A2", "U3", "A3"]);
    }

    #[test]
    fn last_n_interactions_drops_dangling_turn_prefix() {
        // [U1, A1, U2], n=1 -> [U2]: the completed first interaction is
        // dropped because the window must open on U2.
        let mut state = ConversationState::new("agent-1");
        state.append(user_at("U1", 0));
        state.append(assistant_at("A1", 1));
        state.append(user_at("U2", 2));

        let window = state.last_n_interactions(1);
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["U2"]);
    }

    #[test]
    fn last_n_interactions_never_opens_on_assistant() {
        let mut state = ConversationState::new("agent-1");
        state.append(assistant_at("A0", 0));
        state.append(user_at("U1", 1));
        state.append(assistant_at("A1", 2));

        for n in 1..4 {
            let window = state.last_n_interactions(n);
            if let Some(first) = window.first() {
                assert!(first.role.can_open_window(), "n={n} opened on {}", first.role);
            }
        }
    }

    #[test]
    fn last_n_interactions_all_assistant_history_is_empty() {
        let mut state = ConversationState::new("agent-1");
        state.append(assistant_at("A1", 0));
        state.append(assistant_at("A2", 1));
        assert!(state.last_n_interactions(3).is_empty());
    }

    #[test]
    fn last_n_interactions_includes_tool_turns() {
        // Tool results open interactions the same way user turns do.
        let mut state = ConversationState::new("agent-1");
        state.append(user_at("U1", 0));
        state.append(
            Message::assistant("")
                .with_created_at(at(1))
                .with_tool_calls(vec![crate::message::MessageToolCall {
                    id: "call_1".into(),
                    name: "lookup".into(),
                    arguments: "{}".into(),
                }]),
        );
        state.append(Message::tool_result("call_1", "lookup", "ok").with_created_at(at(2)));
        state.append(assistant_at("A1", 3));

        let window = state.last_n_interactions(1);
        let roles: Vec<Role> = window.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Tool, Role::Assistant]);
    }

    #[test]
    fn memory_operations_touch_updated_at() {
        let mut state = ConversationState::new("agent-1");
        let before = state.updated_at;
        state.memory_set("symbol", serde_json::json!("AAPL"));
        assert!(state.updated_at >= before);
        assert_eq!(state.memory_get("symbol"), Some(&serde_json::json!("AAPL")));

        let removed = state.memory_delete("symbol");
        assert_eq!(removed, Some(serde_json::json!("AAPL")));
        assert!(state.memory_get("symbol").is_none());

        state.memory_set("a", serde_json::json!(1));
        state.memory_set("b", serde_json::json!(2));
        state.memory_clear();
        assert!(state.memory.is_empty());
    }

    #[test]
    fn expiry_follows_ttl_from_last_mutation() {
        let mut state = ConversationState::new("agent-1").with_ttl(60);
        assert!(!state.is_expired());

        state.updated_at = Utc::now() - Duration::seconds(120);
        assert!(state.is_expired());

        state.ttl = None;
        assert!(!state.is_expired());
    }
}
