//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use palaver_core::error::StoreError;
use palaver_core::message::ConversationId;
use palaver_core::state::ConversationState;
use palaver_core::store::StateStore;

/// A state store that keeps conversations in a map.
/// Useful for testing and sessions where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<ConversationId, ConversationState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of conversations held.
    pub async fn count(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        tracing::debug!(
            conversation_id = %state.id,
            messages = state.history.len(),
            "Saving conversation state"
        );
        self.states
            .write()
            .await
            .insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn delete_by_agent_id(&self, agent_id: &str) -> Result<usize, StoreError> {
        let mut states = self.states.write().await;
        let len_before = states.len();
        states.retain(|_, s| s.agent_id != agent_id);
        Ok(len_before - states.len())
    }
}
