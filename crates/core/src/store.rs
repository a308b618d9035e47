//! StateStore trait — the persistence contract for conversation state.
//!
//! The engine loads state at the start of a request and saves it exactly
//! once when the request completes. Implementations live outside this crate
//! (databases, caches, the in-memory backend in `palaver-store`).
//! Serializing concurrent writers for one conversation id beyond the
//! engine's own keyed lock is the store's concern.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::ConversationId;
use crate::state::ConversationState;

/// Load/save conversation state by id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Find a conversation by id.
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, StoreError>;

    /// Persist a conversation, replacing any previous version.
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Delete every conversation belonging to an agent. Returns how many
    /// were removed.
    async fn delete_by_agent_id(&self, agent_id: &str) -> Result<usize, StoreError>;
}
