//! Per-conversation mutual exclusion.
//!
//! Two simultaneous requests against one conversation id would both mutate
//! the same state and race on the final save. The engine serializes them
//! with a keyed async mutex: the guard is taken before the state is loaded
//! and held until the request (or its outward stream) completes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use palaver_core::message::ConversationId;

/// A keyed lock: one mutex per conversation id.
#[derive(Clone, Default)]
pub struct SessionLocks {
    // Entries are never reaped; one Arc<Mutex> per distinct conversation id
    // seen by this engine instance.
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a conversation, waiting if another request
    /// holds it.
    pub async fn acquire(&self, id: &ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
