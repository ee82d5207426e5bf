//! Process-local conversation store with idle expiry and a capacity bound.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{ConversationHandle, ConversationStore};
use crate::error::StoreError;

struct Entry {
    handle: ConversationHandle,
    last_used: Instant,
}

impl Entry {
    fn new(handle: ConversationHandle) -> Self {
        Self {
            handle,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_used.elapsed() >= ttl
    }
}

/// In-memory [`ConversationStore`].
///
/// Entries idle for longer than `ttl` are dropped on access. When the store
/// is full, the least recently used sender is evicted to make room.
/// Contents are lost on restart.
pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl InMemoryConversationStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Make room for one more entry. Caller holds the write lock.
    fn evict_for_insert(&self, entries: &mut HashMap<String, Entry>) {
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl));
        let expired = before - entries.len();
        if expired > 0 {
            debug!(expired = expired, "conversation_store_expired");
        }

        // Linear scan; only runs when the store is at capacity.
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(sender, _)| sender.clone());

            match oldest {
                Some(sender) => {
                    entries.remove(&sender);
                    info!(
                        sender = %sender,
                        max_entries = self.max_entries,
                        "conversation_store_evicted"
                    );
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, sender: &str) -> Result<Option<ConversationHandle>, StoreError> {
        let mut entries = self.entries.write().await;

        match entries.get_mut(sender) {
            Some(entry) if entry.is_expired(self.ttl) => {
                entries.remove(sender);
                debug!(sender = %sender, "conversation_store_entry_expired");
                Ok(None)
            }
            Some(entry) => {
                entry.last_used = Instant::now();
                Ok(Some(entry.handle.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_or_insert(
        &self,
        sender: &str,
        handle: ConversationHandle,
    ) -> Result<ConversationHandle, StoreError> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(sender) {
            if !entry.is_expired(self.ttl) {
                entry.last_used = Instant::now();
                return Ok(entry.handle.clone());
            }
            entries.remove(sender);
        }

        self.evict_for_insert(&mut entries);
        entries.insert(sender.to_string(), Entry::new(handle.clone()));

        Ok(handle)
    }

    async fn update(&self, sender: &str, handle: ConversationHandle) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(sender) {
            self.evict_for_insert(&mut entries);
        }
        entries.insert(sender.to_string(), Entry::new(handle));

        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().await.len())
    }
}
