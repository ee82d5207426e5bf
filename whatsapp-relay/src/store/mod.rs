//! Sender to conversation-thread mapping.
//!
//! The relay talks to the store through [`ConversationStore`] so the
//! in-memory map can be swapped for an external store without touching the
//! request path.

pub mod memory;

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::InMemoryConversationStore;

/// Backend-assigned identifier of a multi-turn conversation (an assistant thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationHandle(String);

impl ConversationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for conversation handles keyed by sender id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Handle currently assigned to `sender`, if any.
    async fn get(&self, sender: &str) -> Result<Option<ConversationHandle>, StoreError>;

    /// Assign `handle` to `sender` unless one is already assigned.
    ///
    /// Returns the handle that is assigned after the call, which is the
    /// existing one when another request got there first.
    async fn get_or_insert(
        &self,
        sender: &str,
        handle: ConversationHandle,
    ) -> Result<ConversationHandle, StoreError>;

    /// Replace the handle assigned to `sender`.
    async fn update(&self, sender: &str, handle: ConversationHandle) -> Result<(), StoreError>;

    /// Number of tracked senders.
    async fn len(&self) -> Result<usize, StoreError>;
}
