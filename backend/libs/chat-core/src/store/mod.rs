pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ChatResult;
use crate::models::{Conversation, Message, MessageKind};

/// Input for persisting a new message. The receiver is always derived from
/// the conversation's other slot, never taken from the caller.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<String>,
    pub replied_to: Option<Uuid>,
}

impl NewMessage {
    pub fn text(conversation_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_id,
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
            replied_to: None,
        }
    }
}

/// One page of a conversation's history, newest first.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub page_size: u32,
    pub total_messages: i64,
}

impl MessagePage {
    pub fn total_pages(&self) -> u32 {
        if self.total_messages == 0 {
            return 0;
        }
        let size = self.page_size.max(1) as i64;
        ((self.total_messages + size - 1) / size) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1 && self.total_pages() > 0
    }
}

/// Result of a read-acknowledgement. `newly_read` is true for exactly one of
/// any number of acknowledgements of the same message, which is what gates
/// the unread-counter decrement.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub message: Message,
    pub newly_read: bool,
}

/// Owns Conversation entities: pairwise deduplication and atomic per-slot
/// unread counters.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the conversation for the unordered pair, creating it with the
    /// supplied slot order when none exists. Safe under concurrent invocation
    /// by both participants: exactly one conversation survives and every
    /// caller receives it.
    async fn resolve_or_create(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
    ) -> ChatResult<Conversation>;

    async fn get(&self, conversation_id: Uuid) -> ChatResult<Conversation>;

    /// All conversations where the user occupies either slot, most recent
    /// activity first.
    async fn list_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Conversation>>;

    /// Point the conversation at its most recent message. Last commit wins
    /// under concurrent sends.
    async fn touch_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> ChatResult<()>;

    /// Atomically add one to the slot `for_user` occupies.
    async fn increment_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()>;

    /// Atomically subtract one from the slot `for_user` occupies, floored at
    /// zero. Decrementing an already-zero counter is a no-op, not an error.
    async fn decrement_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()>;

    /// Atomically zero the slot `for_user` occupies.
    async fn reset_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()>;

    /// Sum of the user's unread counters across all their conversations.
    async fn total_unread_for_user(&self, user_id: Uuid) -> ChatResult<i64>;

    /// Remove the conversation and all its messages as one logical operation.
    async fn delete(&self, conversation_id: Uuid) -> ChatResult<()>;
}

/// Owns Message entities: lifecycle flags, history pagination and read/
/// delivery transitions.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message with `is_read = false`, `is_delivered = false`.
    /// Fails when the conversation is missing or the sender occupies neither
    /// slot.
    async fn create(&self, new_message: NewMessage) -> ChatResult<Message>;

    async fn get(&self, message_id: Uuid) -> ChatResult<Message>;

    /// Batch lookup preserving only ids that still resolve.
    async fn fetch_many(&self, message_ids: &[Uuid]) -> ChatResult<Vec<Message>>;

    /// Replace the content and bump `updated_at`.
    async fn edit(&self, message_id: Uuid, content: &str) -> ChatResult<Message>;

    /// Remove the message. No side effects on the parent conversation.
    async fn delete(&self, message_id: Uuid) -> ChatResult<()>;

    /// Newest-first page with `offset = (page - 1) * page_size`. A page past
    /// the end yields an empty list, not an error.
    async fn page(&self, conversation_id: Uuid, page: u32, page_size: u32)
        -> ChatResult<MessagePage>;

    /// First-transition read claim: sets `is_read`/`read_at` once; redundant
    /// acknowledgements succeed without touching `read_at`.
    async fn mark_read(&self, message_id: Uuid) -> ChatResult<ReadOutcome>;

    /// Same first-transition semantics for the delivery flag.
    async fn mark_delivered(&self, message_id: Uuid) -> ChatResult<Message>;

    /// Mark every unread message addressed to `receiver_id` in the
    /// conversation as read; returns how many transitioned.
    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        receiver_id: Uuid,
    ) -> ChatResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(total: i64, page: u32, page_size: u32) -> MessagePage {
        MessagePage {
            messages: Vec::new(),
            page,
            page_size,
            total_messages: total,
        }
    }

    #[test]
    fn page_math_rounds_up() {
        assert_eq!(page_of(15, 1, 10).total_pages(), 2);
        assert_eq!(page_of(20, 1, 10).total_pages(), 2);
        assert_eq!(page_of(21, 1, 10).total_pages(), 3);
        assert_eq!(page_of(0, 1, 10).total_pages(), 0);
    }

    #[test]
    fn page_two_of_fifteen_is_the_last() {
        let page = page_of(15, 2, 10);
        assert!(!page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn empty_history_has_no_neighbours() {
        let page = page_of(0, 1, 10);
        assert!(!page.has_next());
        assert!(!page.has_prev());
    }

    #[test]
    fn text_accepts_borrowed_and_owned_content() {
        let (conversation_id, sender_id) = (Uuid::new_v4(), Uuid::new_v4());
        let borrowed = NewMessage::text(conversation_id, sender_id, "hi");
        let owned = NewMessage::text(conversation_id, sender_id, String::from("hi"));
        assert_eq!(borrowed.content, owned.content);
        assert_eq!(borrowed.kind, MessageKind::Text);
        assert!(borrowed.attachments.is_empty());
        assert!(borrowed.replied_to.is_none());
    }
}
