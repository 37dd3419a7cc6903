use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::models::{unordered_key, Conversation, Message};
use crate::store::{ConversationStore, MessagePage, MessageStore, NewMessage, ReadOutcome};

#[derive(Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    /// Unordered participant pair -> conversation id (the dedup constraint).
    pair_index: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
    /// Conversation id -> message ids in creation order.
    history: HashMap<Uuid, Vec<Uuid>>,
}

/// In-memory implementation of both stores, for hermetic tests and
/// embedding. Every operation takes the single write or read guard, so each
/// is atomic with respect to the counters and the pair index.
#[derive(Clone, Default)]
pub struct InMemoryChatStore {
    inner: Arc<RwLock<State>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_pair(a: Uuid, b: Uuid) -> ChatResult<()> {
    if a.is_nil() || b.is_nil() {
        return Err(ChatError::InvalidParticipants(
            "participant ids must not be nil".into(),
        ));
    }
    if a == b {
        return Err(ChatError::InvalidParticipants(
            "a conversation needs two distinct participants".into(),
        ));
    }
    Ok(())
}

#[async_trait]
impl ConversationStore for InMemoryChatStore {
    async fn resolve_or_create(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
    ) -> ChatResult<Conversation> {
        validate_pair(participant_a, participant_b)?;

        let mut state = self.inner.write().await;
        let key = unordered_key(participant_a, participant_b);
        if let Some(existing) = state
            .pair_index
            .get(&key)
            .and_then(|id| state.conversations.get(id))
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participant_a,
            participant_b,
            last_message_id: None,
            last_message_at: now,
            unread_a: 0,
            unread_b: 0,
            created_at: now,
        };
        state.pair_index.insert(key, conversation.id);
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        state.history.insert(conversation.id, Vec::new());
        Ok(conversation)
    }

    async fn get(&self, conversation_id: Uuid) -> ChatResult<Conversation> {
        let state = self.inner.read().await;
        state
            .conversations
            .get(&conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))
    }

    async fn list_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Conversation>> {
        let state = self.inner.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|x, y| y.last_message_at.cmp(&x.last_message_at));
        Ok(conversations)
    }

    async fn touch_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        conversation.last_message_id = Some(message_id);
        conversation.last_message_at = at;
        Ok(())
    }

    async fn increment_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        if for_user == conversation.participant_a {
            conversation.unread_a += 1;
        } else if for_user == conversation.participant_b {
            conversation.unread_b += 1;
        } else {
            return Err(ChatError::NotAParticipant {
                user_id: for_user,
                conversation_id,
            });
        }
        Ok(())
    }

    async fn decrement_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        if for_user == conversation.participant_a {
            conversation.unread_a = (conversation.unread_a - 1).max(0);
        } else if for_user == conversation.participant_b {
            conversation.unread_b = (conversation.unread_b - 1).max(0);
        } else {
            return Err(ChatError::NotAParticipant {
                user_id: for_user,
                conversation_id,
            });
        }
        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        if for_user == conversation.participant_a {
            conversation.unread_a = 0;
        } else if for_user == conversation.participant_b {
            conversation.unread_b = 0;
        } else {
            return Err(ChatError::NotAParticipant {
                user_id: for_user,
                conversation_id,
            });
        }
        Ok(())
    }

    async fn total_unread_for_user(&self, user_id: Uuid) -> ChatResult<i64> {
        let state = self.inner.read().await;
        Ok(state
            .conversations
            .values()
            .filter_map(|c| c.unread_for(user_id))
            .sum())
    }

    async fn delete(&self, conversation_id: Uuid) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .remove(&conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        state.pair_index.remove(&unordered_key(
            conversation.participant_a,
            conversation.participant_b,
        ));
        if let Some(message_ids) = state.history.remove(&conversation_id) {
            for message_id in message_ids {
                state.messages.remove(&message_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryChatStore {
    async fn create(&self, new_message: NewMessage) -> ChatResult<Message> {
        let mut state = self.inner.write().await;
        if let Some(replied_to) = new_message.replied_to {
            if !state.messages.contains_key(&replied_to) {
                return Err(ChatError::not_found("message", replied_to));
            }
        }
        let conversation = state
            .conversations
            .get(&new_message.conversation_id)
            .ok_or_else(|| ChatError::not_found("conversation", new_message.conversation_id))?;
        let receiver_id = conversation
            .other_participant(new_message.sender_id)
            .ok_or(ChatError::SenderNotInConversation {
                sender_id: new_message.sender_id,
                conversation_id: new_message.conversation_id,
            })?;

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new_message.conversation_id,
            sender_id: new_message.sender_id,
            receiver_id,
            content: new_message.content,
            kind: new_message.kind,
            attachments: new_message.attachments,
            replied_to: new_message.replied_to,
            is_delivered: false,
            delivered_at: None,
            is_read: false,
            read_at: None,
            created_at: now,
            updated_at: now,
        };
        state
            .history
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, message_id: Uuid) -> ChatResult<Message> {
        let state = self.inner.read().await;
        state
            .messages
            .get(&message_id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("message", message_id))
    }

    async fn fetch_many(&self, message_ids: &[Uuid]) -> ChatResult<Vec<Message>> {
        let state = self.inner.read().await;
        Ok(message_ids
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn edit(&self, message_id: Uuid, content: &str) -> ChatResult<Message> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        message.content = content.to_string();
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    async fn delete(&self, message_id: Uuid) -> ChatResult<()> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .remove(&message_id)
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        if let Some(ids) = state.history.get_mut(&message.conversation_id) {
            ids.retain(|id| *id != message_id);
        }
        Ok(())
    }

    async fn page(
        &self,
        conversation_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> ChatResult<MessagePage> {
        let state = self.inner.read().await;
        let ids = state.history.get(&conversation_id);
        let total_messages = ids.map(|v| v.len() as i64).unwrap_or(0);
        let skip = (page as usize)
            .saturating_sub(1)
            .saturating_mul(page_size as usize);
        let messages = ids
            .map(|v| {
                v.iter()
                    .rev()
                    .skip(skip)
                    .take(page_size as usize)
                    .filter_map(|id| state.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(MessagePage {
            messages,
            page,
            page_size,
            total_messages,
        })
    }

    async fn mark_read(&self, message_id: Uuid) -> ChatResult<ReadOutcome> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        if message.is_read {
            return Ok(ReadOutcome {
                message: message.clone(),
                newly_read: false,
            });
        }
        let now = Utc::now();
        message.is_read = true;
        message.read_at = Some(now);
        message.updated_at = now;
        Ok(ReadOutcome {
            message: message.clone(),
            newly_read: true,
        })
    }

    async fn mark_delivered(&self, message_id: Uuid) -> ChatResult<Message> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        let now = Utc::now();
        message.is_delivered = true;
        message.delivered_at = message.delivered_at.or(Some(now));
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        receiver_id: Uuid,
    ) -> ChatResult<u64> {
        let mut state = self.inner.write().await;
        let now = Utc::now();
        let mut transitioned = 0;
        for message in state.messages.values_mut() {
            if message.conversation_id == conversation_id
                && message.receiver_id == receiver_id
                && !message.is_read
            {
                message.is_read = true;
                message.read_at = Some(now);
                message.updated_at = now;
                transitioned += 1;
            }
        }
        Ok(transitioned)
    }
}
