use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Limits;
use crate::dto::{
    ConversationView, MessageHistoryView, MessageView, NewConversationRequest, PaginationMeta,
    SendMessageRequest,
};
use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message};
use crate::services::directory::UserDirectory;
use crate::store::{ConversationStore, MessageStore, NewMessage};

/// Composes the conversation and message stores into the multi-step
/// workflows that carry the cross-entity invariants.
///
/// - **Send**: the message is durable first; last-message pointer and unread
///   counter follow best-effort, with failures logged as detectable
///   inconsistencies rather than rolled back.
/// - **Read-acknowledge**: decrements only the acknowledging reader's own
///   slot, only on a message's first acknowledgement, and only when the
///   message was addressed to that reader.
/// - **Projection**: entities carry user ids only; display identity is
///   resolved through the directory after the core operation ran.
pub struct ChatService<C: ConversationStore, M: MessageStore, D: UserDirectory> {
    conversations: Arc<C>,
    messages: Arc<M>,
    directory: Arc<D>,
    limits: Limits,
}

impl<C: ConversationStore, M: MessageStore, D: UserDirectory> ChatService<C, M, D> {
    pub fn new(conversations: Arc<C>, messages: Arc<M>, directory: Arc<D>, limits: Limits) -> Self {
        Self {
            conversations,
            messages,
            directory,
            limits,
        }
    }

    /// Normalizes the caller's participant input (a bare id, or an array of
    /// one or two ids including the current user) and resolves or creates
    /// the pairwise conversation.
    pub async fn create_or_get_conversation(
        &self,
        current_user: Uuid,
        request: NewConversationRequest,
    ) -> ChatResult<ConversationView> {
        let (participant_a, participant_b) = request.participants.normalize(current_user)?;
        let conversation = self
            .conversations
            .resolve_or_create(participant_a, participant_b)
            .await?;
        self.project_conversation(conversation).await
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> ChatResult<Vec<ConversationView>> {
        let conversations = self.conversations.list_for_user(user_id).await?;
        self.project_conversations(conversations).await
    }

    pub async fn delete_conversation(&self, conversation_id: Uuid) -> ChatResult<()> {
        self.conversations.delete(conversation_id).await?;
        info!(conversation_id = %conversation_id, "conversation deleted with all messages");
        Ok(())
    }

    /// Persist a message, then update the conversation's last-message
    /// pointer and the receiver's unread counter. The message is durable
    /// once created; pointer/counter failures are logged, never rolled back.
    pub async fn send_message(&self, request: SendMessageRequest) -> ChatResult<MessageView> {
        let conversation = self.conversations.get(request.conversation_id).await?;
        let receiver_id = conversation.other_participant(request.sender_id).ok_or(
            ChatError::SenderNotInConversation {
                sender_id: request.sender_id,
                conversation_id: request.conversation_id,
            },
        )?;
        if let Some(claimed) = request.receiver_id {
            if claimed != receiver_id {
                debug!(
                    conversation_id = %conversation.id,
                    claimed = %claimed,
                    derived = %receiver_id,
                    "receiver_id in request ignored in favour of the other slot"
                );
            }
        }
        self.validate_content(&request.content, !request.attachments.is_empty())?;

        let message = self
            .messages
            .create(NewMessage {
                conversation_id: conversation.id,
                sender_id: request.sender_id,
                content: request.content,
                kind: request.kind,
                attachments: request.attachments,
                replied_to: request.replied_to,
            })
            .await?;

        if let Err(err) = self
            .conversations
            .touch_last_message(conversation.id, message.id, message.created_at)
            .await
        {
            error!(
                conversation_id = %conversation.id,
                message_id = %message.id,
                error = %err,
                "failed to update last-message pointer after send"
            );
        }
        if let Err(err) = self
            .conversations
            .increment_unread(conversation.id, receiver_id)
            .await
        {
            error!(
                conversation_id = %conversation.id,
                message_id = %message.id,
                receiver_id = %receiver_id,
                error = %err,
                "failed to increment unread counter after send"
            );
        }

        self.project_message(message).await
    }

    pub async fn edit_message(&self, message_id: Uuid, content: &str) -> ChatResult<MessageView> {
        self.validate_content(content, false)?;
        let message = self.messages.edit(message_id, content).await?;
        self.project_message(message).await
    }

    pub async fn delete_message(&self, message_id: Uuid) -> ChatResult<()> {
        self.messages.delete(message_id).await
    }

    /// Newest-first history page. Page defaults to 1; page size defaults
    /// from configuration and is clamped to the configured maximum.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ChatResult<MessageHistoryView> {
        let page = page.unwrap_or(1);
        let page_size = page_size
            .unwrap_or(self.limits.default_page_size)
            .min(self.limits.max_page_size);
        if page == 0 || page_size == 0 {
            return Err(ChatError::Validation(
                "page and page_size must be positive".into(),
            ));
        }

        let history = self.messages.page(conversation_id, page, page_size).await?;
        let pagination = PaginationMeta::from(&history);
        let messages = self.project_messages(&history.messages).await?;
        Ok(MessageHistoryView {
            messages,
            pagination,
        })
    }

    /// Acknowledge a message as read. The reader's unread counter comes down
    /// by one only on the first acknowledgement of a message addressed to
    /// that reader; everything else leaves the counters alone.
    pub async fn mark_message_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
    ) -> ChatResult<MessageView> {
        let outcome = self.messages.mark_read(message_id).await?;
        let conversation = self
            .conversations
            .get(outcome.message.conversation_id)
            .await?;
        if !conversation.is_participant(reader_id) {
            return Err(ChatError::NotAParticipant {
                user_id: reader_id,
                conversation_id: conversation.id,
            });
        }
        if outcome.newly_read && outcome.message.receiver_id == reader_id {
            self.conversations
                .decrement_unread(conversation.id, reader_id)
                .await?;
        }
        self.project_message(outcome.message).await
    }

    /// Delivery receipt from the transport; no counter effects.
    pub async fn mark_message_delivered(&self, message_id: Uuid) -> ChatResult<MessageView> {
        let message = self.messages.mark_delivered(message_id).await?;
        self.project_message(message).await
    }

    /// Mark every unread message addressed to the reader in this
    /// conversation as read and zero the reader's counter. Returns how many
    /// messages transitioned.
    pub async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> ChatResult<u64> {
        let conversation = self.conversations.get(conversation_id).await?;
        if !conversation.is_participant(reader_id) {
            return Err(ChatError::NotAParticipant {
                user_id: reader_id,
                conversation_id,
            });
        }
        let transitioned = self
            .messages
            .mark_conversation_read(conversation_id, reader_id)
            .await?;
        self.conversations
            .reset_unread(conversation_id, reader_id)
            .await?;
        if transitioned > 0 {
            debug!(
                conversation_id = %conversation_id,
                reader_id = %reader_id,
                transitioned,
                "conversation marked read"
            );
        }
        Ok(transitioned)
    }

    /// Sum of the user's unread counters across all conversations.
    pub async fn total_unread(&self, user_id: Uuid) -> ChatResult<i64> {
        self.conversations.total_unread_for_user(user_id).await
    }

    fn validate_content(&self, content: &str, has_attachments: bool) -> ChatResult<()> {
        if content.trim().is_empty() && !has_attachments {
            return Err(ChatError::Validation("message content is empty".into()));
        }
        if content.chars().count() > self.limits.max_message_length {
            return Err(ChatError::Validation(format!(
                "message content exceeds {} characters",
                self.limits.max_message_length
            )));
        }
        Ok(())
    }

    async fn project_message(&self, message: Message) -> ChatResult<MessageView> {
        let profiles = self
            .directory
            .lookup(&[message.sender_id, message.receiver_id])
            .await?;
        Ok(MessageView::project(&message, &profiles))
    }

    async fn project_messages(&self, messages: &[Message]) -> ChatResult<Vec<MessageView>> {
        let mut user_ids: Vec<Uuid> = messages
            .iter()
            .flat_map(|m| [m.sender_id, m.receiver_id])
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let profiles = self.directory.lookup(&user_ids).await?;
        Ok(messages
            .iter()
            .map(|m| MessageView::project(m, &profiles))
            .collect())
    }

    async fn project_conversation(&self, conversation: Conversation) -> ChatResult<ConversationView> {
        let preview = match conversation.last_message_id {
            Some(id) => self.messages.fetch_many(&[id]).await?.pop(),
            None => None,
        };
        let profiles = self
            .directory
            .lookup(&[conversation.participant_a, conversation.participant_b])
            .await?;
        Ok(ConversationView::project(
            &conversation,
            preview.as_ref(),
            &profiles,
        ))
    }

    async fn project_conversations(
        &self,
        conversations: Vec<Conversation>,
    ) -> ChatResult<Vec<ConversationView>> {
        let mut user_ids = Vec::with_capacity(conversations.len() * 2);
        let mut preview_ids = Vec::new();
        for conversation in &conversations {
            user_ids.push(conversation.participant_a);
            user_ids.push(conversation.participant_b);
            if let Some(id) = conversation.last_message_id {
                preview_ids.push(id);
            }
        }
        user_ids.sort_unstable();
        user_ids.dedup();

        let previews: HashMap<Uuid, Message> = self
            .messages
            .fetch_many(&preview_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let profiles = self.directory.lookup(&user_ids).await?;

        Ok(conversations
            .iter()
            .map(|conversation| {
                let preview = conversation
                    .last_message_id
                    .and_then(|id| previews.get(&id));
                ConversationView::project(conversation, preview, &profiles)
            })
            .collect())
    }
}
