use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message, MessageKind};
use crate::store::{ConversationStore, MessagePage, MessageStore, NewMessage, ReadOutcome};

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    participant_a: Uuid,
    participant_b: Uuid,
    last_message_id: Option<Uuid>,
    last_message_at: DateTime<Utc>,
    unread_a: i64,
    unread_b: i64,
    created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            participant_a: row.participant_a,
            participant_b: row.participant_b,
            last_message_id: row.last_message_id,
            last_message_at: row.last_message_at,
            unread_a: row.unread_a,
            unread_b: row.unread_b,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    kind: String,
    attachments: Vec<String>,
    replied_to: Option<Uuid>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            kind: MessageKind::from_str(&row.kind).unwrap_or_default(),
            attachments: row.attachments,
            replied_to: row.replied_to,
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
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

/// PostgreSQL-backed conversation store
pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_pair(&self, a: Uuid, b: Uuid) -> ChatResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_a, participant_b, last_message_id,
                   last_message_at, unread_a, unread_b, created_at
            FROM conversations
            WHERE LEAST(participant_a, participant_b) = LEAST($1, $2)
              AND GREATEST(participant_a, participant_b) = GREATEST($1, $2)
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Conversation::from))
    }

    /// Distinguishes a missing conversation from a non-member after an
    /// UPDATE matched zero rows.
    async fn membership_error(&self, conversation_id: Uuid, user_id: Uuid) -> ChatError {
        match self.get(conversation_id).await {
            Ok(_) => ChatError::NotAParticipant {
                user_id,
                conversation_id,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn resolve_or_create(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
    ) -> ChatResult<Conversation> {
        validate_pair(participant_a, participant_b)?;

        if let Some(existing) = self.find_by_pair(participant_a, participant_b).await? {
            return Ok(existing);
        }

        let inserted = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b)
            VALUES ($1, $2, $3)
            ON CONFLICT ((LEAST(participant_a, participant_b)), (GREATEST(participant_a, participant_b)))
                DO NOTHING
            RETURNING id, participant_a, participant_b, last_message_id,
                      last_message_at, unread_a, unread_b, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(participant_a)
        .bind(participant_b)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(row.into()),
            // Lost the creation race; the winner's row must be visible now.
            None => self
                .find_by_pair(participant_a, participant_b)
                .await?
                .ok_or_else(|| {
                    ChatError::ConcurrencyConflict(format!(
                        "conversation for pair ({participant_a}, {participant_b}) vanished after insert conflict"
                    ))
                }),
        }
    }

    async fn get(&self, conversation_id: Uuid) -> ChatResult<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_a, participant_b, last_message_id,
                   last_message_at, unread_a, unread_b, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::from)
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))
    }

    async fn list_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_a, participant_b, last_message_id,
                   last_message_at, unread_a, unread_b, created_at
            FROM conversations
            WHERE participant_a = $1 OR participant_b = $1
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn touch_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = $2, last_message_at = $3
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(conversation_id = %conversation_id, "conversation not found when touching last message");
            return Err(ChatError::not_found("conversation", conversation_id));
        }

        Ok(())
    }

    async fn increment_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET unread_a = unread_a + CASE WHEN participant_a = $2 THEN 1 ELSE 0 END,
                unread_b = unread_b + CASE WHEN participant_b = $2 THEN 1 ELSE 0 END
            WHERE id = $1 AND (participant_a = $2 OR participant_b = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(for_user)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.membership_error(conversation_id, for_user).await);
        }

        Ok(())
    }

    async fn decrement_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET unread_a = CASE WHEN participant_a = $2 THEN GREATEST(unread_a - 1, 0) ELSE unread_a END,
                unread_b = CASE WHEN participant_b = $2 THEN GREATEST(unread_b - 1, 0) ELSE unread_b END
            WHERE id = $1 AND (participant_a = $2 OR participant_b = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(for_user)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.membership_error(conversation_id, for_user).await);
        }

        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, for_user: Uuid) -> ChatResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET unread_a = CASE WHEN participant_a = $2 THEN 0 ELSE unread_a END,
                unread_b = CASE WHEN participant_b = $2 THEN 0 ELSE unread_b END
            WHERE id = $1 AND (participant_a = $2 OR participant_b = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(for_user)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.membership_error(conversation_id, for_user).await);
        }

        Ok(())
    }

    async fn total_unread_for_user(&self, user_id: Uuid) -> ChatResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN participant_a = $1 THEN unread_a ELSE unread_b END), 0)::BIGINT
            FROM conversations
            WHERE participant_a = $1 OR participant_b = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn delete(&self, conversation_id: Uuid) -> ChatResult<()> {
        // Child messages go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::not_found("conversation", conversation_id));
        }

        Ok(())
    }
}

/// PostgreSQL-backed message store
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conversation_exists(&self, conversation_id: Uuid) -> ChatResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// OFFSET for a 1-based page. Saturates rather than overflowing i64 when a
/// direct store caller passes extreme page numbers.
fn page_offset(page: u32, page_size: u32) -> i64 {
    (page as i64 - 1).max(0).saturating_mul(page_size as i64)
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn create(&self, new_message: NewMessage) -> ChatResult<Message> {
        if let Some(replied_to) = new_message.replied_to {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
                    .bind(replied_to)
                    .fetch_one(&self.pool)
                    .await?;
            if !exists {
                return Err(ChatError::not_found("message", replied_to));
            }
        }

        // The INSERT..SELECT derives the receiver from the other slot and
        // refuses to insert for a non-member sender in the same statement.
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id,
                                  content, kind, attachments, replied_to)
            SELECT $1, c.id, $3,
                   CASE WHEN c.participant_a = $3 THEN c.participant_b ELSE c.participant_a END,
                   $4, $5, $6, $7
            FROM conversations c
            WHERE c.id = $2 AND (c.participant_a = $3 OR c.participant_b = $3)
            RETURNING id, conversation_id, sender_id, receiver_id, content, kind,
                      attachments, replied_to, is_delivered, delivered_at,
                      is_read, read_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_message.conversation_id)
        .bind(new_message.sender_id)
        .bind(&new_message.content)
        .bind(new_message.kind.as_str())
        .bind(&new_message.attachments)
        .bind(new_message.replied_to)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                if self.conversation_exists(new_message.conversation_id).await? {
                    Err(ChatError::SenderNotInConversation {
                        sender_id: new_message.sender_id,
                        conversation_id: new_message.conversation_id,
                    })
                } else {
                    Err(ChatError::not_found(
                        "conversation",
                        new_message.conversation_id,
                    ))
                }
            }
        }
    }

    async fn get(&self, message_id: Uuid) -> ChatResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, kind,
                   attachments, replied_to, is_delivered, delivered_at,
                   is_read, read_at, created_at, updated_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::from)
            .ok_or_else(|| ChatError::not_found("message", message_id))
    }

    async fn fetch_many(&self, message_ids: &[Uuid]) -> ChatResult<Vec<Message>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, kind,
                   attachments, replied_to, is_delivered, delivered_at,
                   is_read, read_at, created_at, updated_at
            FROM messages
            WHERE id = ANY($1)
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn edit(&self, message_id: Uuid, content: &str) -> ChatResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, conversation_id, sender_id, receiver_id, content, kind,
                      attachments, replied_to, is_delivered, delivered_at,
                      is_read, read_at, created_at, updated_at
            "#,
        )
        .bind(message_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::from)
            .ok_or_else(|| ChatError::not_found("message", message_id))
    }

    async fn delete(&self, message_id: Uuid) -> ChatResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::not_found("message", message_id));
        }

        Ok(())
    }

    async fn page(
        &self,
        conversation_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> ChatResult<MessagePage> {
        let total_messages: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;

        let offset = page_offset(page, page_size);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, kind,
                   attachments, replied_to, is_delivered, delivered_at,
                   is_read, read_at, created_at, updated_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(MessagePage {
            messages: rows.into_iter().map(Message::from).collect(),
            page,
            page_size,
            total_messages,
        })
    }

    async fn mark_read(&self, message_id: Uuid) -> ChatResult<ReadOutcome> {
        // Conditional claim: exactly one of any number of concurrent
        // acknowledgements observes the unread -> read transition.
        let claimed = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND is_read = FALSE
            RETURNING id, conversation_id, sender_id, receiver_id, content, kind,
                      attachments, replied_to, is_delivered, delivered_at,
                      is_read, read_at, created_at, updated_at
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(row) => Ok(ReadOutcome {
                message: row.into(),
                newly_read: true,
            }),
            None => {
                let message = self.get(message_id).await?;
                Ok(ReadOutcome {
                    message,
                    newly_read: false,
                })
            }
        }
    }

    async fn mark_delivered(&self, message_id: Uuid) -> ChatResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET is_delivered = TRUE,
                delivered_at = COALESCE(delivered_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, conversation_id, sender_id, receiver_id, content, kind,
                      attachments, replied_to, is_delivered, delivered_at,
                      is_read, read_at, created_at, updated_at
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::from)
            .ok_or_else(|| ChatError::not_found("message", message_id))
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        receiver_id: Uuid,
    ) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW(), updated_at = NOW()
            WHERE conversation_id = $1 AND receiver_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
