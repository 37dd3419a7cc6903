use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message, MessageKind};
use crate::services::directory::UserProfile;
use crate::store::MessagePage;

/// Callers open a conversation with either a bare counterpart id or an
/// explicit array of one or two ids. Normalization always yields two
/// distinct ids including the current user.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParticipantsInput {
    One(String),
    Many(Vec<String>),
}

fn parse_participant(raw: &str) -> ChatResult<Uuid> {
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| ChatError::InvalidParticipants(format!("malformed participant id: {raw}")))?;
    if id.is_nil() {
        return Err(ChatError::InvalidParticipants(
            "participant id must not be nil".into(),
        ));
    }
    Ok(id)
}

impl ParticipantsInput {
    pub fn normalize(&self, current_user: Uuid) -> ChatResult<(Uuid, Uuid)> {
        if current_user.is_nil() {
            return Err(ChatError::InvalidParticipants(
                "current user id must not be nil".into(),
            ));
        }

        let raw: Vec<&str> = match self {
            ParticipantsInput::One(id) => vec![id.as_str()],
            ParticipantsInput::Many(ids) => ids.iter().map(String::as_str).collect(),
        };

        match raw.as_slice() {
            [] => Err(ChatError::InvalidParticipants(
                "at least one participant id is required".into(),
            )),
            [other] => {
                let other = parse_participant(other)?;
                if other == current_user {
                    return Err(ChatError::InvalidParticipants(
                        "a conversation needs two distinct participants".into(),
                    ));
                }
                Ok((current_user, other))
            }
            [first, second] => {
                let first = parse_participant(first)?;
                let second = parse_participant(second)?;
                if first == second {
                    return Err(ChatError::InvalidParticipants(
                        "a conversation needs two distinct participants".into(),
                    ));
                }
                if first != current_user && second != current_user {
                    return Err(ChatError::InvalidParticipants(
                        "current user must be one of the participants".into(),
                    ));
                }
                Ok((first, second))
            }
            _ => Err(ChatError::InvalidParticipants(
                "expected at most two participant ids".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewConversationRequest {
    pub participants: ParticipantsInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Accepted for wire compatibility; the receiver is always derived as
    /// the conversation's other participant.
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub replied_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePreview {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            created_at: message.created_at,
        }
    }
}

/// Conversation summary with participants expanded to display identity.
/// Arrays are in slot order (A then B).
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: [UserProfile; 2],
    pub last_message: Option<MessagePreview>,
    pub last_message_at: DateTime<Utc>,
    pub unread_counts: [i64; 2],
    pub created_at: DateTime<Utc>,
}

fn profile_or_placeholder(profiles: &HashMap<Uuid, UserProfile>, id: Uuid) -> UserProfile {
    profiles
        .get(&id)
        .cloned()
        .unwrap_or_else(|| UserProfile::placeholder(id))
}

impl ConversationView {
    pub fn project(
        conversation: &Conversation,
        last_message: Option<&Message>,
        profiles: &HashMap<Uuid, UserProfile>,
    ) -> Self {
        Self {
            id: conversation.id,
            participants: [
                profile_or_placeholder(profiles, conversation.participant_a),
                profile_or_placeholder(profiles, conversation.participant_b),
            ],
            last_message: last_message.map(MessagePreview::from),
            last_message_at: conversation.last_message_at,
            unread_counts: [conversation.unread_a, conversation.unread_b],
            created_at: conversation.created_at,
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> Option<i64> {
        self.participants
            .iter()
            .position(|p| p.id == user_id)
            .map(|slot| self.unread_counts[slot])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserProfile,
    pub receiver: UserProfile,
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<String>,
    pub replied_to: Option<Uuid>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageView {
    pub fn project(message: &Message, profiles: &HashMap<Uuid, UserProfile>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: profile_or_placeholder(profiles, message.sender_id),
            receiver: profile_or_placeholder(profiles, message.receiver_id),
            content: message.content.clone(),
            kind: message.kind,
            attachments: message.attachments.clone(),
            replied_to: message.replied_to,
            is_delivered: message.is_delivered,
            delivered_at: message.delivered_at,
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_messages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl From<&MessagePage> for PaginationMeta {
    fn from(page: &MessagePage) -> Self {
        Self {
            current_page: page.page,
            total_pages: page.total_pages(),
            total_messages: page.total_messages,
            has_next: page.has_next(),
            has_prev: page.has_prev(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageHistoryView {
    pub messages: Vec<MessageView>,
    pub pagination: PaginationMeta,
}
