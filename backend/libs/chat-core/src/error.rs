use thiserror::Error;
use uuid::Uuid;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("sender {sender_id} is not a participant of conversation {conversation_id}")]
    SenderNotInConversation {
        sender_id: Uuid,
        conversation_id: Uuid,
    },

    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    NotAParticipant {
        user_id: Uuid,
        conversation_id: Uuid,
    },

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ChatError::NotFound { entity, id }
    }

    /// Stable machine-readable kind for the transport layer to map.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidParticipants(_) => "INVALID_PARTICIPANTS",
            ChatError::NotFound { .. } => "NOT_FOUND",
            ChatError::SenderNotInConversation { .. } => "SENDER_NOT_IN_CONVERSATION",
            ChatError::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            ChatError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ChatError::Validation(_) => "VALIDATION_ERROR",
            ChatError::Config(_) => "CONFIG_ERROR",
            ChatError::Database(_) => "DATABASE_ERROR",
            ChatError::Migrate(_) => "MIGRATION_ERROR",
        }
    }

    /// Returns whether this error is retryable (e.g., database connection timeout).
    /// Caller-facing kinds indicate bad input or stale client state and are
    /// never retried by this crate.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Database(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            _ => false,
        }
    }
}
