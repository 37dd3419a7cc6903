//! # Direct Messaging Core
//!
//! Pairwise conversations, per-slot unread counters and message lifecycle
//! for Worklane direct messaging. The transport layer (HTTP, websocket) is
//! a consumer of this crate, not part of it.
//!
//! The crate guarantees:
//! 1. At most one conversation per unordered participant pair, enforced by a
//!    storage-level uniqueness constraint; a losing concurrent creator
//!    receives the winner, not an error
//! 2. Unread counters move through atomic storage operations only, so
//!    concurrent sends and read-acknowledgements never lose updates
//! 3. A sent message is durable before any counter or pointer maintenance
//!    runs; follow-up failures are logged, never rolled back
//!
//! Storage is behind the [`store::ConversationStore`] and
//! [`store::MessageStore`] traits with PostgreSQL and in-memory
//! implementations; display identity comes from the
//! [`services::UserDirectory`] collaborator.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chat_core::config::Limits;
//! use chat_core::dto::{NewConversationRequest, ParticipantsInput, SendMessageRequest};
//! use chat_core::services::{ChatService, StaticUserDirectory};
//! use chat_core::store::memory::InMemoryChatStore;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryChatStore::new());
//!     let service = ChatService::new(
//!         store.clone(),
//!         store.clone(),
//!         Arc::new(StaticUserDirectory::new()),
//!         Limits::default(),
//!     );
//!
//!     let alice = Uuid::new_v4();
//!     let bob = Uuid::new_v4();
//!     let conversation = service
//!         .create_or_get_conversation(
//!             alice,
//!             NewConversationRequest {
//!                 participants: ParticipantsInput::One(bob.to_string()),
//!             },
//!         )
//!         .await?;
//!
//!     service
//!         .send_message(SendMessageRequest {
//!             conversation_id: conversation.id,
//!             sender_id: alice,
//!             receiver_id: None,
//!             content: "hi".into(),
//!             kind: Default::default(),
//!             attachments: Vec::new(),
//!             replied_to: None,
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{ChatError, ChatResult};
