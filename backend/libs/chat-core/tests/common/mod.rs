#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use chat_core::config::Limits;
use chat_core::dto::{NewConversationRequest, ParticipantsInput, SendMessageRequest};
use chat_core::services::{ChatService, StaticUserDirectory, UserProfile};
use chat_core::store::memory::InMemoryChatStore;
use uuid::Uuid;

pub type MemoryChatService = ChatService<InMemoryChatStore, InMemoryChatStore, StaticUserDirectory>;

pub struct TestBench {
    pub service: Arc<MemoryChatService>,
    pub store: Arc<InMemoryChatStore>,
    pub alice: UserProfile,
    pub bob: UserProfile,
}

pub fn profile(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        email: Some(format!("{name}@worklane.dev")),
        avatar_url: None,
    }
}

/// A chat service over the in-memory store with two directory-known users.
pub fn bench() -> TestBench {
    let alice = profile("alice");
    let bob = profile("bob");
    bench_with(&[alice.clone(), bob.clone()], alice, bob)
}

pub fn bench_with(known: &[UserProfile], alice: UserProfile, bob: UserProfile) -> TestBench {
    let store = Arc::new(InMemoryChatStore::new());
    let mut directory = StaticUserDirectory::new();
    for profile in known {
        directory = directory.with_profile(profile.clone());
    }
    let service = Arc::new(ChatService::new(
        store.clone(),
        store.clone(),
        Arc::new(directory),
        Limits::default(),
    ));
    TestBench {
        service,
        store,
        alice,
        bob,
    }
}

pub fn open_with(other: Uuid) -> NewConversationRequest {
    NewConversationRequest {
        participants: ParticipantsInput::One(other.to_string()),
    }
}

pub fn send(conversation_id: Uuid, sender_id: Uuid, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        conversation_id,
        sender_id,
        receiver_id: None,
        content: content.to_string(),
        kind: Default::default(),
        attachments: Vec::new(),
        replied_to: None,
    }
}

pub fn test_database_url() -> Option<String> {
    env::var("DATABASE_URL").ok()
}
