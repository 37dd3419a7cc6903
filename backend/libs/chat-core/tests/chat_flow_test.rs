//! End-to-end messaging flows over the in-memory stores: conversation
//! dedup, unread counter lifecycle, history pagination and cascade delete.

mod common;

use std::sync::Arc;

use chat_core::config::Limits;
use chat_core::dto::{NewConversationRequest, ParticipantsInput};
use chat_core::services::{ChatService, StaticUserDirectory};
use chat_core::store::memory::InMemoryChatStore;
use chat_core::store::{ConversationStore, MessageStore};
use common::{bench, open_with, profile, send};
use uuid::Uuid;

#[tokio::test]
async fn first_contact_settles_counters() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);

    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    assert_eq!(conversation.unread_counts, [0, 0]);
    assert!(conversation.last_message.is_none());

    let hi = bench
        .service
        .send_message(send(conversation.id, alice, "hi"))
        .await
        .unwrap();
    assert_eq!(hi.receiver.id, bob);
    assert!(!hi.is_read);

    let hey = bench
        .service
        .send_message(send(conversation.id, bob, "hey"))
        .await
        .unwrap();
    assert_eq!(hey.receiver.id, alice);

    // Sending never touches the sender's own counter.
    let view = bench
        .service
        .list_conversations(alice)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(view.unread_for(alice), Some(1));
    assert_eq!(view.unread_for(bob), Some(1));
    assert_eq!(view.last_message.as_ref().map(|m| m.id), Some(hey.id));

    let read = bench.service.mark_message_read(hi.id, bob).await.unwrap();
    assert!(read.is_read);
    assert!(read.read_at.is_some());

    let view = bench
        .service
        .list_conversations(bob)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(view.unread_for(bob), Some(0));
    assert_eq!(view.unread_for(alice), Some(1));
}

#[tokio::test]
async fn conversation_is_deduplicated_across_initiators() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);

    let first = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let second = bench
        .service
        .create_or_get_conversation(bob, open_with(alice))
        .await
        .unwrap();
    let third = bench
        .service
        .create_or_get_conversation(
            alice,
            NewConversationRequest {
                participants: ParticipantsInput::Many(vec![
                    bob.to_string(),
                    alice.to_string(),
                ]),
            },
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, third.id);
    assert_eq!(bench.service.list_conversations(alice).await.unwrap().len(), 1);
    assert_eq!(bench.service.list_conversations(bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn outsider_cannot_send_and_nothing_is_written() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let carol = Uuid::new_v4();

    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();

    let err = bench
        .service
        .send_message(send(conversation.id, carol, "let me in"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SENDER_NOT_IN_CONVERSATION");

    let history = bench
        .service
        .list_messages(conversation.id, None, None)
        .await
        .unwrap();
    assert!(history.messages.is_empty());
    assert_eq!(history.pagination.total_messages, 0);

    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!((stored.unread_a, stored.unread_b), (0, 0));
    assert!(stored.last_message_id.is_none());
}

#[tokio::test]
async fn send_to_unknown_conversation_is_not_found() {
    let bench = bench();
    let err = bench
        .service
        .send_message(send(Uuid::new_v4(), bench.alice.id, "hello?"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}

#[tokio::test]
async fn claimed_receiver_is_ignored_in_favor_of_the_other_slot() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();

    let mut request = send(conversation.id, alice, "routed");
    request.receiver_id = Some(alice);
    let message = bench.service.send_message(request).await.unwrap();
    assert_eq!(message.receiver.id, bob);

    let view = bench
        .service
        .list_conversations(bob)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(view.unread_for(bob), Some(1));
    assert_eq!(view.unread_for(alice), Some(0));
}

#[tokio::test]
async fn history_pages_newest_first() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();

    for i in 1..=15 {
        bench
            .service
            .send_message(send(conversation.id, alice, &format!("m{i}")))
            .await
            .unwrap();
    }

    let first = bench
        .service
        .list_messages(conversation.id, Some(1), Some(10))
        .await
        .unwrap();
    assert_eq!(first.messages.len(), 10);
    assert_eq!(first.messages[0].content, "m15");
    assert_eq!(first.messages[9].content, "m6");
    assert!(first.pagination.has_next);
    assert!(!first.pagination.has_prev);

    let second = bench
        .service
        .list_messages(conversation.id, Some(2), Some(10))
        .await
        .unwrap();
    assert_eq!(second.messages.len(), 5);
    assert_eq!(second.messages[4].content, "m1");
    assert_eq!(second.pagination.total_messages, 15);
    assert_eq!(second.pagination.total_pages, 2);
    assert!(!second.pagination.has_next);
    assert!(second.pagination.has_prev);
}

#[tokio::test]
async fn page_beyond_history_is_empty_not_an_error() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    bench
        .service
        .send_message(send(conversation.id, alice, "only one"))
        .await
        .unwrap();

    let history = bench
        .service
        .list_messages(conversation.id, Some(4), Some(10))
        .await
        .unwrap();
    assert!(history.messages.is_empty());
    assert_eq!(history.pagination.total_messages, 1);
    assert!(!history.pagination.has_next);
    assert!(history.pagination.has_prev);
}

#[tokio::test]
async fn listing_an_unknown_conversation_yields_an_empty_page() {
    let bench = bench();
    let history = bench
        .service
        .list_messages(Uuid::new_v4(), None, None)
        .await
        .unwrap();
    assert!(history.messages.is_empty());
    assert_eq!(history.pagination.total_messages, 0);
    assert_eq!(history.pagination.total_pages, 0);
}

#[tokio::test]
async fn page_zero_is_rejected() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();

    let err = bench
        .service
        .list_messages(conversation.id, Some(0), Some(10))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn page_size_is_clamped_to_the_configured_maximum() {
    let alice = profile("alice");
    let bob = profile("bob");
    let store = Arc::new(InMemoryChatStore::new());
    let directory = StaticUserDirectory::new()
        .with_profile(alice.clone())
        .with_profile(bob.clone());
    let service = ChatService::new(
        store.clone(),
        store,
        Arc::new(directory),
        Limits {
            default_page_size: 2,
            max_page_size: 3,
            max_message_length: 4000,
        },
    );

    let conversation = service
        .create_or_get_conversation(alice.id, open_with(bob.id))
        .await
        .unwrap();
    for i in 1..=5 {
        service
            .send_message(send(conversation.id, alice.id, &format!("m{i}")))
            .await
            .unwrap();
    }

    // Oversized request comes back trimmed to the maximum, not rejected.
    let history = service
        .list_messages(conversation.id, Some(1), Some(50))
        .await
        .unwrap();
    assert_eq!(history.messages.len(), 3);
    assert_eq!(history.pagination.total_pages, 2);

    // No explicit size falls back to the configured default.
    let defaulted = service
        .list_messages(conversation.id, None, None)
        .await
        .unwrap();
    assert_eq!(defaulted.messages.len(), 2);
}

#[tokio::test]
async fn deleting_a_conversation_removes_its_messages() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let first = bench
        .service
        .send_message(send(conversation.id, alice, "one"))
        .await
        .unwrap();
    let second = bench
        .service
        .send_message(send(conversation.id, bob, "two"))
        .await
        .unwrap();

    bench.service.delete_conversation(conversation.id).await.unwrap();

    assert!(bench.service.list_conversations(alice).await.unwrap().is_empty());
    for id in [first.id, second.id] {
        let err = MessageStore::get(&*bench.store, id).await.unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }
    let history = bench
        .service
        .list_messages(conversation.id, None, None)
        .await
        .unwrap();
    assert!(history.messages.is_empty());
    assert_eq!(history.pagination.total_messages, 0);
    let err = bench
        .service
        .delete_conversation(conversation.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}

#[tokio::test]
async fn double_ack_keeps_counter_at_zero() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "hi"))
        .await
        .unwrap();

    let first = bench.service.mark_message_read(message.id, bob).await.unwrap();
    let second = bench.service.mark_message_read(message.id, bob).await.unwrap();
    assert_eq!(second.read_at, first.read_at);

    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.unread_for(bob), Some(0));
}

#[tokio::test]
async fn ack_by_the_sender_leaves_the_receiver_counter_alone() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "hi"))
        .await
        .unwrap();

    // Alice may read her own sent message, but the message is addressed to
    // Bob, so no counter moves.
    bench.service.mark_message_read(message.id, alice).await.unwrap();

    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.unread_for(bob), Some(1));
    assert_eq!(stored.unread_for(alice), Some(0));
}

#[tokio::test]
async fn ack_by_an_outsider_is_rejected() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "hi"))
        .await
        .unwrap();

    let err = bench
        .service
        .mark_message_read(message.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NOT_A_PARTICIPANT");

    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.unread_for(bob), Some(1));
}

#[tokio::test]
async fn edit_replaces_content_and_bumps_updated_at() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "draft"))
        .await
        .unwrap();

    let edited = bench
        .service
        .edit_message(message.id, "final")
        .await
        .unwrap();
    assert_eq!(edited.content, "final");
    assert!(edited.updated_at >= message.updated_at);
    assert_eq!(edited.created_at, message.created_at);

    let err = bench
        .service
        .edit_message(Uuid::new_v4(), "ghost")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}

#[tokio::test]
async fn deleting_a_message_has_no_side_effects() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "going away"))
        .await
        .unwrap();

    bench.service.delete_message(message.id).await.unwrap();

    // The pointer still names the deleted message; projection simply shows
    // no preview. Counters are untouched.
    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.last_message_id, Some(message.id));
    assert_eq!(stored.unread_for(bob), Some(1));

    let view = bench
        .service
        .list_conversations(alice)
        .await
        .unwrap()
        .remove(0);
    assert!(view.last_message.is_none());

    let history = bench
        .service
        .list_messages(conversation.id, None, None)
        .await
        .unwrap();
    assert!(history.messages.is_empty());
}

#[tokio::test]
async fn bulk_read_clears_the_reader_slot() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    for i in 1..=3 {
        bench
            .service
            .send_message(send(conversation.id, alice, &format!("m{i}")))
            .await
            .unwrap();
    }
    bench
        .service
        .send_message(send(conversation.id, bob, "reply"))
        .await
        .unwrap();

    let transitioned = bench
        .service
        .mark_conversation_read(conversation.id, bob)
        .await
        .unwrap();
    assert_eq!(transitioned, 3);

    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.unread_for(bob), Some(0));
    assert_eq!(stored.unread_for(alice), Some(1));

    // Second pass has nothing left to transition.
    let again = bench
        .service
        .mark_conversation_read(conversation.id, bob)
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn delivery_receipt_is_idempotent() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice, "hi"))
        .await
        .unwrap();
    assert!(!message.is_delivered);

    let first = bench
        .service
        .mark_message_delivered(message.id)
        .await
        .unwrap();
    assert!(first.is_delivered);
    let second = bench
        .service
        .mark_message_delivered(message.id)
        .await
        .unwrap();
    assert_eq!(second.delivered_at, first.delivered_at);

    // Delivery is independent of read state and counters.
    let stored = ConversationStore::get(&*bench.store, conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.unread_for(bob), Some(1));
}

#[tokio::test]
async fn total_unread_sums_across_conversations() {
    let carol = profile("carol");
    let alice = profile("alice");
    let bob = profile("bob");
    let bench = common::bench_with(
        &[alice.clone(), bob.clone(), carol.clone()],
        alice.clone(),
        bob.clone(),
    );

    let with_alice = bench
        .service
        .create_or_get_conversation(alice.id, open_with(bob.id))
        .await
        .unwrap();
    let with_carol = bench
        .service
        .create_or_get_conversation(carol.id, open_with(bob.id))
        .await
        .unwrap();

    for _ in 0..2 {
        bench
            .service
            .send_message(send(with_alice.id, alice.id, "ping"))
            .await
            .unwrap();
    }
    bench
        .service
        .send_message(send(with_carol.id, carol.id, "ping"))
        .await
        .unwrap();

    assert_eq!(bench.service.total_unread(bob.id).await.unwrap(), 3);
    assert_eq!(bench.service.total_unread(alice.id).await.unwrap(), 0);
}

#[tokio::test]
async fn content_rules_are_enforced() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();

    let err = bench
        .service
        .send_message(send(conversation.id, alice, "   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "VALIDATION_ERROR");

    let long = "x".repeat(4001);
    let err = bench
        .service
        .send_message(send(conversation.id, alice, &long))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "VALIDATION_ERROR");

    // Attachment-only messages are allowed to carry empty text.
    let mut request = send(conversation.id, alice, "");
    request.attachments = vec!["uploads/resume.pdf".to_string()];
    let message = bench.service.send_message(request).await.unwrap();
    assert_eq!(message.attachments.len(), 1);
}

#[tokio::test]
async fn unknown_directory_ids_project_as_placeholders() {
    let alice = profile("alice");
    let bob = profile("bob");
    // Only Alice is known to the directory.
    let bench = common::bench_with(&[alice.clone()], alice.clone(), bob.clone());

    let conversation = bench
        .service
        .create_or_get_conversation(alice.id, open_with(bob.id))
        .await
        .unwrap();
    let message = bench
        .service
        .send_message(send(conversation.id, alice.id, "hello"))
        .await
        .unwrap();

    assert_eq!(message.sender.display_name, "alice");
    assert_eq!(message.receiver.display_name, "unknown");
    assert_eq!(message.receiver.id, bob.id);
}

#[tokio::test]
async fn threading_pointer_requires_an_existing_message() {
    let bench = bench();
    let (alice, bob) = (bench.alice.id, bench.bob.id);
    let conversation = bench
        .service
        .create_or_get_conversation(alice, open_with(bob))
        .await
        .unwrap();
    let root = bench
        .service
        .send_message(send(conversation.id, alice, "root"))
        .await
        .unwrap();

    let mut reply = send(conversation.id, bob, "reply");
    reply.replied_to = Some(root.id);
    let reply = bench.service.send_message(reply).await.unwrap();
    assert_eq!(reply.replied_to, Some(root.id));

    let mut dangling = send(conversation.id, bob, "reply to nothing");
    dangling.replied_to = Some(Uuid::new_v4());
    let err = bench.service.send_message(dangling).await.unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}
