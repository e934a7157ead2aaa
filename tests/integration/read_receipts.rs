//! mark-messages-read and mark-chat-read

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use peerchat::backend::store::Store;
use peerchat::shared::event::{AckStatus, ChatUser, ClientEvent, ServerEvent};
use peerchat::shared::message::MessageStatus;

use crate::common::Harness;

#[tokio::test]
async fn test_mark_chat_read_resets_counter_for_caller_only() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;

    let sender = h.client();
    for i in 0..5 {
        sender.send(i, chat.id, bob.id, "knock").await.unwrap().await.unwrap().unwrap();
    }
    assert_eq!(h.unread(chat.id, alice.id).await, 5);

    let mut reader = h.client();
    reader.online(alice.id).await;
    reader.join(chat.id).await;
    let mut other = h.client();
    other.online(bob.id).await;
    other.join(chat.id).await;
    reader.drain();
    other.drain();

    reader
        .emit(
            Some(42),
            ClientEvent::MarkChatRead(ChatUser {
                chat_id: chat.id,
                user_id: alice.id,
            }),
        )
        .await;

    assert_eq!(h.unread(chat.id, alice.id).await, 0);
    let events = reader.drain();
    assert_matches!(events[0].as_ref(), ServerEvent::ChatMarkedRead(read) => {
        assert_eq!(read.chat_id, chat.id);
        assert_eq!(read.user_id, alice.id);
    });
    assert_matches!(events[1].as_ref(), ServerEvent::Ack(ack) if ack.id == 42 && ack.status == AckStatus::Success);
    assert!(other.drain().is_empty());

    let messages = h.store.messages_for_conversation(chat.id).await.unwrap();
    assert!(messages.iter().all(|m| m.status != MessageStatus::Read));
}

#[tokio::test]
async fn test_mark_messages_read_is_idempotent() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    sender.send(1, chat.id, alice.id, "one").await.unwrap().await.unwrap().unwrap();
    sender.send(2, chat.id, alice.id, "two").await.unwrap().await.unwrap().unwrap();

    let mut room = h.client();
    room.join(chat.id).await;
    room.drain();
    let read = ClientEvent::MarkMessagesRead(ChatUser {
        chat_id: chat.id,
        user_id: bob.id,
    });

    let reader = h.client();
    reader.emit(None, read.clone()).await;
    let once = h.store.messages_for_conversation(chat.id).await.unwrap();
    reader.emit(None, read).await;
    let twice = h.store.messages_for_conversation(chat.id).await.unwrap();

    assert_eq!(once, twice);
    for message in &twice {
        assert_eq!(message.status, MessageStatus::Read);
        assert_eq!(message.read_by.len(), 1);
        assert!(message.is_read_by(bob.id));
    }

    let events = room.drain();
    assert_eq!(events.len(), 1);
    assert_matches!(events[0].as_ref(), ServerEvent::MessagesRead(r) if r.reader_user_id == bob.id);
}

#[tokio::test]
async fn test_own_messages_are_not_marked_read() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    sender.send(1, chat.id, alice.id, "mine").await.unwrap().await.unwrap().unwrap();

    sender
        .emit(
            None,
            ClientEvent::MarkMessagesRead(ChatUser {
                chat_id: chat.id,
                user_id: alice.id,
            }),
        )
        .await;

    let messages = h.store.messages_for_conversation(chat.id).await.unwrap();
    assert_eq!(messages[0].status, MessageStatus::Sent);
    assert!(messages[0].read_by.is_empty());
}

#[tokio::test]
async fn test_read_never_reverts_to_delivered() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    sender.send(1, chat.id, alice.id, "hello").await.unwrap().await.unwrap().unwrap();

    let bob_client = h.client();
    bob_client
        .emit(
            None,
            ClientEvent::MarkMessagesRead(ChatUser {
                chat_id: chat.id,
                user_id: bob.id,
            }),
        )
        .await;
    bob_client.online(bob.id).await;

    let messages = h.store.messages_for_conversation(chat.id).await.unwrap();
    assert_eq!(messages[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn test_every_group_reader_is_recorded() {
    let h = Harness::new();
    let ann = h.user("ann").await;
    let ben = h.user("ben").await;
    let cy = h.user("cy").await;
    let group = h.group("crew", &[&ann, &ben, &cy]).await;
    let sender = h.client();
    sender.send(1, group.id, ann.id, "standup?").await.unwrap().await.unwrap().unwrap();

    let mut room = h.client();
    room.join(group.id).await;
    room.drain();

    for reader in [&ben, &cy] {
        h.client()
            .emit(
                None,
                ClientEvent::MarkMessagesRead(ChatUser {
                    chat_id: group.id,
                    user_id: reader.id,
                }),
            )
            .await;
    }

    let message = &h.store.messages_for_conversation(group.id).await.unwrap()[0];
    assert_eq!(message.status, MessageStatus::Read);
    assert!(message.is_read_by(ben.id));
    assert!(message.is_read_by(cy.id));
    assert_eq!(message.read_by.len(), 2);

    let readers: Vec<_> = room
        .drain()
        .into_iter()
        .filter_map(|event| match event.as_ref() {
            ServerEvent::MessagesRead(read) => Some(read.reader_user_id),
            _ => None,
        })
        .collect();
    assert_eq!(readers, vec![ben.id, cy.id]);
}
