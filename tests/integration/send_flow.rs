//! Send path: echo, provisional broadcast, persistence and confirmation

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::time::Duration;

use peerchat::backend::error::CoreError;
use peerchat::backend::store::Store;
use peerchat::shared::event::{AckStatus, ReceivedMessage, ServerEvent};
use peerchat::shared::message::{MessageStatus, ProvisionalStatus};

use crate::common::Harness;
use crate::{assert_ok, assert_single_event};

#[tokio::test]
async fn test_offline_recipient_gets_sent_status_and_unread() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let mut sender = h.client();

    let handle = sender.send(1, chat.id, alice.id, "hi").await.unwrap();

    let echo = sender.drain();
    assert_matches!(echo.first().map(|e| e.as_ref()), Some(ServerEvent::Ack(ack)) => {
        assert_eq!(ack.id, 1);
        assert_eq!(ack.status, AckStatus::Success);
        let provisional = ack.message.as_ref().unwrap();
        assert_eq!(provisional.status, ProvisionalStatus::Sending);
        assert_eq!(ack.temp_id.as_deref(), Some(provisional.temp_id.as_str()));
    });

    let durable = assert_ok!(handle.await.unwrap());
    assert_eq!(durable.message.status, MessageStatus::Sent);
    assert_eq!(durable.message.delivered_at, None);
    assert_eq!(h.unread(chat.id, bob.id).await, 1);
    assert_eq!(h.unread(chat.id, alice.id).await, 0);
}

#[tokio::test]
async fn test_online_recipient_gets_delivered_status() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    let recipient = h.client();
    recipient.online(bob.id).await;

    let durable = sender.send(1, chat.id, alice.id, "hi").await.unwrap().await.unwrap().unwrap();
    assert_eq!(durable.message.status, MessageStatus::Delivered);
    assert!(durable.message.delivered_at.is_some());

    let stored = h.store.get_message(durable.message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);
}

#[tokio::test]
async fn test_viewing_recipient_unread_unchanged() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    let viewer = h.client();
    viewer.online(bob.id).await;
    viewer.join(chat.id).await;
    viewer.view(chat.id, bob.id).await;

    sender.send(1, chat.id, alice.id, "look").await.unwrap().await.unwrap().unwrap();
    assert_eq!(h.unread(chat.id, bob.id).await, 0);

    viewer
        .emit(None, peerchat::shared::event::ClientEvent::LeftChatView)
        .await;
    sender.send(2, chat.id, alice.id, "still there?").await.unwrap().await.unwrap().unwrap();
    assert_eq!(h.unread(chat.id, bob.id).await, 1);
}

#[tokio::test]
async fn test_viewing_without_joining_room_still_counts_unread() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    let viewer = h.client();
    viewer.view(chat.id, bob.id).await;

    sender.send(1, chat.id, alice.id, "hi").await.unwrap().await.unwrap().unwrap();
    assert_eq!(h.unread(chat.id, bob.id).await, 1);
}

#[tokio::test]
async fn test_ack_observed_before_message_exists() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    h.store.delay_inserts(Duration::from_millis(200));
    let mut sender = h.client();

    let handle = sender.send(9, chat.id, alice.id, "slow disk").await.unwrap();

    assert_matches!(sender.drain().first().map(|e| e.as_ref()), Some(ServerEvent::Ack(ack)) if ack.id == 9);
    assert!(h.store.messages_for_conversation(chat.id).await.unwrap().is_empty());

    handle.await.unwrap().unwrap();
    assert_eq!(h.store.messages_for_conversation(chat.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_each_temp_id_is_broadcast_then_confirmed_once() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let mut sender = h.client();
    let mut recipient = h.client();
    sender.join(chat.id).await;
    recipient.join(chat.id).await;

    let mut temp_ids = Vec::new();
    for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
        let handle = sender.send(i as u64, chat.id, alice.id, text).await.unwrap();
        let durable = handle.await.unwrap().unwrap();
        assert_eq!(durable.message.content, text);
    }
    for event in sender.drain() {
        if let ServerEvent::Ack(ack) = event.as_ref() {
            temp_ids.push(ack.temp_id.clone().unwrap());
        }
    }
    assert_eq!(temp_ids.len(), 3);

    let events = recipient.drain();
    for temp_id in &temp_ids {
        let provisional_at = events.iter().position(|e| {
            matches!(e.as_ref(), ServerEvent::MessageReceived(ReceivedMessage::Provisional(p)) if &p.temp_id == temp_id)
        });
        let confirmed_at = events
            .iter()
            .position(|e| matches!(e.as_ref(), ServerEvent::MessageConfirmed(c) if &c.temp_id == temp_id));
        assert!(provisional_at.unwrap() < confirmed_at.unwrap());

        assert_single_event!(
            events.iter().map(|e| e.as_ref()).collect::<Vec<_>>(),
            ServerEvent::MessageReceived(ReceivedMessage::Provisional(p)) if &p.temp_id == temp_id
        );
        assert_single_event!(
            events.iter().map(|e| e.as_ref()).collect::<Vec<_>>(),
            ServerEvent::MessageConfirmed(c) if &c.temp_id == temp_id
        );
    }

    assert_matches!(
        events.iter().find_map(|e| match e.as_ref() {
            ServerEvent::MessageReceived(ReceivedMessage::Provisional(p)) => Some(p.clone()),
            _ => None,
        }),
        Some(p) if p.is_optimistic && p.status == ProvisionalStatus::Delivered
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_do_not_lose_unread_increments() {
    const SENDERS: usize = 12;

    let h = Harness::new();
    let reader = h.user("reader").await;
    let mut senders = Vec::with_capacity(SENDERS);
    for i in 0..SENDERS {
        senders.push(h.user(&format!("sender-{i}")).await);
    }
    let mut members: Vec<_> = senders.iter().collect();
    members.push(&reader);
    let group = h.group("busy", &members).await;

    let mut tasks = Vec::new();
    for sender in &senders {
        let client = h.client();
        let (chat_id, sender_id) = (group.id, sender.id);
        tasks.push(tokio::spawn(async move {
            let handle = client.send(1, chat_id, sender_id, "ping").await.unwrap();
            handle.await.unwrap()
        }));
    }
    for task in tasks {
        assert_ok!(task.await.unwrap());
    }

    assert_eq!(h.unread(group.id, reader.id).await, SENDERS as u32);
    assert_eq!(h.store.messages_for_conversation(group.id).await.unwrap().len(), SENDERS);
}

#[tokio::test]
async fn test_persistence_failure_reports_message_error() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let mut sender = h.client();
    let mut recipient = h.client();
    recipient.join(chat.id).await;
    h.store.fail_inserts(true);

    let handle = sender.send(3, chat.id, alice.id, "doomed").await.unwrap();
    assert_matches!(handle.await.unwrap(), Err(CoreError::PersistenceFailure(_)));

    let events = sender.drain();
    let temp_id = match events[0].as_ref() {
        ServerEvent::Ack(ack) => ack.temp_id.clone().unwrap(),
        other => panic!("expected ack first, got {other:?}"),
    };
    assert_matches!(events[1].as_ref(), ServerEvent::MessageError(failed) if failed.temp_id == temp_id);

    let seen = recipient.drain();
    assert_matches!(seen[0].as_ref(), ServerEvent::MessageReceived(ReceivedMessage::Provisional(_)));
    assert_matches!(seen[1].as_ref(), ServerEvent::MessageError(failed) if failed.temp_id == temp_id);

    assert_eq!(h.unread(chat.id, bob.id).await, 0);
    assert!(h.store.messages_for_conversation(chat.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_presence_failure_degrades_to_sent() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    let recipient = h.client();
    recipient.online(bob.id).await;
    h.store.fail_presence(true);

    let durable = sender.send(1, chat.id, alice.id, "hi").await.unwrap().await.unwrap().unwrap();
    assert_eq!(durable.message.status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_unknown_sender_leaves_no_trace() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let mut sender = h.client();
    let mut recipient = h.client();
    recipient.join(chat.id).await;

    let handle = sender.send(5, chat.id, uuid::Uuid::new_v4(), "who am i").await;
    assert!(handle.is_none());
    assert_matches!(sender.drain()[0].as_ref(), ServerEvent::Ack(ack) if ack.status == AckStatus::Error);
    assert!(recipient.drain().is_empty());
    assert!(h.store.messages_for_conversation(chat.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confirmation_updates_sidebar_of_absent_participant() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let sender = h.client();
    let mut sidebar = h.client();
    sidebar.online(bob.id).await;
    sidebar.drain();

    sender.send(1, chat.id, alice.id, "see this?").await.unwrap().await.unwrap().unwrap();

    let events = sidebar.drain();
    assert_matches!(events.last().map(|e| e.as_ref()), Some(ServerEvent::ChatUpdated(summary)) => {
        assert_eq!(summary.id, chat.id);
        assert_eq!(summary.preview.as_deref(), Some("see this?"));
        assert_eq!(summary.unread_count.get(&bob.id), Some(&1));
    });
}
