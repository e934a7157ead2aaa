//! Presence binding, delivery backfill and disconnect handling

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use peerchat::backend::store::Store;
use peerchat::shared::event::ServerEvent;
use peerchat::shared::message::MessageStatus;

use crate::common::Harness;

#[tokio::test]
async fn test_reconnect_backfills_delivery_per_sender() {
    let h = Harness::new();
    let bob = h.user("bob").await;
    let mut senders = Vec::new();
    let mut chats = Vec::new();
    for name in ["ann", "cat", "dan"] {
        let sender = h.user(name).await;
        chats.push(h.direct(&sender, &bob).await);
        senders.push(sender);
    }

    // Bob is offline for all three sends.
    let mut sender_clients = Vec::new();
    for (sender, chat) in senders.iter().zip(&chats) {
        let client = h.client();
        client.online(sender.id).await;
        let durable = client.send(1, chat.id, sender.id, "you there?").await.unwrap().await.unwrap().unwrap();
        assert_eq!(durable.message.status, MessageStatus::Sent);
        sender_clients.push(client);
    }
    for client in &mut sender_clients {
        client.drain();
    }

    let bob_client = h.client();
    bob_client.online(bob.id).await;

    for chat in &chats {
        let messages = h.store.messages_for_conversation(chat.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Delivered);
        assert!(messages[0].delivered_at.is_some());
    }

    for (client, chat) in sender_clients.iter_mut().zip(&chats) {
        let delivered: Vec<_> = client
            .drain()
            .into_iter()
            .filter_map(|event| match event.as_ref() {
                ServerEvent::MessagesDelivered(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].chat_id, chat.id);
        assert_eq!(delivered[0].recipient_user_id, bob.id);
    }
}

#[tokio::test]
async fn test_stale_disconnect_keeps_user_online() {
    let h = Harness::new();
    let bob = h.user("bob").await;
    let watcher_user = h.user("wendy").await;
    let mut watcher = h.client();
    watcher.online(watcher_user.id).await;

    let phone = h.client();
    let laptop = h.client();
    phone.online(bob.id).await;
    laptop.online(bob.id).await;
    watcher.drain();

    assert_eq!(phone.disconnect().await, None);
    assert!(h.store.get_user(bob.id).await.unwrap().unwrap().is_online);
    assert!(watcher.drain().is_empty());

    assert_eq!(laptop.disconnect().await, Some(bob.id));
    let bob_now = h.store.get_user(bob.id).await.unwrap().unwrap();
    assert!(!bob_now.is_online);
    assert_matches!(watcher.drain().first().map(|e| e.as_ref()), Some(ServerEvent::UserStatusChanged(change)) => {
        assert_eq!(change.user_id, bob.id);
        assert!(!change.is_online);
    });
}

#[tokio::test]
async fn test_going_online_is_announced_to_others_only() {
    let h = Harness::new();
    let bob = h.user("bob").await;
    let other_user = h.user("olga").await;
    let mut other = h.client();
    other.online(other_user.id).await;
    other.drain();

    let mut own = h.client();
    own.online(bob.id).await;

    assert_matches!(other.drain().as_slice(), [event] => {
        assert_matches!(event.as_ref(), ServerEvent::UserStatusChanged(change) if change.user_id == bob.id && change.is_online);
    });
    assert!(own
        .drain()
        .iter()
        .all(|e| !matches!(e.as_ref(), ServerEvent::UserStatusChanged(change) if change.user_id == bob.id)));
}

#[tokio::test]
async fn test_disconnect_drops_room_membership() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let chat = h.direct(&alice, &bob).await;
    let client = h.client();
    client.online(bob.id).await;
    client.join(chat.id).await;
    assert_eq!(h.state.router.members(chat.id).len(), 1);

    client.disconnect().await;
    assert!(h.state.router.members(chat.id).is_empty());
}

#[tokio::test]
async fn test_switching_user_on_one_connection_announces_both_offline() {
    let h = Harness::new();
    let ann = h.user("ann").await;
    let ben = h.user("ben").await;
    let mut watcher = h.client();
    watcher.online(h.user("wendy").await.id).await;

    let shared = h.client();
    shared.online(ann.id).await;
    shared.online(ben.id).await;
    assert_eq!(shared.disconnect().await, Some(ben.id));

    for user in [&ann, &ben] {
        assert!(!h.store.get_user(user.id).await.unwrap().unwrap().is_online);
    }
    let offline: Vec<_> = watcher
        .drain()
        .into_iter()
        .filter_map(|event| match event.as_ref() {
            ServerEvent::UserStatusChanged(change) if !change.is_online => Some(change.user_id),
            _ => None,
        })
        .collect();
    assert_eq!(offline, vec![ann.id, ben.id]);
}
