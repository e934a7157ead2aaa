//! Status monotonicity and idempotent reads
//!
//! Uses proptest to generate random sequences of delivery and read
//! transitions and checks that status never moves backwards.

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use peerchat::shared::message::{Message, MessageKind, MessageStatus, NewMessage};

#[derive(Debug, Clone)]
enum Transition {
    Deliver,
    Read(usize),
}

fn transition() -> impl Strategy<Value = Transition> {
    prop_oneof![Just(Transition::Deliver), (0usize..3).prop_map(Transition::Read)]
}

fn message(status: MessageStatus) -> Message {
    Message::from_new(
        NewMessage {
            chat_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".to_string(),
            kind: MessageKind::Text,
            status,
            delivered_at: None,
        },
        Uuid::new_v4(),
        Utc::now(),
    )
}

proptest! {
    #[test]
    fn test_status_never_decreases(
        initially_delivered in any::<bool>(),
        steps in prop::collection::vec(transition(), 0..20),
    ) {
        let readers = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut message = message(MessageStatus::initial(initially_delivered));
        let mut previous = message.status;

        for step in steps {
            match step {
                Transition::Deliver => message.mark_delivered(Utc::now()),
                Transition::Read(i) => message.mark_read_by(readers[i], Utc::now()),
            };
            prop_assert!(message.status >= previous);
            previous = message.status;
        }
    }

    #[test]
    fn test_read_receipts_are_unique(reads in prop::collection::vec(0usize..3, 1..10)) {
        let readers = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut once = message(MessageStatus::Delivered);
        let mut repeated = once.clone();

        let mut distinct = reads.clone();
        distinct.sort_unstable();
        distinct.dedup();
        for &i in &distinct {
            once.mark_read_by(readers[i], Utc::now());
        }
        for &i in &reads {
            repeated.mark_read_by(readers[i], Utc::now());
        }

        prop_assert_eq!(once.status, MessageStatus::Read);
        prop_assert_eq!(repeated.status, MessageStatus::Read);
        prop_assert_eq!(repeated.read_by.len(), distinct.len());
        let mut once_readers: Vec<Uuid> = once.read_by.iter().map(|r| r.user_id).collect();
        let mut repeated_readers: Vec<Uuid> = repeated.read_by.iter().map(|r| r.user_id).collect();
        once_readers.sort();
        repeated_readers.sort();
        prop_assert_eq!(once_readers, repeated_readers);
    }
}

#[cfg(feature = "ssr")]
mod store {
    use super::*;
    use peerchat::backend::store::{MemoryStore, Store};
    use peerchat::shared::conversation::Conversation;
    use peerchat::shared::user::User;

    #[derive(Debug, Clone)]
    enum StoreStep {
        Send { from_first: bool, recipient_online: bool },
        Backfill { first: bool },
        Read { first: bool },
    }

    fn store_step() -> impl Strategy<Value = StoreStep> {
        prop_oneof![
            (any::<bool>(), any::<bool>())
                .prop_map(|(from_first, recipient_online)| StoreStep::Send { from_first, recipient_online }),
            any::<bool>().prop_map(|first| StoreStep::Backfill { first }),
            any::<bool>().prop_map(|first| StoreStep::Read { first }),
        ]
    }

    proptest! {
        #[test]
        fn test_store_status_never_decreases(steps in prop::collection::vec(store_step(), 1..25)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let store = MemoryStore::new();
                let a = store.insert_user(User::new("a", None)).await.unwrap();
                let b = store.insert_user(User::new("b", None)).await.unwrap();
                let chat = store.insert_conversation(Conversation::new_direct(a.id, b.id)).await.unwrap();
                let mut seen: std::collections::HashMap<Uuid, MessageStatus> = Default::default();

                for step in steps {
                    match step {
                        StoreStep::Send { from_first, recipient_online } => {
                            let sender = if from_first { a.id } else { b.id };
                            store
                                .insert_message(NewMessage {
                                    chat_id: chat.id,
                                    sender_id: sender,
                                    content: "x".to_string(),
                                    kind: MessageKind::Text,
                                    status: MessageStatus::initial(recipient_online),
                                    delivered_at: recipient_online.then(Utc::now),
                                })
                                .await
                                .unwrap();
                        }
                        StoreStep::Backfill { first } => {
                            store.deliver_pending(if first { a.id } else { b.id }, Utc::now()).await.unwrap();
                        }
                        StoreStep::Read { first } => {
                            store.mark_read(chat.id, if first { a.id } else { b.id }, Utc::now()).await.unwrap();
                        }
                    }

                    for message in store.messages_for_conversation(chat.id).await.unwrap() {
                        if let Some(previous) = seen.insert(message.id, message.status) {
                            assert!(message.status >= previous, "{} went from {} to {}", message.id, previous, message.status);
                        }
                    }
                }
            });
        }
    }
}
