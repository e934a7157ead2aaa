//! App state over a `FlakyStore` with seeding helpers

use std::sync::Arc;
use uuid::Uuid;

use peerchat::backend::server::state::AppState;
use peerchat::backend::store::Store;
use peerchat::shared::config::ServerConfig;
use peerchat::shared::conversation::{Conversation, ConversationKind};
use peerchat::shared::user::User;

use super::{FlakyStore, TestClient};

pub struct Harness {
    pub state: AppState,
    pub store: Arc<FlakyStore>,
}

impl Harness {
    pub fn new() -> Self {
        let store = FlakyStore::new();
        let state = AppState::new(store.clone(), ServerConfig::default());
        Self { state, store }
    }

    pub async fn user(&self, name: &str) -> User {
        self.store.insert_user(User::new(name, None)).await.unwrap()
    }

    pub async fn direct(&self, a: &User, b: &User) -> Conversation {
        self.store
            .insert_conversation(Conversation::new_direct(a.id, b.id))
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str, members: &[&User]) -> Conversation {
        let admin_id = members[0].id;
        let kind = ConversationKind::Group {
            name: name.to_string(),
            admin_id,
        };
        self.store
            .insert_conversation(Conversation::new(kind, members.iter().map(|u| u.id).collect()))
            .await
            .unwrap()
    }

    pub fn client(&self) -> TestClient {
        TestClient::connect(&self.state)
    }

    pub async fn unread(&self, chat_id: Uuid, user_id: Uuid) -> u32 {
        self.store
            .get_conversation(chat_id)
            .await
            .unwrap()
            .unwrap()
            .unread_for(user_id)
    }
}
