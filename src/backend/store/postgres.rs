//! Postgres Store
//!
//! Every shared-field mutation is a single conditional SQL statement, so
//! concurrent sends never lose an unread increment or overwrite a newer
//! preview, and message status only moves forward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{group_delivered, DeliveredBatch, PresenceBinding, Store, StoreError, StoreResult};
use crate::shared::conversation::{Conversation, ConversationKind, LastMessage};
use crate::shared::error::SharedError;
use crate::shared::message::{Message, MessageKind, NewMessage, ReadReceipt};
use crate::shared::user::User;

const USER_COLUMNS: &str = "id, name, picture_url, is_online, last_seen, socket_id";

const CONVERSATION_COLUMNS: &str = "id, kind, name, admin_id, last_message_content, last_message_sender_id, \
     last_message_type, last_message_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, kind, status, delivered_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migrations failed: {e}")))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attach participants and unread counters to conversation rows.
    async fn hydrate(&self, rows: Vec<PgRow>) -> StoreResult<Vec<Conversation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut conversations = rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();

        let participants = sqlx::query(
            r#"
            SELECT conversation_id, user_id, unread_count
            FROM conversation_participants
            WHERE conversation_id = ANY($1)
            ORDER BY position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        for row in participants {
            let chat_id: Uuid = row.get("conversation_id");
            let user_id: Uuid = row.get("user_id");
            let unread: i32 = row.get("unread_count");
            if let Some(conversation) = conversations.iter_mut().find(|c| c.id == chat_id) {
                conversation.participants.push(user_id);
                conversation.unread_count.insert(user_id, unread.max(0) as u32);
            }
        }
        Ok(conversations)
    }

    async fn read_receipts(&self, message_ids: &[Uuid]) -> StoreResult<BTreeMap<Uuid, Vec<ReadReceipt>>> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, user_id, read_at
            FROM message_reads
            WHERE message_id = ANY($1)
            ORDER BY read_at
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut receipts: BTreeMap<Uuid, Vec<ReadReceipt>> = BTreeMap::new();
        for row in rows {
            receipts.entry(row.get("message_id")).or_default().push(ReadReceipt {
                user_id: row.get("user_id"),
                read_at: row.get("read_at"),
            });
        }
        Ok(receipts)
    }

    async fn with_receipts(&self, mut messages: Vec<Message>) -> StoreResult<Vec<Message>> {
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let mut receipts = self.read_receipts(&ids).await?;
        for message in &mut messages {
            message.read_by = receipts.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }
}

fn decode_error(err: SharedError) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(Box::new(err)))
}

/// A foreign key violation on insert means the conversation row is gone.
fn missing_conversation(err: sqlx::Error, chat_id: Uuid) -> StoreError {
    let dangling = matches!(&err, sqlx::Error::Database(db) if db.is_foreign_key_violation());
    if dangling {
        StoreError::not_found("conversation", chat_id)
    } else {
        StoreError::from(err)
    }
}

fn parse_column<T: FromStr<Err = SharedError>>(row: &PgRow, column: &str) -> StoreResult<T> {
    row.get::<String, _>(column).parse().map_err(decode_error)
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        picture_url: row.get("picture_url"),
        is_online: row.get("is_online"),
        last_seen: row.get("last_seen"),
        socket_id: row.get("socket_id"),
    }
}

fn message_from_row(row: &PgRow) -> StoreResult<Message> {
    Ok(Message {
        id: row.get("id"),
        chat_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        kind: parse_column(row, "kind")?,
        status: parse_column(row, "status")?,
        delivered_at: row.get("delivered_at"),
        read_by: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn conversation_from_row(row: &PgRow) -> StoreResult<Conversation> {
    let id: Uuid = row.get("id");
    let kind = match row.get::<String, _>("kind").as_str() {
        "direct" => ConversationKind::Direct,
        "group" => {
            let name: Option<String> = row.get("name");
            let admin_id: Option<Uuid> = row.get("admin_id");
            match (name, admin_id) {
                (Some(name), Some(admin_id)) => ConversationKind::Group { name, admin_id },
                _ => return Err(decode_error(SharedError::validation("kind", format!("group {id} lacks name or admin")))),
            }
        }
        other => return Err(decode_error(SharedError::validation("kind", format!("unknown conversation kind '{other}'")))),
    };

    let last_message = match row.get::<Option<DateTime<Utc>>, _>("last_message_at") {
        Some(created_at) => Some(LastMessage {
            content: row.get::<Option<String>, _>("last_message_content").unwrap_or_default(),
            sender_id: row.get::<Option<Uuid>, _>("last_message_sender_id").unwrap_or_default(),
            kind: row
                .get::<Option<String>, _>("last_message_type")
                .map(|kind| kind.parse::<MessageKind>())
                .transpose()
                .map_err(decode_error)?
                .unwrap_or_default(),
            created_at,
        }),
        None => None,
    };

    Ok(Conversation {
        id,
        kind,
        participants: Vec::new(),
        last_message,
        unread_count: BTreeMap::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, picture_url, is_online, last_seen, socket_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.picture_url)
        .bind(user.is_online)
        .bind(user.last_seen)
        .bind(user.socket_id)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn bind_presence(
        &self,
        user_id: Uuid,
        connection: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PresenceBinding>> {
        // One statement: release whoever else holds this connection, then bind.
        let rows = sqlx::query(&format!(
            r#"
            WITH displaced AS (
                UPDATE users SET is_online = FALSE, last_seen = $3, socket_id = NULL
                WHERE socket_id = $2 AND id <> $1 AND EXISTS (SELECT 1 FROM users WHERE id = $1)
                RETURNING {USER_COLUMNS}, FALSE AS bound
            ),
            bound AS (
                UPDATE users SET is_online = TRUE, last_seen = $3, socket_id = $2
                WHERE id = $1
                RETURNING {USER_COLUMNS}, TRUE AS bound
            )
            SELECT * FROM bound
            UNION ALL
            SELECT * FROM displaced
            "#
        ))
        .bind(user_id)
        .bind(connection)
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        let (bound, displaced): (Vec<&PgRow>, Vec<&PgRow>) = rows.iter().partition(|row| row.get::<bool, _>("bound"));
        Ok(bound.first().map(|row| PresenceBinding {
            user: user_from_row(row),
            displaced: displaced.into_iter().map(user_from_row).collect(),
        }))
    }

    async fn release_presence(&self, connection: Uuid, at: DateTime<Utc>) -> StoreResult<Option<User>> {
        // The socket_id match makes this a no-op for a handle that was rebound.
        let row = sqlx::query(&format!(
            "UPDATE users SET is_online = FALSE, last_seen = $2, socket_id = NULL WHERE socket_id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(connection)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn any_online(&self, user_ids: &[Uuid]) -> StoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE id = ANY($1) AND is_online) AS online")
            .bind(user_ids)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("online"))
    }

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let (kind, name, admin_id) = match &conversation.kind {
            ConversationKind::Direct => ("direct", None, None),
            ConversationKind::Group { name, admin_id } => ("group", Some(name.as_str()), Some(*admin_id)),
        };
        let last = conversation.last_message.as_ref();
        let counts: Vec<i32> = conversation
            .participants
            .iter()
            .map(|id| conversation.unread_for(*id).min(i32::MAX as u32) as i32)
            .collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, name, admin_id, last_message_content, last_message_sender_id,
                                       last_message_type, last_message_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(conversation.id)
        .bind(kind)
        .bind(name)
        .bind(admin_id)
        .bind(last.map(|m| m.content.as_str()))
        .bind(last.map(|m| m.sender_id))
        .bind(last.map(|m| m.kind.as_str()))
        .bind(last.map(|m| m.created_at))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
            SELECT $1, t.user_id, t.unread_count
            FROM UNNEST($2::uuid[], $3::int4[]) WITH ORDINALITY AS t(user_id, unread_count, ord)
            ORDER BY t.ord
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.participants)
        .bind(&counts)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn get_conversation(&self, chat_id: Uuid) -> StoreResult<Option<Conversation>> {
        let rows = sqlx::query(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"))
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.hydrate(rows).await?.pop())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             WHERE EXISTS (SELECT 1 FROM conversation_participants p WHERE p.conversation_id = c.id AND p.user_id = $1)"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn add_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
            VALUES ($1, $2, 0)
            ON CONFLICT (conversation_id, user_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| missing_conversation(e, chat_id))?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let row = sqlx::query(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, content, kind, status, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.status.as_str())
        .bind(message.delivered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_conversation(e, message.chat_id))?;
        message_from_row(&row)
    }

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.with_receipts(vec![message_from_row(&row)?]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn messages_for_conversation(&self, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY created_at, id"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        let messages = rows.iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        self.with_receipts(messages).await
    }

    async fn increment_unread(&self, chat_id: Uuid, recipients: &[Uuid]) -> StoreResult<()> {
        // Rows only exist for current participants, so removed users are skipped.
        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = unread_count + 1
            WHERE conversation_id = $1 AND user_id = ANY($2)
            "#,
        )
        .bind(chat_id)
        .bind(recipients)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE conversation_participants SET unread_count = 0 WHERE conversation_id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_message_if_newer(&self, chat_id: Uuid, snapshot: &LastMessage) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_content = $2,
                last_message_sender_id = $3,
                last_message_type = $4,
                last_message_at = $5,
                updated_at = GREATEST(updated_at, $5)
            WHERE id = $1
              AND (last_message_at IS NULL
                   OR last_message_at < $5
                   OR (last_message_at = $5
                       AND (last_message_content, last_message_sender_id, last_message_type)
                           IS DISTINCT FROM ($2, $3, $4)))
            "#,
        )
        .bind(chat_id)
        .bind(&snapshot.content)
        .bind(snapshot.sender_id)
        .bind(snapshot.kind.as_str())
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn deliver_pending(&self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<DeliveredBatch>> {
        let rows = sqlx::query(
            r#"
            UPDATE messages m
            SET status = 'delivered', delivered_at = $2, updated_at = $2
            FROM conversation_participants p
            WHERE p.user_id = $1
              AND m.conversation_id = p.conversation_id
              AND m.sender_id <> $1
              AND m.status = 'sent'
            RETURNING m.conversation_id, m.sender_id
            "#,
        )
        .bind(recipient)
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        Ok(group_delivered(
            rows.iter().map(|row| (row.get("conversation_id"), row.get("sender_id"))),
        ))
    }

    async fn mark_read(&self, chat_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            WITH updated AS (
                UPDATE messages
                SET status = 'read', updated_at = $3
                WHERE conversation_id = $1
                  AND sender_id <> $2
                  AND status IN ('sent', 'delivered', 'read')
                  AND NOT EXISTS (
                      SELECT 1 FROM message_reads r WHERE r.message_id = messages.id AND r.user_id = $2
                  )
                RETURNING id
            )
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT id, $2, $3 FROM updated
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(reader)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
