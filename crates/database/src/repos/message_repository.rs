//! Repository for message data access operations.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::entities::message::MESSAGE_SELECT;
use crate::entities::{Message, MessageHistory, MessageOrder, MessageThread, NewMessage};
use crate::filters::MessageFilter;
use crate::signals;
use crate::types::{current_timestamp, DatabaseError, DatabaseResult, Page, Pagination};

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a message and notify the other participants in one transaction.
    pub async fn create(&self, new_message: &NewMessage) -> DatabaseResult<Message> {
        let mut tx = self.pool.begin().await?;

        if let Some(parent_id) = new_message.parent_message_id {
            let parent_conversation: Option<i64> =
                sqlx::query_scalar("SELECT conversation_id FROM messages WHERE id = ?")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match parent_conversation {
                None => return Err(DatabaseError::NotFound(format!("parent message {parent_id}"))),
                Some(conversation_id) if conversation_id != new_message.conversation_id => {
                    return Err(DatabaseError::ValidationError(
                        "parent message belongs to a different conversation".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        let public_id = Uuid::new_v4().to_string();
        let now = current_timestamp();

        let result = sqlx::query(
            "INSERT INTO messages (public_id, conversation_id, sender_id, parent_message_id, content, is_edited, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, FALSE, ?, ?)",
        )
        .bind(&public_id)
        .bind(new_message.conversation_id)
        .bind(new_message.sender_id)
        .bind(new_message.parent_message_id)
        .bind(&new_message.content)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let message_id = result.last_insert_rowid();

        signals::on_message_created(
            &mut tx,
            message_id,
            new_message.conversation_id,
            new_message.sender_id,
        )
        .await?;

        tx.commit().await?;

        info!(
            message_id,
            public_id = %public_id,
            conversation_id = new_message.conversation_id,
            sender_id = new_message.sender_id,
            "created new message"
        );

        self.find_by_id(message_id)
            .await?
            .ok_or_else(|| DatabaseError::InternalError("created message vanished".to_string()))
    }

    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<Message>> {
        let message =
            sqlx::query_as::<_, Message>(&format!("{MESSAGE_SELECT} WHERE m.public_id = ?"))
                .bind(public_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(message)
    }

    pub async fn list(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        pagination: Pagination,
    ) -> DatabaseResult<Page<Message>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages m");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(MESSAGE_SELECT);
        filter.push_where(&mut qb);
        qb.push(order.sql())
            .push(" LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset);

        let items = qb.build_query_as::<Message>().fetch_all(&self.pool).await?;

        Ok(Page { items, total })
    }

    /// Replace a message's content. History is appended and the message is
    /// flagged as edited only when the content differs; the returned flag
    /// reports whether that happened.
    pub async fn update_content(
        &self,
        message_id: i64,
        content: &str,
        editor_id: i64,
    ) -> DatabaseResult<(Message, bool)> {
        let mut tx = self.pool.begin().await?;

        let changed = signals::on_message_pre_save(&mut tx, message_id, content, editor_id).await?;

        if changed {
            let now = current_timestamp();
            sqlx::query(
                "UPDATE messages SET content = ?, is_edited = TRUE, edited_at = ?, edited_by = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(content)
            .bind(&now)
            .bind(editor_id)
            .bind(&now)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if changed {
            info!(message_id, editor_id, "edited message");
        }

        let message = self
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("message {message_id}")))?;
        Ok((message, changed))
    }

    pub async fn delete(&self, message_id: i64) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(message_id, "deleted message");
        }
        Ok(result.rows_affected() > 0)
    }

    /// Edit history, newest first.
    pub async fn history(&self, message_id: i64) -> DatabaseResult<Vec<MessageHistory>> {
        let history = sqlx::query_as::<_, MessageHistory>(
            "SELECT h.id, h.message_id, h.old_content, h.edited_by, u.email AS editor_email, h.edited_at
             FROM message_history h
             LEFT JOIN users u ON u.id = h.edited_by
             WHERE h.message_id = ?
             ORDER BY h.edited_at DESC, h.id DESC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    /// The message and every reply beneath it, replies oldest first.
    pub async fn thread(&self, message_id: i64) -> DatabaseResult<Option<MessageThread>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            "WITH RECURSIVE thread(id) AS (
                 SELECT id FROM messages WHERE id = ?
                 UNION ALL
                 SELECT child.id FROM messages child JOIN thread ON child.parent_message_id = thread.id
             )
             {MESSAGE_SELECT} WHERE m.id IN (SELECT id FROM thread)
             ORDER BY m.created_at ASC, m.id ASC"
        ))
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        let mut root = None;
        let mut children: HashMap<i64, Vec<Message>> = HashMap::new();
        for message in rows {
            match message.parent_message_id {
                Some(parent) if message.id != message_id => {
                    children.entry(parent).or_default().push(message)
                }
                _ => root = Some(message),
            }
        }

        Ok(root.map(|root| assemble_thread(root, &mut children)))
    }

    /// Messages behind the user's unread notifications, newest first.
    pub async fn unread_for_user(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> DatabaseResult<Page<Message>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT message_id) FROM notifications WHERE user_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, Message>(&format!(
            "{MESSAGE_SELECT} WHERE m.id IN (
                 SELECT message_id FROM notifications WHERE user_id = ? AND is_read = FALSE
             )
             ORDER BY m.created_at DESC, m.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page { items, total })
    }
}

fn assemble_thread(message: Message, children: &mut HashMap<i64, Vec<Message>>) -> MessageThread {
    let replies = children
        .remove(&message.id)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| assemble_thread(reply, children))
        .collect();

    MessageThread { message, replies }
}
