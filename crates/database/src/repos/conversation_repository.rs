//! Repository for conversations and their participants.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::entities::{Conversation, ConversationOverview, User};
use crate::filters::like_pattern;
use crate::types::{current_timestamp, DatabaseError, DatabaseResult, Page, Pagination};

const CONVERSATION_COLUMNS: &str = "id, public_id, title, created_by, created_at, updated_at";

#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a conversation with the creator and the given users as
    /// participants. Duplicate ids are ignored.
    pub async fn create(
        &self,
        creator_id: i64,
        title: Option<&str>,
        participant_ids: &[i64],
    ) -> DatabaseResult<Conversation> {
        let public_id = Uuid::new_v4().to_string();
        let now = current_timestamp();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO conversations (public_id, title, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(title)
        .bind(creator_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let conversation_id = result.last_insert_rowid();

        for user_id in std::iter::once(&creator_id).chain(participant_ids) {
            sqlx::query(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at)
                 VALUES (?, ?, ?)",
            )
            .bind(conversation_id)
            .bind(*user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            conversation_id,
            public_id = %public_id,
            creator_id,
            "created new conversation"
        );

        Ok(Conversation {
            id: conversation_id,
            public_id,
            title: title.map(str::to_string),
            created_by: Some(creator_id),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    pub async fn participants(&self, conversation_id: i64) -> DatabaseResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT u.id, u.public_id, u.email, u.first_name, u.last_name, u.phone_number,
                    u.password_hash, u.is_staff, u.is_active, u.created_at, u.updated_at, u.last_login
             FROM conversation_participants cp
             JOIN users u ON u.id = cp.user_id
             WHERE cp.conversation_id = ?
             ORDER BY cp.joined_at ASC, cp.id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn is_participant(&self, conversation_id: i64, user_id: i64) -> DatabaseResult<bool> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exists.is_some())
    }

    /// Conversations the user participates in, most recent activity first.
    /// `search` matches participant emails and first names.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        search: Option<&str>,
        pagination: Pagination,
    ) -> DatabaseResult<Page<ConversationOverview>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM conversations c");
        push_conversation_scope(&mut count, user_id, search);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.id, c.public_id, c.title, c.created_by, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count,
                    (SELECT MAX(m.created_at) FROM messages m WHERE m.conversation_id = c.id) AS last_message_at
             FROM conversations c",
        );
        push_conversation_scope(&mut qb, user_id, search);
        qb.push(" ORDER BY COALESCE(last_message_at, c.created_at) DESC, c.id DESC LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset);

        let items = qb
            .build_query_as::<ConversationOverview>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { items, total })
    }

    /// Apply a title change and add participants in one transaction.
    /// `title` of `None` leaves the title alone; `Some(None)` clears it.
    /// Returns the updated conversation and the number of users that were
    /// not already participants.
    pub async fn update(
        &self,
        conversation_id: i64,
        title: Option<Option<&str>>,
        add_participant_ids: &[i64],
    ) -> DatabaseResult<(Conversation, u64)> {
        let now = current_timestamp();
        let mut tx = self.pool.begin().await?;

        let result = match title {
            Some(title) => {
                sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
                    .bind(title)
                    .bind(&now)
                    .bind(conversation_id)
                    .execute(&mut *tx)
                    .await?
            }
            None => {
                sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
                    .bind(&now)
                    .bind(conversation_id)
                    .execute(&mut *tx)
                    .await?
            }
        };
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("conversation {conversation_id}")));
        }

        let mut added = 0;
        for user_id in add_participant_ids {
            added += sqlx::query(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at)
                 VALUES (?, ?, ?)",
            )
            .bind(conversation_id)
            .bind(*user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
        ))
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if added > 0 {
            info!(conversation_id, added, "added conversation participants");
        }
        Ok((conversation, added))
    }

    pub async fn delete(&self, conversation_id: i64) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(conversation_id, "deleted conversation");
        }
        Ok(result.rows_affected() > 0)
    }
}

fn push_conversation_scope(qb: &mut QueryBuilder<'_, Sqlite>, user_id: i64, search: Option<&str>) {
    qb.push(" WHERE c.id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ")
        .push_bind(user_id)
        .push(")");

    if let Some(term) = search.map(str::trim).filter(|term| !term.is_empty()) {
        let pattern = like_pattern(term);
        qb.push(
            " AND c.id IN (SELECT cp.conversation_id FROM conversation_participants cp \
             JOIN users u ON u.id = cp.user_id WHERE LOWER(u.email) LIKE ",
        )
        .push_bind(pattern.clone())
        .push(" ESCAPE '\\' OR LOWER(u.first_name) LIKE ")
        .push_bind(pattern)
        .push(" ESCAPE '\\')");
    }
}
