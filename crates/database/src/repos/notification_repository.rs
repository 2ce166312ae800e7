//! Notification repository for database operations.

use sqlx::SqlitePool;
use tracing::debug;

use crate::entities::notification::NOTIFICATION_SELECT;
use crate::entities::Notification;
use crate::types::{DatabaseResult, Page, Pagination};

/// Repository for notification database operations
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Notifications for a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        pagination: Pagination,
    ) -> DatabaseResult<Page<Notification>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND (? = FALSE OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, Notification>(&format!(
            "{NOTIFICATION_SELECT} WHERE n.user_id = ? AND (? = FALSE OR n.is_read = FALSE)
             ORDER BY n.created_at DESC, n.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page { items, total })
    }

    pub async fn find_for_user(
        &self,
        user_id: i64,
        notification_id: i64,
    ) -> DatabaseResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "{NOTIFICATION_SELECT} WHERE n.id = ? AND n.user_id = ?"
        ))
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    pub async fn unread_count(&self, user_id: i64) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Mark one of the user's notifications read. `None` when the
    /// notification does not exist or belongs to someone else.
    pub async fn mark_read(
        &self,
        user_id: i64,
        notification_id: i64,
    ) -> DatabaseResult<Option<Notification>> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND user_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_for_user(user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: i64) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        debug!(user_id, updated = result.rows_affected(), "marked notifications read");
        Ok(result.rows_affected())
    }
}
