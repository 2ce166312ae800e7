//! Lifecycle hooks run by the repositories inside the transaction of the
//! write that triggers them.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::entities::UserCleanup;
use crate::types::{current_timestamp, DatabaseError, DatabaseResult};

/// After a message is inserted: notify every other participant of its
/// conversation. Returns the number of notifications created.
pub async fn on_message_created(
    conn: &mut SqliteConnection,
    message_id: i64,
    conversation_id: i64,
    sender_id: i64,
) -> DatabaseResult<u64> {
    let now = current_timestamp();

    let result = sqlx::query(
        "INSERT INTO notifications (user_id, message_id, is_read, created_at)
         SELECT user_id, ?, FALSE, ? FROM conversation_participants
         WHERE conversation_id = ? AND user_id <> ?",
    )
    .bind(message_id)
    .bind(&now)
    .bind(conversation_id)
    .bind(sender_id)
    .execute(&mut *conn)
    .await?;

    debug!(
        message_id,
        notifications = result.rows_affected(),
        "notified conversation participants"
    );
    Ok(result.rows_affected())
}

/// Before a message's content is replaced: record the previous content when
/// it actually changes. Returns whether the content differs.
pub async fn on_message_pre_save(
    conn: &mut SqliteConnection,
    message_id: i64,
    new_content: &str,
    editor_id: i64,
) -> DatabaseResult<bool> {
    let current: Option<String> = sqlx::query_scalar("SELECT content FROM messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(current) = current else {
        return Err(DatabaseError::NotFound(format!("message {message_id}")));
    };

    if current == new_content {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO message_history (message_id, old_content, edited_by, edited_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(message_id)
    .bind(&current)
    .bind(editor_id)
    .bind(current_timestamp())
    .execute(&mut *conn)
    .await?;

    debug!(message_id, editor_id, "recorded message history");
    Ok(true)
}

/// Before a user row is removed: delete everything the user authored or
/// received. Replies to the user's messages go with them through the
/// `parent_message_id` cascade.
pub async fn on_user_pre_delete(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> DatabaseResult<UserCleanup> {
    let notifications = sqlx::query("DELETE FROM notifications WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let history = sqlx::query("DELETE FROM message_history WHERE edited_by = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let messages = sqlx::query("DELETE FROM messages WHERE sender_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let cleanup = UserCleanup {
        messages,
        notifications,
        history,
    };

    info!(user_id, ?cleanup, "cleaned up data for deleted user");
    Ok(cleanup)
}
