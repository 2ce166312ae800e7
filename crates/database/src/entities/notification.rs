//! Notification entity definitions

use serde::Serialize;
use sqlx::FromRow;

pub(crate) const NOTIFICATION_SELECT: &str = "SELECT n.id, n.user_id, n.message_id, \
     m.public_id AS message_public_id, c.public_id AS conversation_public_id, \
     u.email AS sender_email, m.content AS message_content, n.is_read, n.created_at \
     FROM notifications n \
     JOIN messages m ON m.id = n.message_id \
     JOIN conversations c ON c.id = m.conversation_id \
     JOIN users u ON u.id = m.sender_id";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Notification {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub message_id: i64,
    pub message_public_id: String,
    pub conversation_public_id: String,
    pub sender_email: String,
    pub message_content: String,
    pub is_read: bool,
    pub created_at: String,
}
