//! Message, edit history and thread definitions

use serde::Serialize;
use sqlx::FromRow;

/// Columns selected for every [`Message`] read, joined with the public
/// identifiers of the conversation, sender and parent message.
pub(crate) const MESSAGE_SELECT: &str = "SELECT m.id, m.public_id, m.conversation_id, \
     c.public_id AS conversation_public_id, m.sender_id, u.public_id AS sender_public_id, \
     u.email AS sender_email, m.parent_message_id, p.public_id AS parent_public_id, \
     m.content, m.is_edited, m.edited_at, m.edited_by, m.created_at, m.updated_at \
     FROM messages m \
     JOIN conversations c ON c.id = m.conversation_id \
     JOIN users u ON u.id = m.sender_id \
     LEFT JOIN messages p ON p.id = m.parent_message_id";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Message {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    #[serde(skip_serializing)]
    pub conversation_id: i64,
    pub conversation_public_id: String,
    #[serde(skip_serializing)]
    pub sender_id: i64,
    pub sender_public_id: String,
    pub sender_email: String,
    #[serde(skip_serializing)]
    pub parent_message_id: Option<i64>,
    pub parent_public_id: Option<String>,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    #[serde(skip_serializing)]
    pub edited_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MessageHistory {
    pub id: i64,
    #[serde(skip_serializing)]
    pub message_id: i64,
    pub old_content: String,
    #[serde(skip_serializing)]
    pub edited_by: Option<i64>,
    pub editor_email: Option<String>,
    pub edited_at: String,
}

/// A message and its replies, recursively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageThread {
    pub message: Message,
    pub replies: Vec<MessageThread>,
}

impl MessageThread {
    /// Number of messages in the thread including the root.
    pub fn message_count(&self) -> usize {
        1 + self
            .replies
            .iter()
            .map(MessageThread::message_count)
            .sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl MessageOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            MessageOrder::OldestFirst => " ORDER BY m.created_at ASC, m.id ASC",
            MessageOrder::NewestFirst => " ORDER BY m.created_at DESC, m.id DESC",
        }
    }
}
