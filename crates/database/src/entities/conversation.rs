//! Conversation entity definitions

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Conversation {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub title: Option<String>,
    #[serde(skip_serializing)]
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Conversation row with activity aggregates, as listed for a participant.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ConversationOverview {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub title: Option<String>,
    #[serde(skip_serializing)]
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub last_message_at: Option<String>,
}

impl From<ConversationOverview> for Conversation {
    fn from(overview: ConversationOverview) -> Self {
        Self {
            id: overview.id,
            public_id: overview.public_id,
            title: overview.title,
            created_by: overview.created_by,
            created_at: overview.created_at,
            updated_at: overview.updated_at,
        }
    }
}
