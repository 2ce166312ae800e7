use messaging_auth::TokenPair;
use messaging_database::{
    Conversation, ConversationOverview, Message, MessageHistory, MessageThread, Notification, User,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_staff: bool,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        Self {
            user_id: value.public_id,
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            phone_number: value.phone_number,
            is_staff: value.is_staff,
        }
    }
}

/// Staff view of an account.
#[derive(Debug, Serialize)]
pub struct AdminUserResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub is_active: bool,
    pub date_joined: String,
    pub last_login: Option<String>,
}

impl From<User> for AdminUserResponse {
    fn from(value: User) -> Self {
        let is_active = value.is_active;
        let date_joined = value.created_at.clone();
        let last_login = value.last_login.clone();
        Self {
            user: value.into(),
            is_active,
            date_joined,
            last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub sender_id: String,
    pub message_body: String,
    pub sent_at: String,
    pub parent_message_id: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<String>,
}

impl From<Message> for MessageResponse {
    fn from(value: Message) -> Self {
        Self {
            message_id: value.public_id,
            conversation_id: value.conversation_public_id,
            sender: value.sender_email,
            sender_id: value.sender_public_id,
            message_body: value.content,
            sent_at: value.created_at,
            parent_message_id: value.parent_public_id,
            is_edited: value.is_edited,
            edited_at: value.edited_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    #[serde(flatten)]
    pub message: MessageResponse,
    pub replies: Vec<ThreadResponse>,
}

impl From<MessageThread> for ThreadResponse {
    fn from(value: MessageThread) -> Self {
        Self {
            message: value.message.into(),
            replies: value.replies.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history_id: i64,
    pub old_content: String,
    pub edited_by: Option<String>,
    pub edited_at: String,
}

impl From<MessageHistory> for HistoryResponse {
    fn from(value: MessageHistory) -> Self {
        Self {
            history_id: value.id,
            old_content: value.old_content,
            edited_by: value.editor_email,
            edited_at: value.edited_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageHistoryResponse {
    pub message_id: String,
    pub history: Vec<HistoryResponse>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub title: Option<String>,
    pub created_by: Option<String>,
    pub participants: Vec<UserResponse>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

impl ConversationResponse {
    pub fn new(conversation: Conversation, participants: Vec<User>) -> Self {
        let created_by = conversation.created_by.and_then(|creator| {
            participants
                .iter()
                .find(|user| user.id == creator)
                .map(|user| user.email.clone())
        });

        Self {
            conversation_id: conversation.public_id,
            title: conversation.title,
            created_by,
            participants: participants.into_iter().map(Into::into).collect(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            message_count: None,
            last_message_at: None,
            messages: None,
        }
    }

    pub fn from_overview(overview: ConversationOverview, participants: Vec<User>) -> Self {
        let message_count = overview.message_count;
        let last_message_at = overview.last_message_at.clone();
        let mut response = Self::new(overview.into(), participants);
        response.message_count = Some(message_count);
        response.last_message_at = last_message_at;
        response
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub notification_id: i64,
    pub message_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub message_body: String,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(value: Notification) -> Self {
        Self {
            notification_id: value.id,
            message_id: value.message_public_id,
            conversation_id: value.conversation_public_id,
            sender: value.sender_email,
            message_body: value.message_content,
            is_read: value.is_read,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub access: String,
    pub refresh: String,
}

impl From<TokenPair> for TokensResponse {
    fn from(value: TokenPair) -> Self {
        Self {
            access: value.access,
            refresh: value.refresh,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub message: String,
}

impl DetailResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
    /// Emails or user ids of the other participants.
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub title: Option<Option<String>>,
    #[serde(default)]
    pub add_participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub message_body: String,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub message_body: String,
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
