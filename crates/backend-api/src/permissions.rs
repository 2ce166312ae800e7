//! Object-level access rules for conversations and messages.

use axum::http::Method;
use messaging_database::{Conversation, ConversationRepository, DatabaseResult, Message, User};

pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn is_modifying_method(method: &Method) -> bool {
    matches!(*method, Method::PUT | Method::PATCH | Method::DELETE)
}

/// Participants may read and post; changing or deleting the conversation
/// itself is reserved for its creator and staff.
pub fn conversation_permission(
    method: &Method,
    user: &User,
    conversation: &Conversation,
    is_participant: bool,
) -> bool {
    if !is_participant {
        return false;
    }
    if is_safe_method(method) || *method == Method::POST {
        return true;
    }
    is_modifying_method(method) && (user.is_staff || conversation.created_by == Some(user.id))
}

/// Participants may read and reply; only the sender may edit or delete.
/// Any other method is denied.
pub fn message_permission(method: &Method, user: &User, message: &Message, is_participant: bool) -> bool {
    if !is_participant {
        return false;
    }
    if is_safe_method(method) || *method == Method::POST {
        return true;
    }
    is_modifying_method(method) && user_owns_message(user, message)
}

pub async fn user_can_access_conversation(
    conversations: &ConversationRepository,
    user: &User,
    conversation: &Conversation,
) -> DatabaseResult<bool> {
    conversations.is_participant(conversation.id, user.id).await
}

pub async fn user_can_access_message(
    conversations: &ConversationRepository,
    user: &User,
    message: &Message,
) -> DatabaseResult<bool> {
    conversations
        .is_participant(message.conversation_id, user.id)
        .await
}

pub fn user_owns_message(user: &User, message: &Message) -> bool {
    message.sender_id == user.id
}
