use axum::http::Method;
use messaging_database::{Conversation, Message, MessageFilter, NewMessage, User};
use tracing::info;

use super::error::ServiceError;
use crate::{
    permissions::{message_permission, user_can_access_message, PERMISSION_DENIED},
    util::parse_date,
    AppState,
};

/// Load a message of `conversation` and check `user` may act on it with
/// `method`. Messages from other conversations are reported as missing.
pub async fn authorize_message(
    state: &AppState,
    conversation: &Conversation,
    message_id: &str,
    user: &User,
    method: &Method,
) -> Result<Message, ServiceError> {
    let message = state
        .messages()
        .find_by_public_id(message_id)
        .await?
        .filter(|message| message.conversation_id == conversation.id)
        .ok_or_else(|| ServiceError::not_found("Message not found."))?;

    let is_participant = user_can_access_message(state.conversations(), user, &message).await?;
    if !message_permission(method, user, &message, is_participant) {
        return Err(ServiceError::forbidden(PERMISSION_DENIED));
    }

    Ok(message)
}

pub async fn post_message(
    state: &AppState,
    conversation: &Conversation,
    sender: &User,
    body: &str,
    parent_message_id: Option<&str>,
) -> Result<Message, ServiceError> {
    let body = validate_body(body)?;

    let parent_message_id = match parent_message_id.map(str::trim).filter(|id| !id.is_empty()) {
        None => None,
        Some(public_id) => {
            let parent = state
                .messages()
                .find_by_public_id(public_id)
                .await?
                .ok_or_else(|| ServiceError::bad_request("parent_message_id: Unknown message."))?;
            Some(parent.id)
        }
    };

    let message = state
        .messages()
        .create(&NewMessage {
            conversation_id: conversation.id,
            sender_id: sender.id,
            content: body,
            parent_message_id,
        })
        .await?;

    Ok(message)
}

pub async fn edit_message(
    state: &AppState,
    message: &Message,
    editor: &User,
    body: &str,
) -> Result<Message, ServiceError> {
    let body = validate_body(body)?;
    let (message, changed) = state
        .messages()
        .update_content(message.id, &body, editor.id)
        .await?;

    if changed {
        info!(message = %message.public_id, editor = %editor.public_id, "message edited");
    }

    Ok(message)
}

fn validate_body(body: &str) -> Result<String, ServiceError> {
    if body.trim().is_empty() {
        return Err(ServiceError::bad_request(
            "message_body: This field may not be blank.",
        ));
    }
    Ok(body.to_string())
}

/// Query parameters shared by message listings.
#[derive(Debug, Default)]
pub struct MessageCriteria<'a> {
    pub sender: Option<&'a str>,
    pub receiver: Option<&'a str>,
    pub conversation: Option<&'a str>,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
}

pub async fn build_filter(
    state: &AppState,
    viewer: &User,
    criteria: &MessageCriteria<'_>,
) -> Result<MessageFilter, ServiceError> {
    let mut filter = MessageFilter::visible_to(viewer.id);

    if let Some(sender) = non_empty(criteria.sender) {
        filter.sender = Some(resolve_user(state, "sender", sender).await?);
    }
    if let Some(receiver) = non_empty(criteria.receiver) {
        filter.receiver = Some(resolve_user(state, "receiver", receiver).await?);
    }
    if let Some(conversation) = non_empty(criteria.conversation) {
        let conversation = state
            .conversations()
            .find_by_public_id(conversation)
            .await?
            .ok_or_else(|| ServiceError::bad_request("conversation: Unknown conversation."))?;
        filter.conversation = Some(conversation.id);
    }

    let start = parse_date("start_date", criteria.start_date).map_err(|e| ServiceError::bad_request(e.message))?;
    let end = parse_date("end_date", criteria.end_date).map_err(|e| ServiceError::bad_request(e.message))?;
    if let Some(start) = start {
        filter = filter.from_date(start);
    }
    if let Some(end) = end {
        filter = filter.until_date(end);
    }

    Ok(filter)
}

async fn resolve_user(state: &AppState, field: &str, identifier: &str) -> Result<i64, ServiceError> {
    state
        .users()
        .find_by_identifier(identifier)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| ServiceError::bad_request(format!("{field}: Unknown user '{identifier}'.")))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
