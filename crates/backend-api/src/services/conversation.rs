use std::collections::BTreeSet;

use axum::http::Method;
use messaging_database::{Conversation, User};
use tracing::info;

use super::error::ServiceError;
use crate::{
    permissions::{conversation_permission, user_can_access_conversation, PERMISSION_DENIED},
    AppState,
};

const MAX_TITLE_LENGTH: usize = 255;

/// Load a conversation and check `user` may act on it with `method`.
pub async fn authorize_conversation(
    state: &AppState,
    public_id: &str,
    user: &User,
    method: &Method,
) -> Result<Conversation, ServiceError> {
    let conversation = state
        .conversations()
        .find_by_public_id(public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Conversation not found."))?;

    let is_participant =
        user_can_access_conversation(state.conversations(), user, &conversation).await?;

    if !conversation_permission(method, user, &conversation, is_participant) {
        return Err(ServiceError::forbidden(PERMISSION_DENIED));
    }

    Ok(conversation)
}

/// Resolve emails or user ids to row ids. Unknown identifiers are rejected.
pub async fn resolve_users(state: &AppState, identifiers: &[String]) -> Result<Vec<i64>, ServiceError> {
    let mut ids = Vec::with_capacity(identifiers.len());

    for identifier in identifiers {
        let identifier = identifier.trim();
        let user = state
            .users()
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| ServiceError::bad_request(format!("participants: Unknown user '{identifier}'.")))?;
        ids.push(user.id);
    }

    Ok(ids)
}

pub async fn create_conversation(
    state: &AppState,
    creator: &User,
    title: Option<&str>,
    participants: &[String],
) -> Result<Conversation, ServiceError> {
    let title = normalize_title(title)?;
    let participant_ids = resolve_users(state, participants).await?;

    let distinct: BTreeSet<i64> = participant_ids
        .iter()
        .copied()
        .chain(std::iter::once(creator.id))
        .collect();
    if distinct.len() < 2 {
        return Err(ServiceError::bad_request(
            "participants: A conversation needs at least two distinct participants.",
        ));
    }

    let others: Vec<i64> = distinct.into_iter().filter(|id| *id != creator.id).collect();
    let conversation = state
        .conversations()
        .create(creator.id, title.as_deref(), &others)
        .await?;

    Ok(conversation)
}

/// Validate every change before writing any of them, so a rejected update
/// leaves the conversation untouched.
pub async fn update_conversation(
    state: &AppState,
    conversation: &Conversation,
    title: Option<Option<String>>,
    add_participants: &[String],
) -> Result<Conversation, ServiceError> {
    let title = match title {
        Some(title) => Some(normalize_title(title.as_deref())?),
        None => None,
    };
    let ids = resolve_users(state, add_participants).await?;

    let (updated, added) = state
        .conversations()
        .update(conversation.id, title.as_ref().map(Option::as_deref), &ids)
        .await?;

    if added > 0 {
        info!(conversation = %conversation.public_id, added, "participants added");
    }

    Ok(updated)
}

fn normalize_title(title: Option<&str>) -> Result<Option<String>, ServiceError> {
    match title.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) if title.chars().count() > MAX_TITLE_LENGTH => Err(ServiceError::bad_request(
            format!("title: Ensure this field has no more than {MAX_TITLE_LENGTH} characters."),
        )),
        other => Ok(other.map(str::to_string)),
    }
}
