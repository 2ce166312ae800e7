use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    Json,
};
use messaging_database::{MessageFilter, MessageOrder, Page};
use serde::Deserialize;
use tracing::info;

use crate::{
    pagination::{PageQuery, PageRequest, Paginated},
    routes::models::{
        CreateMessageRequest, HistoryResponse, MessageHistoryResponse, MessageResponse,
        ThreadResponse, UpdateMessageRequest,
    },
    services::{
        conversation::authorize_conversation,
        message::{self as message_service, MessageCriteria},
    },
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub conversation: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl MessageQuery {
    fn criteria(&self) -> MessageCriteria<'_> {
        MessageCriteria {
            sender: self.sender.as_deref(),
            receiver: self.receiver.as_deref(),
            conversation: self.conversation.as_deref(),
            start_date: self.start_date.as_deref(),
            end_date: self.end_date.as_deref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn list_conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Paginated<MessageResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let request = PageRequest::from_query(&page, &state.config().pagination)?;

    let criteria = MessageCriteria {
        receiver: None,
        conversation: None,
        ..query.criteria()
    };
    let mut filter = message_service::build_filter(&state, &user, &criteria).await?;
    filter.conversation = Some(conversation.id);

    let messages = state
        .messages()
        .list(&filter, MessageOrder::OldestFirst, request.pagination())
        .await?;

    Ok(Json(Paginated::build(messages, &request, &uri, MessageResponse::from)?))
}

pub async fn create_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::POST).await?;
    let message = message_service::post_message(
        &state,
        &conversation,
        &user,
        &payload.message_body,
        payload.parent_message_id.as_deref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let message =
        message_service::authorize_message(&state, &conversation, &message_id, &user, &Method::GET)
            .await?;

    Ok(Json(message.into()))
}

/// Serves both `PUT` and `PATCH`; only the body can change.
pub async fn update_message(
    State(state): State<AppState>,
    method: Method,
    Path((conversation_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let message =
        message_service::authorize_message(&state, &conversation, &message_id, &user, &method)
            .await?;
    let updated =
        message_service::edit_message(&state, &message, &user, &payload.message_body).await?;

    Ok(Json(updated.into()))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let message = message_service::authorize_message(
        &state,
        &conversation,
        &message_id,
        &user,
        &Method::DELETE,
    )
    .await?;

    state.messages().delete(message.id).await?;
    info!(message = %message.public_id, user = %user.public_id, "message deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn message_history(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MessageHistoryResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let message =
        message_service::authorize_message(&state, &conversation, &message_id, &user, &Method::GET)
            .await?;
    let history = state.messages().history(message.id).await?;

    Ok(Json(MessageHistoryResponse {
        message_id: message.public_id,
        history: history.into_iter().map(HistoryResponse::from).collect(),
    }))
}

pub async fn message_thread(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ThreadResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = authorize_conversation(&state, &conversation_id, &user, &Method::GET).await?;
    let message =
        message_service::authorize_message(&state, &conversation, &message_id, &user, &Method::GET)
            .await?;
    let thread = state
        .messages()
        .thread(message.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found."))?;

    Ok(Json(thread.into()))
}

/// Messages across every conversation the caller takes part in, newest
/// first.
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Paginated<MessageResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let filter = message_service::build_filter(&state, &user, &query.criteria()).await?;
    let messages = state
        .messages()
        .list(&filter, MessageOrder::NewestFirst, request.pagination())
        .await?;

    Ok(Json(Paginated::build(messages, &request, &uri, MessageResponse::from)?))
}

pub async fn search_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Paginated<MessageResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let term = query.q.as_deref().map(str::trim).unwrap_or_default();

    let messages = if term.is_empty() {
        Page::empty()
    } else {
        let filter = MessageFilter {
            search: Some(term.to_string()),
            ..MessageFilter::visible_to(user.id)
        };
        state
            .messages()
            .list(&filter, MessageOrder::NewestFirst, request.pagination())
            .await?
    };

    Ok(Json(Paginated::build(messages, &request, &uri, MessageResponse::from)?))
}

pub async fn unread_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<MessageResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let messages = state
        .messages()
        .unread_for_user(user.id, request.pagination())
        .await?;

    Ok(Json(Paginated::build(messages, &request, &uri, MessageResponse::from)?))
}
