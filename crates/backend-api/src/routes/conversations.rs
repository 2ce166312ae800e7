use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    Json,
};
use messaging_database::{MessageFilter, MessageOrder, Pagination};
use serde::Deserialize;
use tracing::info;

use crate::{
    pagination::{PageQuery, PageRequest, Paginated},
    routes::models::{
        ConversationResponse, CreateConversationRequest, UpdateConversationRequest,
    },
    services::conversation as conversation_service,
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub search: Option<String>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Paginated<ConversationResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let overviews = state
        .conversations()
        .list_for_user(user.id, query.search.as_deref(), request.pagination())
        .await?;

    let mut with_participants = Vec::with_capacity(overviews.items.len());
    for overview in overviews.items {
        let participants = state.conversations().participants(overview.id).await?;
        with_participants.push((overview, participants));
    }

    let page = messaging_database::Page {
        items: with_participants,
        total: overviews.total,
    };

    Ok(Json(Paginated::build(page, &request, &uri, |(overview, participants)| {
        ConversationResponse::from_overview(overview, participants)
    })?))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = conversation_service::create_conversation(
        &state,
        &user,
        payload.title.as_deref(),
        &payload.participants,
    )
    .await?;
    let participants = state.conversations().participants(conversation.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse::new(conversation, participants)),
    ))
}

/// Detail view: participants plus the most recent messages, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConversationResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation =
        conversation_service::authorize_conversation(&state, &conversation_id, &user, &Method::GET)
            .await?;
    let participants = state.conversations().participants(conversation.id).await?;

    let filter = MessageFilter {
        conversation: Some(conversation.id),
        ..MessageFilter::default()
    };
    let limit = i64::from(state.config().pagination.max_page_size);
    let mut recent = state
        .messages()
        .list(&filter, MessageOrder::NewestFirst, Pagination::new(limit, 0))
        .await?
        .items;
    recent.reverse();

    Ok(Json(
        ConversationResponse::new(conversation, participants).with_messages(recent),
    ))
}

pub async fn update_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation =
        conversation_service::authorize_conversation(&state, &conversation_id, &user, &Method::PUT)
            .await?;
    let updated = conversation_service::update_conversation(
        &state,
        &conversation,
        payload.title,
        &payload.add_participants,
    )
    .await?;
    let participants = state.conversations().participants(updated.id).await?;

    Ok(Json(ConversationResponse::new(updated, participants)))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = conversation_service::authorize_conversation(
        &state,
        &conversation_id,
        &user,
        &Method::DELETE,
    )
    .await?;
    state.conversations().delete(conversation.id).await?;
    info!(conversation = %conversation.public_id, user = %user.public_id, "conversation deleted");

    Ok(StatusCode::NO_CONTENT)
}
