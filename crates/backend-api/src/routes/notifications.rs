use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Uri},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    pagination::{PageQuery, PageRequest, Paginated},
    routes::models::NotificationResponse,
    util::{parse_flag, require_bearer},
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub unread_only: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated_count: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Paginated<NotificationResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let notifications = state
        .notifications()
        .list_for_user(
            user.id,
            parse_flag(query.unread_only.as_deref()),
            request.pagination(),
        )
        .await?;

    Ok(Json(Paginated::build(
        notifications,
        &request,
        &uri,
        NotificationResponse::from,
    )?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let unread_count = state.notifications().unread_count(user.id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<NotificationResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let notification = state
        .notifications()
        .mark_read(user.id, notification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification not found."))?;

    Ok(Json(notification.into()))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let updated_count = state.notifications().mark_all_read(user.id).await?;
    Ok(Json(MarkAllReadResponse { updated_count }))
}
