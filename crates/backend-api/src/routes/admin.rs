use axum::{
    extract::{Query, State},
    http::{HeaderMap, Uri},
    Json,
};
use messaging_database::{MessageFilter, MessageOrder, User};

use crate::{
    pagination::{PageQuery, PageRequest, Paginated},
    permissions::PERMISSION_DENIED,
    routes::models::{AdminUserResponse, MessageResponse},
    util::require_bearer,
    ApiError, AppState,
};

async fn require_staff(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = require_bearer(headers)?;
    let (user, _) = state.authenticate(&token).await?;
    if !user.is_staff {
        return Err(ApiError::forbidden(PERMISSION_DENIED));
    }
    Ok(user)
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<AdminUserResponse>>, ApiError> {
    require_staff(&state, &headers).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let users = state.users().list(request.pagination()).await?;

    Ok(Json(Paginated::build(users, &request, &uri, AdminUserResponse::from)?))
}

pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<MessageResponse>>, ApiError> {
    require_staff(&state, &headers).await?;

    let request = PageRequest::from_query(&page, &state.config().pagination)?;
    let messages = state
        .messages()
        .list(
            &MessageFilter::default(),
            MessageOrder::NewestFirst,
            request.pagination(),
        )
        .await?;

    Ok(Json(Paginated::build(messages, &request, &uri, MessageResponse::from)?))
}
