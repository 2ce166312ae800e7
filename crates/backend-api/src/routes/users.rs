use axum::{extract::State, http::HeaderMap, http::StatusCode};
use tracing::info;

use crate::{util::require_bearer, ApiError, AppState};

/// Delete the caller's account together with their messages,
/// notifications and edit history.
pub async fn delete_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let cleanup = state.authenticator().delete_account(&user).await?;
    info!(
        messages = cleanup.messages,
        notifications = cleanup.notifications,
        history = cleanup.history,
        "account removed"
    );

    Ok(StatusCode::NO_CONTENT)
}
