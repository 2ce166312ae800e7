use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use messaging_auth::Registration;
use messaging_database::UserProfileUpdate;
use serde::{Deserialize, Serialize};

use crate::{
    routes::models::{DetailResponse, TokensResponse, UserResponse},
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
    pub tokens: TokensResponse,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let registration = Registration {
        email: payload.email,
        password: payload.password,
        password_confirm: payload.password_confirm,
        first_name: payload.first_name,
        last_name: payload.last_name,
        phone_number: payload.phone_number,
    };

    let (user, tokens) = state.authenticator().register(&registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully.".to_string(),
            user: user.into(),
            tokens: tokens.into(),
        }),
    ))
}

pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (user, tokens) = state
        .authenticator()
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(TokenResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: user.into(),
    }))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let access = state.authenticator().refresh(&payload.refresh).await?;
    Ok(Json(RefreshResponse { access }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LogoutRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let refresh_token = payload
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Refresh token is required."))?;

    state
        .authenticator()
        .logout(&user, &refresh_token)
        .await
        .map_err(|_| ApiError::bad_request("Invalid token."))?;

    Ok(Json(DetailResponse::new("Successfully logged out.")))
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    Ok(Json(user.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let update = UserProfileUpdate {
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        phone_number: payload.phone_number,
    };
    if update.is_empty() {
        return Ok(Json(user.into()));
    }

    let updated = state.authenticator().update_profile(&user, update).await?;
    Ok(Json(updated.into()))
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    state
        .authenticator()
        .change_password(
            &user,
            &payload.old_password,
            &payload.new_password,
            &payload.new_password_confirm,
        )
        .await?;

    Ok(Json(DetailResponse::new("Password updated successfully.")))
}
