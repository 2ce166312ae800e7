use axum::http::{header::RETRY_AFTER, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use messaging_auth::AuthError;
use messaging_database::DatabaseError;
use serde::Serialize;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "A server error occurred.";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Vec<String>>,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn too_many_requests(retry_after_seconds: u64) -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Request was throttled. Too many messages sent; try again later.",
        );
        error.retry_after = Some(retry_after_seconds);
        error
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
        });
        let mut response = (self.status, body).into_response();
        if let Some(seconds) = self.retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(_) => Self::not_found("Not found."),
            DatabaseError::Duplicate(message) | DatabaseError::ValidationError(message) => {
                Self::bad_request(message)
            }
            other => {
                error!(error = ?other, "database error");
                Self::internal_server_error(INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Validation(details) => {
                Self::bad_request("Invalid input.").with_details(details)
            }
            AuthError::UserExists | AuthError::EmailInUse | AuthError::IncorrectPassword => {
                Self::bad_request(error.to_string())
            }
            AuthError::InvalidCredentials
            | AuthError::InactiveAccount
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::TokenBlacklisted => Self::unauthorized(error.to_string()),
            AuthError::Database(db_error) => Self::from(db_error),
            AuthError::TokenCreation(_) | AuthError::PasswordHash(_) => {
                error!(error = ?error, "auth error");
                Self::internal_server_error(INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}
