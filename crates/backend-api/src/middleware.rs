//! Request interceptors, outermost first: request logging, the time-of-day
//! access window, POST throttling and staff-only path gating.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{NaiveTime, Timelike, Utc};
use messaging_auth::TokenType;
use messaging_config::AccessWindowConfig;
use tracing::{info, warn};

use crate::{
    permissions::PERMISSION_DENIED,
    state::RateDecision,
    util::{client_ip, require_bearer},
    ApiError, AppState,
};

pub async fn log_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config().middleware.request_logging {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user = require_bearer(request.headers())
        .ok()
        .and_then(|token| {
            state
                .authenticator()
                .tokens()
                .decode(&token, TokenType::Access)
                .ok()
        })
        .map(|claims| claims.email)
        .unwrap_or_else(|| "Anonymous".to_string());

    let response = next.run(request).await;

    info!(
        target: "request_logger",
        user = %user,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );

    response
}

/// Daily window during which the API may be used, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl AccessWindow {
    pub fn from_config(config: &AccessWindowConfig) -> Self {
        Self {
            start_hour: config.start_hour,
            end_hour: config.end_hour,
        }
    }

    /// Both bounds are inclusive: with 9 to 18, 18:00:00 is still allowed.
    pub fn permits(&self, time: NaiveTime) -> bool {
        let seconds = time.num_seconds_from_midnight();
        let start = u32::from(self.start_hour) * 3600;
        let end = u32::from(self.end_hour) * 3600;
        seconds >= start && seconds <= end
    }

    pub fn denial_message(&self) -> String {
        format!(
            "Access is restricted to between {} and {}.",
            display_hour(self.start_hour),
            display_hour(self.end_hour)
        )
    }
}

fn display_hour(hour: u8) -> String {
    match hour % 24 {
        0 => "12 AM".to_string(),
        12 => "12 PM".to_string(),
        h if h < 12 => format!("{h} AM"),
        h => format!("{} PM", h - 12),
    }
}

pub async fn restrict_access_hours(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let config = &state.config().middleware.access_window;
    if !config.enabled {
        return next.run(request).await;
    }

    let window = AccessWindow::from_config(config);
    if !window.permits(Utc::now().time()) {
        warn!(path = %request.uri().path(), "request outside access window");
        return ApiError::forbidden(window.denial_message()).into_response();
    }

    next.run(request).await
}

pub async fn throttle_posts(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config().middleware.rate_limit.enabled || request.method() != Method::POST {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    match state.rate_limiter().check(&ip).await {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            warn!(ip = %ip, path = %request.uri().path(), "rate limit exceeded");
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            ApiError::too_many_requests(seconds.max(1)).into_response()
        }
    }
}

pub async fn require_staff_paths(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let gated = state
        .config()
        .middleware
        .staff_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()));

    if !gated {
        return next.run(request).await;
    }

    let token = match require_bearer(request.headers()) {
        Ok(token) => token,
        Err(error) => return error.into_response(),
    };

    match state.authenticate(&token).await {
        Ok((user, _)) if user.is_staff => next.run(request).await,
        Ok((user, _)) => {
            warn!(user = %user.public_id, path = %path, "non-staff user denied");
            ApiError::forbidden(PERMISSION_DENIED).into_response()
        }
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = AccessWindow {
            start_hour: 9,
            end_hour: 18,
        };

        assert!(!window.permits(at(8, 59, 59)));
        assert!(window.permits(at(9, 0, 0)));
        assert!(window.permits(at(13, 30, 0)));
        assert!(window.permits(at(18, 0, 0)));
        assert!(!window.permits(at(18, 0, 1)));
    }

    #[test]
    fn denial_message_reflects_configured_hours() {
        let window = AccessWindow {
            start_hour: 9,
            end_hour: 18,
        };
        assert_eq!(
            window.denial_message(),
            "Access is restricted to between 9 AM and 6 PM."
        );

        let night = AccessWindow {
            start_hour: 0,
            end_hour: 12,
        };
        assert_eq!(
            night.denial_message(),
            "Access is restricted to between 12 AM and 12 PM."
        );
    }
}
