mod error;
mod state;
mod util;

pub mod middleware;
pub mod pagination;
pub mod permissions;
pub mod routes;
pub mod services;

pub use error::{ApiError, ErrorResponse};
pub use state::{AppState, RateDecision, RateLimiter};

use axum::{
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth routes
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/token", post(routes::auth::obtain_token))
        .route("/api/auth/token/refresh", post(routes::auth::refresh_token))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route(
            "/api/auth/profile",
            get(routes::auth::get_profile).put(routes::auth::update_profile),
        )
        .route(
            "/api/auth/change-password",
            post(routes::auth::change_password),
        )
        .route(
            "/api/users/me",
            axum::routing::delete(routes::users::delete_current_user),
        )
        // Conversation routes
        .route(
            "/api/conversations",
            get(routes::conversations::list_conversations)
                .post(routes::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:conversation_id",
            get(routes::conversations::get_conversation)
                .put(routes::conversations::update_conversation)
                .patch(routes::conversations::update_conversation)
                .delete(routes::conversations::delete_conversation),
        )
        // Message routes
        .route(
            "/api/conversations/:conversation_id/messages",
            get(routes::messages::list_conversation_messages)
                .post(routes::messages::create_message),
        )
        .route(
            "/api/conversations/:conversation_id/messages/:message_id",
            get(routes::messages::get_message)
                .put(routes::messages::update_message)
                .patch(routes::messages::update_message)
                .delete(routes::messages::delete_message),
        )
        .route(
            "/api/conversations/:conversation_id/messages/:message_id/history",
            get(routes::messages::message_history),
        )
        .route(
            "/api/conversations/:conversation_id/messages/:message_id/thread",
            get(routes::messages::message_thread),
        )
        .route("/api/messages", get(routes::messages::list_messages))
        .route("/api/messages/search", get(routes::messages::search_messages))
        .route("/api/messages/unread", get(routes::messages::unread_messages))
        // Notification routes
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:notification_id/read",
            post(routes::notifications::mark_read),
        )
        // Staff routes
        .route("/api/admin/users", get(routes::admin::list_users))
        .route("/api/admin/messages", get(routes::admin::list_messages))
        // Layers run bottom-up: the last one added sees the request first.
        .layer(from_fn_with_state(
            state.clone(),
            middleware::require_staff_paths,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::throttle_posts))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::restrict_access_hours,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::log_requests))
        .with_state(state)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
