use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration, time::Instant};

use messaging_auth::{Authenticator, Claims};
use messaging_config::{AppConfig, RateLimitConfig};
use messaging_database::{
    ConversationRepository, MessageRepository, NotificationRepository, User, UserRepository,
};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    authenticator: Authenticator,
    users: UserRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
    notifications: NotificationRepository,
    config: Arc<AppConfig>,
    rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: SqlitePool, authenticator: Authenticator, config: AppConfig) -> Self {
        let rate_limiter = RateLimiter::from_config(&config.middleware.rate_limit);

        Self {
            users: UserRepository::new(pool.clone()),
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            notifications: NotificationRepository::new(pool.clone()),
            pool,
            authenticator,
            config: Arc::new(config),
            rate_limiter,
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn conversations(&self) -> &ConversationRepository {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.messages
    }

    pub fn notifications(&self) -> &NotificationRepository {
        &self.notifications
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, Claims), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: StdDuration },
}

struct RateWindow {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client address. A window opens
/// with the first counted request and resets once it has elapsed.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, RateWindow>>>,
    max_requests: u32,
    window: StdDuration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: StdDuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            StdDuration::from_secs(config.window_seconds),
        )
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.window);

        let now = Instant::now();
        let entry = guard.entry(key.to_string()).or_insert(RateWindow {
            started: now,
            count: 0,
        });

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateDecision::Allowed
    }

    pub async fn tracked_clients(&self) -> usize {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.window);
        guard.len()
    }

    fn prune(map: &mut HashMap<String, RateWindow>, window: StdDuration) {
        let now = Instant::now();
        map.retain(|_, entry| now.duration_since(entry.started) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn limiter_admits_max_requests_per_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed);
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed);
        match limiter.check("10.0.0.1").await {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                assert!(retry_after > Duration::from_secs(50));
            }
            RateDecision::Allowed => panic!("third request should be limited"),
        }

        assert_eq!(limiter.check("10.0.0.2").await, RateDecision::Allowed);
    }

    #[tokio::test]
    async fn limiter_window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert_eq!(limiter.check("client").await, RateDecision::Allowed);
        assert!(matches!(
            limiter.check("client").await,
            RateDecision::Limited { .. }
        ));

        sleep(Duration::from_millis(40)).await;

        assert_eq!(limiter.tracked_clients().await, 0);
        assert_eq!(limiter.check("client").await, RateDecision::Allowed);
    }
}
