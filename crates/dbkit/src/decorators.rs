//! Wrappers that add logging, connection management, transactions, retries
//! and caching around a database call.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use sqlx::{Connection, SqliteConnection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::DatabaseConnection;
use crate::error::DbKitResult;
use crate::UserRecord;

/// Log `query` before running `operation` and the outcome afterwards.
pub async fn log_query<T, Fut>(query: &str, operation: Fut) -> DbKitResult<T>
where
    Fut: Future<Output = DbKitResult<T>>,
{
    info!(target: "dbkit::query", %query, "executing sql query");
    let started = Instant::now();
    let outcome = operation.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &outcome {
        Ok(_) => info!(target: "dbkit::query", %query, elapsed_ms, "query executed successfully"),
        Err(error) => warn!(target: "dbkit::query", %query, elapsed_ms, %error, "query failed"),
    }
    outcome
}

/// Open a dedicated connection for one call and close it afterwards,
/// whether the call succeeded or not.
pub async fn with_db_connection<T, F>(database: &DatabaseConnection, call: F) -> DbKitResult<T>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbKitResult<T>>,
{
    let mut connection = database.open().await?;
    let outcome = call(&mut connection).await;

    if let Err(error) = connection.close().await {
        warn!(%error, "failed to close database connection");
    }
    outcome
}

/// Run `call` inside a transaction on `connection`: commit when it returns
/// `Ok`, roll back otherwise.
pub async fn transactional<T, F>(connection: &mut SqliteConnection, call: F) -> DbKitResult<T>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbKitResult<T>>,
{
    let mut transaction = connection.begin().await?;

    match call(&mut *transaction).await {
        Ok(value) => {
            transaction.commit().await?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(%rollback_error, "rollback failed");
            }
            warn!(%error, "transaction rolled back");
            Err(error)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

/// Call `operation` until it succeeds or the policy runs out of attempts.
/// The last error is returned when every attempt failed.
pub async fn retry_on_failure<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> DbKitResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbKitResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    %error,
                    attempt,
                    retries = policy.retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    "database call failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Results keyed by the literal query text.
pub struct QueryCache<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T: Clone> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, query: &str) -> Option<T> {
        self.entries.lock().await.get(query).cloned()
    }

    pub async fn insert(&self, query: impl Into<String>, value: T) {
        self.entries.lock().await.insert(query.into(), value);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl<T: Clone> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

static USER_QUERY_CACHE: Lazy<QueryCache<Vec<UserRecord>>> = Lazy::new(QueryCache::new);

/// Process-wide cache for user listings.
pub fn user_query_cache() -> &'static QueryCache<Vec<UserRecord>> {
    &USER_QUERY_CACHE
}

/// Return the cached result for `query`, running `operation` only on a miss.
/// Failed calls are not cached.
pub async fn cache_query<T, F, Fut>(cache: &QueryCache<T>, query: &str, operation: F) -> DbKitResult<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = DbKitResult<T>>,
{
    if let Some(hit) = cache.get(query).await {
        debug!(%query, "using cached result");
        return Ok(hit);
    }

    let value = operation().await?;
    cache.insert(query, value.clone()).await;
    Ok(value)
}
