//! Small toolkit around a SQLite `user_data` table: scoped connections,
//! call wrappers, streaming pagination, concurrent reads and CSV seeding.

pub mod concurrent;
pub mod context;
pub mod decorators;
pub mod error;
pub mod seed;
pub mod streaming;

use sqlx::{FromRow, SqlitePool};

pub use concurrent::{fetch_concurrently, ConcurrentFetch, OLDER_USER_AGE};
pub use context::{DatabaseConnection, ExecuteQuery, QueryOutcome, QueryParam};
pub use decorators::{
    cache_query, log_query, retry_on_failure, transactional, user_query_cache, with_db_connection,
    QueryCache, RetryPolicy,
};
pub use error::{DbKitError, DbKitResult};
pub use seed::{
    ensure_user_data_table, insert_users, parse_csv, seed_from_csv, CsvUser, SeedReport,
};
pub use streaming::{
    batch_processing, calculate_average_age, lazy_paginate, paginate_users, stream_user_ages,
    stream_users, stream_users_in_batches, UserPaginator,
};

/// Columns selected by every user query, in table order.
pub const USER_COLUMNS: &str = "user_id, name, email, age";

/// One row of `user_data`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: f64,
}

/// Fetch every user in insertion order.
pub async fn fetch_all_users(pool: &SqlitePool) -> DbKitResult<Vec<UserRecord>> {
    let users = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {USER_COLUMNS} FROM user_data ORDER BY rowid"
    ))
    .fetch_all(pool)
    .await?;
    Ok(users)
}
