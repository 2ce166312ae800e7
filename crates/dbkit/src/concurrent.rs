//! Fan-out reads over independent connections.

use tracing::info;

use crate::context::DatabaseConnection;
use crate::decorators::with_db_connection;
use crate::error::DbKitResult;
use crate::{UserRecord, USER_COLUMNS};

pub const OLDER_USER_AGE: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentFetch {
    pub all_users: Vec<UserRecord>,
    pub older_users: Vec<UserRecord>,
}

async fn fetch_users(database: &DatabaseConnection) -> DbKitResult<Vec<UserRecord>> {
    with_db_connection(database, |connection| {
        Box::pin(async move {
            let users = sqlx::query_as::<_, UserRecord>(&format!(
                "SELECT {USER_COLUMNS} FROM user_data ORDER BY rowid"
            ))
            .fetch_all(&mut *connection)
            .await?;
            Ok(users)
        })
    })
    .await
}

async fn fetch_older_users(
    database: &DatabaseConnection,
    min_age: f64,
) -> DbKitResult<Vec<UserRecord>> {
    with_db_connection(database, move |connection| {
        Box::pin(async move {
            let users = sqlx::query_as::<_, UserRecord>(&format!(
                "SELECT {USER_COLUMNS} FROM user_data WHERE age > ? ORDER BY rowid"
            ))
            .bind(min_age)
            .fetch_all(&mut *connection)
            .await?;
            Ok(users)
        })
    })
    .await
}

/// Read every user and the users older than 40 at the same time, each on
/// its own connection. The first failure aborts the join.
pub async fn fetch_concurrently(database: &DatabaseConnection) -> DbKitResult<ConcurrentFetch> {
    let (all_users, older_users) = tokio::try_join!(
        fetch_users(database),
        fetch_older_users(database, OLDER_USER_AGE)
    )?;

    info!(
        all = all_users.len(),
        older = older_users.len(),
        "concurrent user queries finished"
    );

    Ok(ConcurrentFetch {
        all_users,
        older_users,
    })
}
