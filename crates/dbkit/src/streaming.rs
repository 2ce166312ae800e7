//! Lazy, stream-based readers over `user_data`.
//!
//! Nothing here loads the whole table up front: rows come off a cursor,
//! batches are cut from that cursor, and pages are fetched one query at a
//! time until an empty page ends the sequence.

use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbKitError, DbKitResult};
use crate::UserRecord;

/// Age above which `batch_processing` keeps a user.
pub const BATCH_MIN_AGE: f64 = 25.0;

const STREAM_USERS: &str = "SELECT user_id, name, email, age FROM user_data ORDER BY rowid";
const PAGE_USERS: &str =
    "SELECT user_id, name, email, age FROM user_data ORDER BY rowid LIMIT ? OFFSET ?";

fn ensure_positive(name: &str, value: usize) -> DbKitResult<()> {
    if value == 0 {
        Err(DbKitError::invalid_size(name, value))
    } else {
        Ok(())
    }
}

/// Yield users one row at a time from a single cursor.
pub fn stream_users(pool: &SqlitePool) -> BoxStream<'_, DbKitResult<UserRecord>> {
    sqlx::query_as::<_, UserRecord>(STREAM_USERS)
        .fetch(pool)
        .map_err(DbKitError::from)
        .boxed()
}

/// Yield users in batches of at most `batch_size` rows.
pub fn stream_users_in_batches(
    pool: &SqlitePool,
    batch_size: usize,
) -> DbKitResult<BoxStream<'_, DbKitResult<Vec<UserRecord>>>> {
    ensure_positive("batch_size", batch_size)?;

    Ok(stream_users(pool)
        .chunks(batch_size)
        .map(|batch| batch.into_iter().collect::<DbKitResult<Vec<_>>>())
        .boxed())
}

/// Batches from [`stream_users_in_batches`] with only users older than 25.
/// Every source batch yields one, possibly empty, filtered batch.
pub fn batch_processing(
    pool: &SqlitePool,
    batch_size: usize,
) -> DbKitResult<BoxStream<'_, DbKitResult<Vec<UserRecord>>>> {
    Ok(stream_users_in_batches(pool, batch_size)?
        .map_ok(|batch| {
            batch
                .into_iter()
                .filter(|user| user.age > BATCH_MIN_AGE)
                .collect()
        })
        .boxed())
}

/// Fetch one page of users starting at `offset`.
pub async fn paginate_users(
    pool: &SqlitePool,
    page_size: usize,
    offset: usize,
) -> DbKitResult<Vec<UserRecord>> {
    ensure_positive("page_size", page_size)?;

    let users = sqlx::query_as::<_, UserRecord>(PAGE_USERS)
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(pool)
        .await?;
    debug!(page_size, offset, rows = users.len(), "fetched user page");
    Ok(users)
}

/// Yield consecutive pages, fetching the next one only when asked. The
/// sequence ends at the first empty page or after the first error.
pub fn lazy_paginate(
    pool: &SqlitePool,
    page_size: usize,
) -> DbKitResult<BoxStream<'_, DbKitResult<Vec<UserRecord>>>> {
    ensure_positive("page_size", page_size)?;

    Ok(stream::unfold(Some(0usize), move |offset| async move {
        let offset = offset?;
        match paginate_users(pool, page_size, offset).await {
            Ok(page) if page.is_empty() => None,
            Ok(page) => Some((Ok(page), Some(offset + page_size))),
            Err(error) => Some((Err(error), None)),
        }
    })
    .boxed())
}

/// Yield each user's age without materialising the rows.
pub fn stream_user_ages(pool: &SqlitePool) -> BoxStream<'_, DbKitResult<f64>> {
    sqlx::query_scalar::<_, f64>("SELECT age FROM user_data ORDER BY rowid")
        .fetch(pool)
        .map_err(DbKitError::from)
        .boxed()
}

/// Average over [`stream_user_ages`]; `None` when the table is empty.
pub async fn calculate_average_age(pool: &SqlitePool) -> DbKitResult<Option<f64>> {
    let (total, count) = stream_user_ages(pool)
        .try_fold((0.0f64, 0u64), |(total, count), age| async move {
            Ok((total + age, count + 1))
        })
        .await?;

    Ok((count > 0).then(|| total / count as f64))
}

/// A restartable view over `user_data`: each call to [`pages`](Self::pages)
/// or [`ages`](Self::ages) starts again from the first row.
#[derive(Debug, Clone)]
pub struct UserPaginator {
    pool: SqlitePool,
    page_size: usize,
}

impl UserPaginator {
    pub fn new(pool: SqlitePool, page_size: usize) -> DbKitResult<Self> {
        ensure_positive("page_size", page_size)?;
        Ok(Self { pool, page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages(&self) -> BoxStream<'_, DbKitResult<Vec<UserRecord>>> {
        match lazy_paginate(&self.pool, self.page_size) {
            Ok(pages) => pages,
            Err(error) => stream::once(async move { Err(error) }).boxed(),
        }
    }

    pub fn ages(&self) -> BoxStream<'_, DbKitResult<f64>> {
        stream_user_ages(&self.pool)
    }
}
