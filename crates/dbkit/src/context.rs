//! Scoped connections and one-shot parameterised statements.

use std::fmt;

use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Sqlite, SqliteConnection};
use tracing::debug;

use crate::decorators::{log_query, transactional, with_db_connection};
use crate::error::{DbKitError, DbKitResult};

/// Connection factory for a single SQLite database.
///
/// Every scope opens its own connection and closes it on exit, so nothing
/// is pooled between calls.
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    options: SqliteConnectOptions,
}

impl DatabaseConnection {
    pub fn new(url: &str) -> DbKitResult<Self> {
        let options = messaging_database::connect_options(url)
            .map_err(|error| DbKitError::Connection(format!("{error:#}")))?;
        Ok(Self::from_options(options))
    }

    pub fn from_options(options: SqliteConnectOptions) -> Self {
        Self { options }
    }

    pub async fn open(&self) -> DbKitResult<SqliteConnection> {
        let connection = self
            .options
            .connect()
            .await
            .map_err(|error| DbKitError::Connection(error.to_string()))?;
        debug!("database connection opened");
        Ok(connection)
    }

    /// Run `scope` inside a transaction on a fresh connection. The
    /// transaction commits when `scope` succeeds and the connection is
    /// closed either way.
    pub async fn run<T, F>(&self, scope: F) -> DbKitResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbKitResult<T>>
            + Send
            + 'static,
    {
        with_db_connection(self, move |connection| {
            Box::pin(async move { transactional(connection, scope).await })
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Real(f64),
    Text(String),
    Null,
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

pub enum QueryOutcome {
    Rows(Vec<SqliteRow>),
    Affected(u64),
}

impl fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(rows) => f.debug_tuple("Rows").field(&rows.len()).finish(),
            Self::Affected(count) => f.debug_tuple("Affected").field(count).finish(),
        }
    }
}

impl QueryOutcome {
    pub fn rows(self) -> Vec<SqliteRow> {
        match self {
            Self::Rows(rows) => rows,
            Self::Affected(_) => Vec::new(),
        }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Rows(_) => 0,
            Self::Affected(count) => *count,
        }
    }
}

/// A single statement with positional parameters, executed in its own
/// connection scope.
pub struct ExecuteQuery<'a> {
    database: &'a DatabaseConnection,
    query: String,
    params: Vec<QueryParam>,
}

impl<'a> ExecuteQuery<'a> {
    pub fn new(database: &'a DatabaseConnection, query: impl Into<String>) -> Self {
        Self {
            database,
            query: query.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// `SELECT` and `WITH` statements return their rows; anything else
    /// returns the affected-row count once committed.
    pub async fn run(self) -> DbKitResult<QueryOutcome> {
        let Self {
            database,
            query,
            params,
        } = self;
        let logged = query.clone();

        log_query(
            &logged,
            database.run(move |connection| {
                Box::pin(async move {
                    let statement = bind_params(sqlx::query(&query), params);
                    if returns_rows(&query) {
                        Ok(QueryOutcome::Rows(statement.fetch_all(&mut *connection).await?))
                    } else {
                        let result = statement.execute(&mut *connection).await?;
                        Ok(QueryOutcome::Affected(result.rows_affected()))
                    }
                })
            }),
        )
        .await
    }
}

fn bind_params<'q>(
    mut statement: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: Vec<QueryParam>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        statement = match param {
            QueryParam::Int(value) => statement.bind(value),
            QueryParam::Real(value) => statement.bind(value),
            QueryParam::Text(value) => statement.bind(value),
            QueryParam::Null => statement.bind(None::<String>),
        };
    }
    statement
}

fn returns_rows(query: &str) -> bool {
    let keyword = query.split_whitespace().next().unwrap_or_default();
    keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_statements_are_detected() {
        assert!(returns_rows("SELECT * FROM user_data"));
        assert!(returns_rows("  with recent AS (SELECT 1) SELECT * FROM recent"));
        assert!(!returns_rows("UPDATE user_data SET age = 1"));
        assert!(!returns_rows(""));
    }

    #[test]
    fn outcomes_debug_as_counts() {
        assert_eq!(format!("{:?}", QueryOutcome::Rows(Vec::new())), "Rows(0)");
        assert_eq!(format!("{:?}", QueryOutcome::Affected(3)), "Affected(3)");
    }

    #[test]
    fn optional_params_become_null() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("x")), QueryParam::Text("x".into()));
    }
}
