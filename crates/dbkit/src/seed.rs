//! Create `user_data` and import rows from a CSV file.

use std::path::Path;

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbKitError, DbKitResult};

const REQUIRED_COLUMNS: [&str; 3] = ["name", "email", "age"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CsvUser {
    pub name: String,
    pub email: String,
    pub age: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: u64,
    pub skipped: u64,
}

pub async fn ensure_user_data_table(pool: &SqlitePool) -> DbKitResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_data (
            user_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            age REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_data_email ON user_data(email)")
        .execute(pool)
        .await?;
    Ok(())
}

fn csv_error(error: csv::Error) -> DbKitError {
    let line = error.position().map_or(1, |position| position.line() as usize);
    DbKitError::Csv {
        line,
        reason: error.to_string(),
    }
}

/// Parse `name,email,age` records. The header is required; its columns may
/// come in any order or case and extra columns are ignored. Quoted fields
/// may span lines.
pub fn parse_csv(text: &str) -> DbKitResult<Vec<CsvUser>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: csv::StringRecord = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect();
    if let Some(column) = REQUIRED_COLUMNS
        .into_iter()
        .find(|column| !headers.iter().any(|name| name == *column))
    {
        return Err(DbKitError::Csv {
            line: 1,
            reason: format!("missing required column {column}"),
        });
    }
    reader.set_headers(headers);

    reader
        .deserialize::<CsvUser>()
        .map(|record| record.map_err(csv_error))
        .collect()
}

/// Insert `users` in one transaction, skipping emails already present.
pub async fn insert_users(pool: &SqlitePool, users: &[CsvUser]) -> DbKitResult<SeedReport> {
    let mut transaction = pool.begin().await?;
    let mut report = SeedReport::default();

    for user in users {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_data WHERE email = ?)")
                .bind(&user.email)
                .fetch_one(&mut *transaction)
                .await?;
        if exists {
            report.skipped += 1;
            continue;
        }

        sqlx::query("INSERT INTO user_data (user_id, name, email, age) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.age)
            .execute(&mut *transaction)
            .await?;
        report.inserted += 1;
    }

    transaction.commit().await?;
    Ok(report)
}

/// Create the table when missing and import the CSV file at `path`.
pub async fn seed_from_csv(pool: &SqlitePool, path: impl AsRef<Path>) -> DbKitResult<SeedReport> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DbKitError::Io {
            path: path.display().to_string(),
            source,
        })?;

    ensure_user_data_table(pool).await?;
    let users = parse_csv(&text)?;
    let report = insert_users(pool, &users).await?;

    if report.skipped > 0 {
        warn!(skipped = report.skipped, "skipped users with existing emails");
    }
    info!(
        inserted = report.inserted,
        path = %path.display(),
        "user data seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields_and_reordered_columns() {
        let csv = "Email,NAME,age\n\"ann@example.com\",\"Doe, Ann\",41.5\n\nbo@example.com,\"Bo \"\"B\"\"\",19\n";
        let users = parse_csv(csv).unwrap();

        assert_eq!(
            users,
            vec![
                CsvUser {
                    name: "Doe, Ann".into(),
                    email: "ann@example.com".into(),
                    age: 41.5,
                },
                CsvUser {
                    name: "Bo \"B\"".into(),
                    email: "bo@example.com".into(),
                    age: 19.0,
                },
            ]
        );
    }

    #[test]
    fn quoted_fields_may_span_lines() {
        let csv = "name,email,age,notes\n\"Ada\nLovelace\",ada@example.com,36,\"says \"\"hi\"\"\"\nAlan,alan@example.com,41,\n";
        let users = parse_csv(csv).unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Ada\nLovelace");
        assert_eq!(users[0].age, 36.0);
        assert_eq!(users[1].email, "alan@example.com");
    }

    #[test]
    fn missing_header_column_is_rejected() {
        let error = parse_csv("name,email\nann,ann@example.com\n").unwrap_err();
        assert!(matches!(error, DbKitError::Csv { line: 1, .. }));
        assert!(error.to_string().contains("missing required column age"));
    }

    #[test]
    fn bad_age_reports_line_number() {
        let error = parse_csv("name,email,age\nann,ann@example.com,old\n").unwrap_err();
        assert!(matches!(error, DbKitError::Csv { line: 2, .. }));
    }

    #[test]
    fn unterminated_quote_swallows_the_row() {
        let error = parse_csv("name,email,age\n\"ann,ann@example.com,3\n").unwrap_err();
        assert!(matches!(error, DbKitError::Csv { line: 2, .. }));
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(parse_csv("  \n").is_err());
        assert!(parse_csv("").is_err());
    }
}
