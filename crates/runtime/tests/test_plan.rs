use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use messaging_config::AppConfig;
use messaging_runtime::{self, BackendServices};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = initialise(&config).await?;
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'messages', 'token_blacklist') ORDER BY name",
    )
    .fetch_all(&services.db_pool)
    .await?;

    assert_eq!(tables, vec!["messages", "token_blacklist", "users"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_purges_expired_blacklist_entries() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/purge.db");
    let config = build_config(sqlite_url(&db_path), 2);

    let services = initialise(&config).await?;
    sqlx::query(
        "INSERT INTO users (public_id, email, password_hash, created_at, updated_at) VALUES ('u1', 'a@example.com', 'x', '2000-01-01', '2000-01-01')",
    )
    .execute(&services.db_pool)
    .await?;
    sqlx::query(
        "INSERT INTO token_blacklist (jti, user_id, expires_at, blacklisted_at) VALUES ('old', 1, '2000-01-01T00:00:00+00:00', '2000-01-01T00:00:00+00:00')",
    )
    .execute(&services.db_pool)
    .await?;
    drop(services);

    let services = initialise(&config).await?;
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_blacklist")
        .fetch_one(&services.db_pool)
        .await?;
    assert_eq!(remaining, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn blacklist_janitor_purges_periodically() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/janitor.db");
    let config = build_config(sqlite_url(&db_path), 2);

    let services = initialise(&config).await?;
    sqlx::query(
        "INSERT INTO users (public_id, email, password_hash, created_at, updated_at) VALUES ('u1', 'a@example.com', 'x', '2000-01-01', '2000-01-01')",
    )
    .execute(&services.db_pool)
    .await?;
    sqlx::query(
        "INSERT INTO token_blacklist (jti, user_id, expires_at, blacklisted_at) VALUES ('stale', 1, '2000-01-01T00:00:00+00:00', '2000-01-01T00:00:00+00:00'), ('live', 1, '2999-01-01T00:00:00+00:00', '2000-01-01T00:00:00+00:00')",
    )
    .execute(&services.db_pool)
    .await?;

    let janitor = services.spawn_blacklist_janitor(Duration::from_millis(25));
    sleep(Duration::from_millis(250)).await;
    janitor.abort();

    let remaining: Vec<String> = sqlx::query_scalar("SELECT jti FROM token_blacklist")
        .fetch_all(&services.db_pool)
        .await?;
    assert_eq!(remaining, vec!["live"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_database_creates_sqlite_directory_if_missing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_dir = temp_dir.path().join("nested");
    let db_path = db_dir.join("prepared.db");
    let config = build_config(sqlite_url(&db_path), 2);

    assert!(!db_dir.exists());

    let services = initialise(&config).await?;
    assert!(db_dir.exists(), "database directory should be created");
    assert!(db_path.exists(), "sqlite database file should be created");
    drop(services);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_database_enables_sqlite_foreign_keys() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/foreign_keys.db");
    let config = build_config(sqlite_url(&db_path), 2);

    let services = initialise(&config).await?;

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&services.db_pool)
        .await?;
    assert_eq!(1, enabled, "foreign key enforcement must be enabled");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_database_applies_max_connections_setting() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/max_conn.db");
    let max_connections = 3;
    let config = build_config(sqlite_url(&db_path), max_connections);

    let services = initialise(&config).await?;
    assert_eq!(
        max_connections,
        services.db_pool.options().get_max_connections()
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_database_uses_a_single_connection() -> Result<()> {
    let config = build_config("sqlite://:memory:".into(), 8);
    let services = initialise(&config).await?;

    assert_eq!(1, services.db_pool.options().get_max_connections());

    let databases = sqlx::query("PRAGMA database_list")
        .fetch_all(&services.db_pool)
        .await?;
    let main_db = databases
        .into_iter()
        .find(|row| {
            row.try_get::<String, _>("name")
                .map(|name| name == "main")
                .unwrap_or(false)
        })
        .context("expected main in PRAGMA database_list")?;
    let file: String = main_db.try_get("file")?;
    assert!(
        file.is_empty(),
        "in-memory sqlite database should not create filesystem entries"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn non_sqlite_urls_are_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let target_dir = temp_dir.path().join("should_not_exist");
    let malformed_url = format!("postgres://{}/ignored.db", target_dir.to_string_lossy());
    let config = build_config(malformed_url, 1);

    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected sqlite connection to fail for non-sqlite URL"),
        Err(error) => error,
    };
    assert!(
        !target_dir.exists(),
        "non-sqlite URLs must not create filesystem structures"
    );
    assert!(
        format!("{error:#}").contains("invalid sqlite url"),
        "expected url rejection, got {error:#}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn run_migrations_propagates_failures() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("conflicting.db");

    // a pre-existing messages table without the indexed columns breaks the schema migration
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    sqlx::query("CREATE TABLE messages (id INTEGER PRIMARY KEY)")
        .execute(&pool)
        .await?;
    pool.close().await;

    let config = build_config(sqlite_url(&db_path), 1);
    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected migrations to fail on a conflicting schema"),
        Err(error) => error,
    };
    let rendered = format!("{error:#}");
    assert!(
        rendered.contains("failed to initialise database"),
        "database errors should propagate with context, got {rendered}"
    );
    assert!(
        rendered.contains("database migrations failed"),
        "migration errors should be named, got {rendered}"
    );
    Ok(())
}

#[test]
fn telemetry_init_tracing_sets_global_subscriber() {
    messaging_runtime::telemetry::init_tracing().expect("first initialisation should succeed");

    let second = messaging_runtime::telemetry::init_tracing();
    assert!(
        second.is_err(),
        "initialising telemetry twice should fail with global subscriber already set"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(not(unix), ignore = "requires Unix signal handling")]
async fn shutdown_signal_completes_on_ctrl_c_notification() -> Result<()> {
    let shutdown_task = tokio::spawn(async { messaging_runtime::shutdown_signal().await });

    sleep(Duration::from_millis(50)).await;
    #[cfg(unix)]
    unsafe {
        libc::raise(libc::SIGINT);
    }

    timeout(Duration::from_secs(2), shutdown_task).await??;
    Ok(())
}
