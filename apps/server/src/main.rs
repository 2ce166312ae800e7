use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::{StreamExt, TryStreamExt};
use messaging_api::{build_router, AppState};
use messaging_config::{load as load_config, AppConfig};
use messaging_database::{prepare_database, UserRepository};
use messaging_dbkit::{
    batch_processing, cache_query, calculate_average_age, ensure_user_data_table,
    fetch_all_users, fetch_concurrently, lazy_paginate, log_query, retry_on_failure,
    seed_from_csv, stream_users, user_query_cache, DatabaseConnection, ExecuteQuery, QueryOutcome,
    RetryPolicy, UserRecord, USER_COLUMNS,
};
use messaging_runtime::{telemetry, BackendServices};
use sqlx::{Column, Row, SqlitePool, ValueRef};
use tokio::net::TcpListener;
use tracing::info;

const BLACKLIST_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser)]
#[command(name = "messaging-server")]
#[command(about = "Messaging backend (serves HTTP by default)")]
struct Cli {
    /// Override the configured database url
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Import users from a CSV file into user_data
    Seed {
        #[arg(default_value = "user_data.csv")]
        csv: PathBuf,
    },
    /// Print users one row at a time
    StreamUsers {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print users older than 25, fetched in batches
    Batches {
        #[arg(long, default_value_t = 50)]
        size: usize,
    },
    /// Walk user_data page by page
    Paginate {
        #[arg(long, default_value_t = 100)]
        page_size: usize,
    },
    /// List users through the retrying, cached query path
    ListUsers,
    /// Print the average user age
    AverageAge,
    /// Fetch all users and users older than 40 concurrently
    Concurrent,
    /// Run one parameterised SQL statement
    Query {
        sql: String,
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Grant or revoke staff access for an account
    PromoteStaff {
        email: String,
        #[arg(long)]
        revoke: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Seed { csv } => seed(&config, csv).await,
        Commands::StreamUsers { limit } => print_stream(&config, limit).await,
        Commands::Batches { size } => print_batches(&config, size).await,
        Commands::Paginate { page_size } => print_pages(&config, page_size).await,
        Commands::ListUsers => list_users(&config).await,
        Commands::AverageAge => average_age(&config).await,
        Commands::Concurrent => concurrent(&config).await,
        Commands::Query { sql, params } => run_query(&config, sql, params).await,
        Commands::PromoteStaff { email, revoke } => promote_staff(config, &email, !revoke).await,
    }
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting messaging backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let janitor = services.spawn_blacklist_janitor(BLACKLIST_PURGE_INTERVAL);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let state = AppState::new(
        services.db_pool.clone(),
        services.authenticator.clone(),
        config,
    );
    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(messaging_runtime::shutdown_signal())
    .await
    .context("http server error")?;

    janitor.abort();
    info!("backend shut down");
    Ok(())
}

async fn user_data_pool(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    let pool = prepare_database(&config.database).await?;
    ensure_user_data_table(&pool)
        .await
        .context("failed to create user_data table")?;
    Ok(pool)
}

fn print_user_header() {
    println!("{:<38} {:<25} {:<35} {:>6}", "User ID", "Name", "Email", "Age");
    println!("{}", "-".repeat(107));
}

fn print_user(user: &UserRecord) {
    println!(
        "{:<38} {:<25} {:<35} {:>6.1}",
        user.user_id, user.name, user.email, user.age
    );
}

async fn seed(config: &AppConfig, csv: PathBuf) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;
    let report = seed_from_csv(&pool, &csv)
        .await
        .with_context(|| format!("failed to seed from {}", csv.display()))?;

    println!(
        "Seeded user_data from {}: {} inserted, {} skipped",
        csv.display(),
        report.inserted,
        report.skipped
    );
    Ok(())
}

async fn print_stream(config: &AppConfig, limit: Option<usize>) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;
    let mut users = stream_users(&pool).take(limit.unwrap_or(usize::MAX));

    print_user_header();
    while let Some(user) = users.next().await {
        print_user(&user.context("failed to read user row")?);
    }
    Ok(())
}

async fn print_batches(config: &AppConfig, size: usize) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;
    let mut batches = batch_processing(&pool, size)?;

    print_user_header();
    while let Some(batch) = batches.try_next().await? {
        batch.iter().for_each(print_user);
    }
    Ok(())
}

async fn print_pages(config: &AppConfig, page_size: usize) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;
    let mut pages = lazy_paginate(&pool, page_size)?;

    let mut number = 0;
    while let Some(page) = pages.try_next().await? {
        number += 1;
        println!("\n=== PAGE {number} ({} users) ===", page.len());
        print_user_header();
        page.iter().for_each(print_user);
    }

    if number == 0 {
        println!("No users found in user_data");
    }
    Ok(())
}

async fn list_users(config: &AppConfig) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;
    let query = format!("SELECT {USER_COLUMNS} FROM user_data ORDER BY rowid");

    let users = cache_query(user_query_cache(), &query, || {
        retry_on_failure(RetryPolicy::default(), || {
            log_query(&query, fetch_all_users(&pool))
        })
    })
    .await?;

    println!("Found {} users:", users.len());
    print_user_header();
    users.iter().for_each(print_user);
    Ok(())
}

async fn average_age(config: &AppConfig) -> anyhow::Result<()> {
    let pool = user_data_pool(config).await?;

    match calculate_average_age(&pool).await? {
        Some(average) => println!("Average age of users: {average:.2}"),
        None => println!("No users found in user_data"),
    }
    Ok(())
}

async fn concurrent(config: &AppConfig) -> anyhow::Result<()> {
    user_data_pool(config).await?.close().await;
    let database = DatabaseConnection::new(&config.database.url)?;

    let fetched = fetch_concurrently(&database).await?;

    println!("=== ALL USERS ({}) ===", fetched.all_users.len());
    print_user_header();
    fetched.all_users.iter().for_each(print_user);

    println!("\n=== USERS OLDER THAN 40 ({}) ===", fetched.older_users.len());
    print_user_header();
    fetched.older_users.iter().for_each(print_user);
    Ok(())
}

async fn run_query(config: &AppConfig, sql: String, params: Vec<String>) -> anyhow::Result<()> {
    user_data_pool(config).await?.close().await;
    let database = DatabaseConnection::new(&config.database.url)?;

    let query = params
        .into_iter()
        .fold(ExecuteQuery::new(&database, sql), |query, param| query.bind(param));

    match query.run().await? {
        QueryOutcome::Rows(rows) => {
            for row in &rows {
                let rendered: Vec<String> = row
                    .columns()
                    .iter()
                    .map(|column| {
                        let name = column.name();
                        let value = render_value(row, column.ordinal());
                        format!("{name}={value}")
                    })
                    .collect();
                println!("{}", rendered.join(" | "));
            }
            println!("{} rows", rows.len());
        }
        QueryOutcome::Affected(count) => println!("{count} rows affected"),
    }
    Ok(())
}

fn render_value(row: &sqlx::sqlite::SqliteRow, index: usize) -> String {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => "NULL".to_string(),
        _ => row
            .try_get::<String, _>(index)
            .or_else(|_| row.try_get::<i64, _>(index).map(|value| value.to_string()))
            .or_else(|_| row.try_get::<f64, _>(index).map(|value| value.to_string()))
            .unwrap_or_else(|_| "<binary>".to_string()),
    }
}

async fn promote_staff(config: AppConfig, email: &str, is_staff: bool) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let users = UserRepository::new(services.db_pool.clone());
    if !users.set_staff(email, is_staff).await? {
        anyhow::bail!("no user with email {email}");
    }

    let verb = if is_staff { "granted to" } else { "revoked from" };
    println!("Staff access {verb} {email}");
    Ok(())
}
