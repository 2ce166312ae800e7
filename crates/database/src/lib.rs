//! Messaging Database Crate
//!
//! Connection management, migrations, entities and repositories for the
//! messaging backend. Lifecycle hooks in [`signals`] run inside the
//! repositories' write transactions.

use messaging_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod filters;
pub mod migrations;
pub mod repos;
pub mod signals;
pub mod types;

pub use connection::{connect_options, prepare_database};
pub use migrations::{run_migrations, MIGRATOR};

pub use repos::{
    ConversationRepository, MessageRepository, NotificationRepository, UserRepository,
};

pub use entities::{
    Conversation, ConversationOverview, Message, MessageHistory, MessageOrder, MessageThread,
    NewMessage, NewUser, Notification, User, UserCleanup, UserProfileUpdate,
};

pub use filters::MessageFilter;

pub use types::{current_timestamp, DatabaseError, DatabaseResult, Page, Pagination};

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = initialize_database(&config).await.unwrap();
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 0);
    }
}
