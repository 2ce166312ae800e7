use std::time::Duration;

use anyhow::{Context, Result};
use messaging_auth::Authenticator;
use messaging_config::AppConfig;
use messaging_database::initialize_database;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());

        let purged = authenticator
            .purge_expired_blacklist()
            .await
            .context("failed to purge expired token blacklist entries")?;

        info!(
            database = %config.database.url,
            purged_blacklist_entries = purged,
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
        })
    }

    /// Periodically drop blacklist entries for refresh tokens that have
    /// expired on their own.
    pub fn spawn_blacklist_janitor(&self, every: Duration) -> JoinHandle<()> {
        let authenticator = self.authenticator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                match authenticator.purge_expired_blacklist().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "expired blacklist entries removed"),
                    Err(error) => warn!(%error, "failed to purge token blacklist"),
                }
            }
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
