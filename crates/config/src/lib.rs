use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "messaging.toml",
    "config/messaging.toml",
    "crates/config/messaging.toml",
    "../messaging.toml",
    "../config/messaging.toml",
    "../crates/config/messaging.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl AppConfig {
    /// Reject combinations the services cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must not be empty");
        }
        if self.auth.access_token_ttl_seconds <= 0 || self.auth.refresh_token_ttl_seconds <= 0 {
            bail!("auth token lifetimes must be positive");
        }

        let rate_limit = &self.middleware.rate_limit;
        if rate_limit.enabled && (rate_limit.max_requests == 0 || rate_limit.window_seconds == 0) {
            bail!("middleware.rate_limit needs a non-zero window and request budget");
        }

        let window = &self.middleware.access_window;
        if window.start_hour > 23 || window.end_hour > 24 || window.start_hour > window.end_hour {
            bail!(
                "middleware.access_window hours are invalid ({}..{})",
                window.start_hour,
                window.end_hour
            );
        }

        if self.pagination.default_page_size == 0 || self.pagination.max_page_size == 0 {
            bail!("pagination page sizes must be positive");
        }
        if self.pagination.default_page_size > self.pagination.max_page_size {
            bail!("pagination.default_page_size exceeds pagination.max_page_size");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://messaging.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Token signing and lifetime settings.
///
/// ```
/// use messaging_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.access_token_ttl_seconds, 300);
/// assert_eq!(auth.refresh_token_ttl_seconds, 86_400);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            issuer: "messaging-backend".to_string(),
            access_token_ttl_seconds: 300,
            refresh_token_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub request_logging: bool,
    pub rate_limit: RateLimitConfig,
    pub access_window: AccessWindowConfig,
    pub staff_paths: Vec<String>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_logging: true,
            rate_limit: RateLimitConfig::default(),
            access_window: AccessWindowConfig::default(),
            staff_paths: vec!["/api/admin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 5,
            window_seconds: 60,
        }
    }
}

/// Hours (UTC) during which the API accepts requests. `end_hour` is inclusive
/// of the full minute `end_hour:00`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessWindowConfig {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for AccessWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 9,
            end_hour: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use messaging_config::load;
///
/// std::env::remove_var("MESSAGING_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default("auth.issuer", defaults.auth.issuer.clone())?
        .set_default(
            "auth.access_token_ttl_seconds",
            defaults.auth.access_token_ttl_seconds,
        )?
        .set_default(
            "auth.refresh_token_ttl_seconds",
            defaults.auth.refresh_token_ttl_seconds,
        )?
        .set_default(
            "middleware.staff_paths",
            defaults.middleware.staff_paths.clone(),
        )?;

    let environment_overrides = config::Environment::with_prefix("MESSAGING")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("middleware.staff_paths");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("MESSAGING_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via MESSAGING_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    config.validate().context("invalid configuration")?;

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
