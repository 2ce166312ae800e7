use std::sync::Arc;

use chrono::{TimeZone, Utc};
use messaging_config::AuthConfig;
use messaging_database::{
    current_timestamp, DatabaseError, NewUser, User, UserCleanup, UserProfileUpdate,
    UserRepository,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

pub mod jwt;
pub mod password;
pub mod validation;

pub use jwt::{Claims, TokenManager, TokenPair, TokenType};

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    users: UserRepository,
    tokens: Arc<TokenManager>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("A user with this email already exists.")]
    UserExists,
    #[error("This email is already in use.")]
    EmailInUse,
    #[error("validation failed")]
    Validation(Vec<String>),
    #[error("Old password is incorrect.")]
    IncorrectPassword,
    #[error("No active account found with the given credentials")]
    InvalidCredentials,
    #[error("User account is disabled.")]
    InactiveAccount,
    #[error("Token is invalid or expired")]
    InvalidToken,
    #[error("Token is invalid or expired")]
    TokenExpired,
    #[error("Token is blacklisted")]
    TokenBlacklisted,
    #[error("token creation failed: {0}")]
    TokenCreation(String),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(error))
    }
}

impl AuthError {
    /// Field-level messages for validation failures.
    pub fn details(&self) -> Option<&[String]> {
        match self {
            AuthError::Validation(details) => Some(details),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let tokens = Arc::new(TokenManager::new(&config));
        let users = UserRepository::new(pool.clone());

        Self {
            pool,
            users,
            tokens,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn register(&self, registration: &Registration) -> Result<(User, TokenPair), AuthError> {
        let email = validation::normalize_email(&registration.email);
        let mut problems = Vec::new();

        if let Err(problem) = validation::validate_email(&email) {
            problems.push(format!("email: {problem}"));
        }
        if registration.password != registration.password_confirm {
            problems.push("password_confirm: Password fields didn't match.".to_string());
        }
        if let Err(password_problems) = validation::validate_password(&registration.password, Some(&email)) {
            problems.extend(password_problems.into_iter().map(|p| format!("password: {p}")));
        }
        if let Err(problem) = validation::validate_name("first_name", &registration.first_name) {
            problems.push(problem);
        }
        if let Err(problem) = validation::validate_name("last_name", &registration.last_name) {
            problems.push(problem);
        }
        if let Some(phone) = registration.phone_number.as_deref().filter(|p| !p.is_empty()) {
            if let Err(problem) = validation::validate_phone_number(phone) {
                problems.push(problem);
            }
        }

        if !problems.is_empty() {
            return Err(AuthError::Validation(problems));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = password::hash_password(&registration.password)?;
        let user = self
            .users
            .create(&NewUser {
                email,
                password_hash,
                first_name: registration.first_name.trim().to_string(),
                last_name: registration.last_name.trim().to_string(),
                phone_number: registration
                    .phone_number
                    .clone()
                    .filter(|phone| !phone.is_empty()),
                is_staff: false,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Duplicate(_) => AuthError::UserExists,
                other => AuthError::Database(other),
            })?;

        let tokens = self.tokens.issue_pair(&user)?;
        info!(user = %user.public_id, "registered new user");
        Ok((user, tokens))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AuthError> {
        let email = validation::normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash)? || !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        self.users.touch_last_login(user.id).await?;
        let tokens = self.tokens.issue_pair(&user)?;

        debug!(user = %user.public_id, "issued token pair");
        Ok((user, tokens))
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.decode(refresh_token, TokenType::Refresh)?;

        if self.is_blacklisted(&claims.jti).await? {
            return Err(AuthError::TokenBlacklisted);
        }

        let user = self.active_user(&claims.sub).await?;
        self.tokens.issue(&user, TokenType::Access)
    }

    /// Blacklist a refresh token. Only the token's owner may revoke it.
    pub async fn logout(&self, user: &User, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.decode(refresh_token, TokenType::Refresh)?;
        if claims.sub != user.public_id {
            return Err(AuthError::InvalidToken);
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .map(|at| at.to_rfc3339())
            .ok_or(AuthError::InvalidToken)?;

        sqlx::query(
            "INSERT OR IGNORE INTO token_blacklist (jti, user_id, expires_at, blacklisted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&claims.jti)
        .bind(user.id)
        .bind(expires_at)
        .bind(current_timestamp())
        .execute(&self.pool)
        .await?;

        info!(user = %user.public_id, "refresh token blacklisted");
        Ok(())
    }

    /// Drop blacklist entries whose tokens have expired anyway.
    pub async fn purge_expired_blacklist(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, Claims), AuthError> {
        let claims = self.tokens.decode(token, TokenType::Access)?;
        let user = self.active_user(&claims.sub).await?;
        Ok((user, claims))
    }

    pub async fn update_profile(
        &self,
        user: &User,
        mut update: UserProfileUpdate,
    ) -> Result<User, AuthError> {
        let mut problems = Vec::new();

        if let Some(email) = update.email.as_mut() {
            *email = validation::normalize_email(email);
            if let Err(problem) = validation::validate_email(email) {
                problems.push(format!("email: {problem}"));
            }
        }
        if let Some(first_name) = update.first_name.as_deref() {
            if let Err(problem) = validation::validate_name("first_name", first_name) {
                problems.push(problem);
            }
        }
        if let Some(last_name) = update.last_name.as_deref() {
            if let Err(problem) = validation::validate_name("last_name", last_name) {
                problems.push(problem);
            }
        }
        if let Some(phone) = update.phone_number.as_deref().filter(|p| !p.is_empty()) {
            if let Err(problem) = validation::validate_phone_number(phone) {
                problems.push(problem);
            }
        }
        if !problems.is_empty() {
            return Err(AuthError::Validation(problems));
        }

        if let Some(email) = update.email.as_deref() {
            if email != user.email {
                if let Some(existing) = self.users.find_by_email(email).await? {
                    if existing.id != user.id {
                        return Err(AuthError::EmailInUse);
                    }
                }
            }
        }

        self.users
            .update_profile(user.id, &update)
            .await
            .map_err(|e| match e {
                DatabaseError::Duplicate(_) => AuthError::EmailInUse,
                other => AuthError::Database(other),
            })
    }

    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<(), AuthError> {
        if !password::verify_password(old_password, &user.password_hash)? {
            return Err(AuthError::IncorrectPassword);
        }

        let mut problems = Vec::new();
        if new_password != new_password_confirm {
            problems.push("new_password_confirm: Password fields didn't match.".to_string());
        }
        if let Err(password_problems) = validation::validate_password(new_password, Some(&user.email)) {
            problems.extend(password_problems.into_iter().map(|p| format!("new_password: {p}")));
        }
        if !problems.is_empty() {
            return Err(AuthError::Validation(problems));
        }

        let password_hash = password::hash_password(new_password)?;
        self.users.set_password(user.id, &password_hash).await?;

        info!(user = %user.public_id, "password changed");
        Ok(())
    }

    pub async fn delete_account(&self, user: &User) -> Result<UserCleanup, AuthError> {
        let cleanup = self.users.delete(user.id).await?;
        info!(user = %user.public_id, "account deleted");
        Ok(cleanup)
    }

    async fn active_user(&self, public_id: &str) -> Result<User, AuthError> {
        match self.users.find_by_public_id(public_id).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(AuthError::InactiveAccount),
            None => Err(AuthError::InvalidToken),
        }
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        let hit: Option<i64> = sqlx::query_scalar("SELECT 1 FROM token_blacklist WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hit.is_some())
    }
}
