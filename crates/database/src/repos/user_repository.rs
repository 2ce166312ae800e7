//! Repository for user accounts.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::entities::{NewUser, User, UserCleanup, UserProfileUpdate};
use crate::signals;
use crate::types::{current_timestamp, DatabaseError, DatabaseResult, Page, Pagination};

const USER_COLUMNS: &str = "id, public_id, email, first_name, last_name, phone_number, \
     password_hash, is_staff, is_active, created_at, updated_at, last_login";

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        let public_id = Uuid::new_v4().to_string();
        let now = current_timestamp();

        let result = sqlx::query(
            "INSERT INTO users (public_id, email, first_name, last_name, phone_number, password_hash, is_staff, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?)",
        )
        .bind(&public_id)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.phone_number)
        .bind(&new_user.password_hash)
        .bind(new_user.is_staff)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::Duplicate(_) => {
                DatabaseError::Duplicate(format!("user with email {}", new_user.email))
            }
            other => other,
        })?;

        let id = result.last_insert_rowid();
        info!(user_id = id, public_id = %public_id, "created new user");

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::InternalError("created user vanished".to_string()))
    }

    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Resolve either a public id or an email address.
    pub async fn find_by_identifier(&self, identifier: &str) -> DatabaseResult<Option<User>> {
        if identifier.contains('@') {
            self.find_by_email(identifier).await
        } else {
            self.find_by_public_id(identifier).await
        }
    }

    pub async fn update_profile(&self, id: i64, update: &UserProfileUpdate) -> DatabaseResult<User> {
        if !update.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE users SET updated_at = ");
            qb.push_bind(current_timestamp());
            if let Some(email) = &update.email {
                qb.push(", email = ").push_bind(email);
            }
            if let Some(first_name) = &update.first_name {
                qb.push(", first_name = ").push_bind(first_name);
            }
            if let Some(last_name) = &update.last_name {
                qb.push(", last_name = ").push_bind(last_name);
            }
            if let Some(phone_number) = &update.phone_number {
                let phone_number = (!phone_number.is_empty()).then(|| phone_number.clone());
                qb.push(", phone_number = ").push_bind(phone_number);
            }
            qb.push(" WHERE id = ").push_bind(id);

            let result = qb.build().execute(&self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(DatabaseError::NotFound(format!("user {id}")));
            }
            info!(user_id = id, "updated user profile");
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {id}")))
    }

    pub async fn set_password(&self, id: i64, password_hash: &str) -> DatabaseResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(current_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    pub async fn touch_last_login(&self, id: i64) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(current_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Grant or revoke staff rights. Returns `false` when no user matched.
    pub async fn set_staff(&self, email: &str, is_staff: bool) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_staff = ?, updated_at = ? WHERE email = ? COLLATE NOCASE",
        )
        .bind(is_staff)
        .bind(current_timestamp())
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(email, is_staff, "changed staff flag");
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self, pagination: Pagination) -> DatabaseResult<Page<User>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"
        ))
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page { items, total })
    }

    /// Delete a user after running the pre-delete cleanup in the same
    /// transaction.
    pub async fn delete(&self, id: i64) -> DatabaseResult<UserCleanup> {
        let mut tx = self.pool.begin().await?;

        let cleanup = signals::on_user_pre_delete(&mut tx, id).await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }

        tx.commit().await?;
        info!(user_id = id, "deleted user");
        Ok(cleanup)
    }
}
