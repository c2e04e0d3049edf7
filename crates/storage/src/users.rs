use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use handy_core::types::{UnknownVariant, User, UserRole, UserStatus};

use crate::{is_unique_violation, to_rfc3339};

const USER_COLUMNS: &str = "id, email, password_hash, full_name, user_type, status, student_id, \
     postal_code, description, avatar_url, created_at, updated_at";

/// Repository for user accounts.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new account. Emails are unique case-insensitively.
    pub async fn insert(&self, user: &NewUser<'_>) -> Result<User, UserError> {
        let now = to_rfc3339(user.created_at);
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users \
             (email, password_hash, full_name, user_type, status, student_id, postal_code, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'active', ?, ?, ?, ?) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.full_name)
        .bind(user.role.as_str())
        .bind(user.student_id)
        .bind(user.postal_code)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                UserError::DuplicateEmail
            } else {
                UserError::Database(err)
            }
        })?;

        row.into_domain()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    /// Lists every account, newest first.
    pub async fn list_all(&self) -> Result<Vec<User>, UserError> {
        self.list_recent(None).await
    }

    /// Lists the `limit` most recently created accounts.
    pub async fn recent(&self, limit: u32) -> Result<Vec<User>, UserError> {
        self.list_recent(Some(limit)).await
    }

    async fn list_recent(&self, limit: Option<u32>) -> Result<Vec<User>, UserError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_domain).collect()
    }

    pub async fn count(&self) -> Result<i64, UserError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Applies the provided profile fields, leaving absent ones untouched.
    pub async fn update_profile(
        &self,
        id: i64,
        update: &ProfileUpdate<'_>,
    ) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users \
             SET full_name = COALESCE(?, full_name), \
                 description = COALESCE(?, description), \
                 postal_code = COALESCE(?, postal_code), \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(update.full_name)
        .bind(update.description)
        .bind(update.postal_code)
        .bind(to_rfc3339(update.updated_at))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    pub async fn set_status(
        &self,
        id: i64,
        status: UserStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET status = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }

    /// Creates the admin account or resets an existing account with that email to an active admin.
    pub async fn upsert_admin(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, UserError> {
        let now = to_rfc3339(now);
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users \
             (email, password_hash, full_name, user_type, status, created_at, updated_at) \
             VALUES (?, ?, ?, 'admin', 'active', ?, ?) \
             ON CONFLICT(email) DO UPDATE \
             SET password_hash = excluded.password_hash, \
                 user_type = 'admin', \
                 status = 'active', \
                 updated_at = excluded.updated_at \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }
}

/// Data required to create an account.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: UserRole,
    pub student_id: Option<&'a str>,
    pub postal_code: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update; `None` keeps the stored value.
pub struct ProfileUpdate<'a> {
    pub full_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub postal_code: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

/// Errors that can occur while reading or writing accounts.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error("stored user row is invalid: {0}")]
    Decode(#[from] UnknownVariant),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    full_name: String,
    user_type: String,
    status: String,
    student_id: Option<String>,
    postal_code: Option<String>,
    description: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> Result<User, UserError> {
        Ok(User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            full_name: self.full_name,
            role: self.user_type.parse()?,
            status: self.status.parse()?,
            student_id: self.student_id,
            postal_code: self.postal_code,
            description: self.description,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
