use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use handy_core::types::User;
use handy_storage::{Database, UserError};
use handy_util::AdminSeed;

use crate::auth::{PasswordError, PasswordHasher};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to hash admin password: {0}")]
    Password(#[from] PasswordError),
    #[error("failed to store admin account: {0}")]
    Storage(#[from] UserError),
}

/// Makes sure the configured admin account exists, is active and uses the configured password.
pub async fn ensure_admin(
    database: &Database,
    passwords: &PasswordHasher,
    seed: &AdminSeed,
    now: DateTime<Utc>,
) -> Result<User, SeedError> {
    let hash = passwords.hash(&seed.password).await?;
    let admin = database
        .users()
        .upsert_admin(seed.email.trim(), &hash, seed.full_name.trim(), now)
        .await?;
    info!(stage = "seed", user_id = admin.id, email = %admin.email, "admin account ensured");
    Ok(admin)
}
