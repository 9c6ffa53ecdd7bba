use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    /// Argon2 hash, never plaintext, not exposed in JSON.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Stored filename of the uploaded profile image, if any.
    pub profile_image: Option<String>,
    /// At most one active password-reset token at a time.
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Fields required to create a user. The password arrives here already
/// hashed; plaintext never reaches the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_image: Option<String>,
}
