use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::error::AuthError;

/// Persistence contract for user records. Lookup misses are `Ok(None)`,
/// never errors.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Unique violations surface as `DuplicateField` naming the column.
    async fn create(&self, fields: NewUser) -> Result<User, AuthError>;

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), AuthError>;

    /// Overwrites any prior token; at most one active token per user.
    async fn set_reset_token(&self, id: Uuid, token: &str) -> Result<(), AuthError>;

    /// Clears a dangling token wherever it is stored (expired/invalid path).
    async fn clear_reset_token_by_value(&self, token: &str) -> Result<(), AuthError>;

    /// Atomic "find user where reset_token == token AND clear it".
    /// Returns `None` if the token was already consumed or never stored.
    async fn consume_reset_token(&self, token: &str) -> Result<Option<User>, AuthError>;
}

const USER_COLUMNS: &str =
    "id, name, username, email, password_hash, profile_image, reset_token, created_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn create(&self, fields: NewUser) -> Result<User, AuthError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, username, email, password_hash, profile_image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&fields.name)
        .bind(&fields.username)
        .bind(&fields.email)
        .bind(&fields.password_hash)
        .bind(&fields.profile_image)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                let field = match e.constraint() {
                    Some(c) if c.contains("username") => "username",
                    _ => "email",
                };
                Err(AuthError::DuplicateField(field))
            }
            Err(e) => Err(anyhow::Error::from(e).into()),
        }
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(new_hash)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, token: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET reset_token = $1 WHERE id = $2")
            .bind(token)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn clear_reset_token_by_value(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET reset_token = NULL WHERE reset_token = $1")
            .bind(token)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn consume_reset_token(&self, token: &str) -> Result<Option<User>, AuthError> {
        // Single conditional update so concurrent resets with the same token
        // cannot both succeed.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET reset_token = NULL
            WHERE reset_token = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }
}

/// In-memory store used by `AppState::fake()` and the service tests.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let users = self.inner.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.inner.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn create(&self, fields: NewUser) -> Result<User, AuthError> {
        let mut users = self.inner.write().await;
        if users.values().any(|u| u.username == fields.username) {
            return Err(AuthError::DuplicateField("username"));
        }
        if users.values().any(|u| u.email == fields.email) {
            return Err(AuthError::DuplicateField("email"));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: fields.name,
            username: fields.username,
            email: fields.email,
            password_hash: fields.password_hash,
            profile_image: fields.profile_image,
            reset_token: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), AuthError> {
        if let Some(user) = self.inner.write().await.get_mut(&id) {
            user.password_hash = new_hash.to_string();
        }
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, token: &str) -> Result<(), AuthError> {
        if let Some(user) = self.inner.write().await.get_mut(&id) {
            user.reset_token = Some(token.to_string());
        }
        Ok(())
    }

    async fn clear_reset_token_by_value(&self, token: &str) -> Result<(), AuthError> {
        let mut users = self.inner.write().await;
        for user in users.values_mut() {
            if user.reset_token.as_deref() == Some(token) {
                user.reset_token = None;
            }
        }
        Ok(())
    }

    async fn consume_reset_token(&self, token: &str) -> Result<Option<User>, AuthError> {
        let mut users = self.inner.write().await;
        let matched = users
            .values_mut()
            .find(|u| u.reset_token.as_deref() == Some(token));
        Ok(matched.map(|user| {
            user.reset_token = None;
            user.clone()
        }))
    }
}
