use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "authgate_session";

/// Ephemeral per-connection state binding a session id to a user id.
///
/// Injected into the session gate through `AppState` instead of being
/// registered as ambient global state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bind a fresh session to the user and return its id.
    async fn insert(&self, user_id: Uuid) -> Uuid;
    /// Resolve a session id to the authenticated user id, if any.
    async fn get(&self, session_id: Uuid) -> Option<Uuid>;
    async fn remove(&self, session_id: Uuid);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<Uuid, Uuid>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, user_id: Uuid) -> Uuid {
        let session_id = Uuid::new_v4();
        self.inner.write().await.insert(session_id, user_id);
        session_id
    }

    async fn get(&self, session_id: Uuid) -> Option<Uuid> {
        self.inner.read().await.get(&session_id).copied()
    }

    async fn remove(&self, session_id: Uuid) {
        self.inner.write().await.remove(&session_id);
    }
}
