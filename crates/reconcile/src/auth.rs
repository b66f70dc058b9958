//! Session resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ledger::Caller;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::UserId;

/// Maps a session token to the user it was issued to.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Returns the user for a live session, or `None`.
    async fn resolve(&self, token: &str) -> Option<UserId>;

    /// Resolves an optional token into a ledger caller.
    async fn caller(&self, token: Option<&str>) -> Caller {
        match token {
            Some(token) => Caller::from(self.resolve(token).await),
            None => Caller::Anonymous,
        }
    }
}

/// In-memory session table.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessions {
    sessions: Arc<RwLock<HashMap<String, UserId>>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh opaque token for a user.
    pub async fn issue(&self, user_id: UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.insert(token.clone(), user_id).await;
        token
    }

    /// Registers a known token.
    pub async fn insert(&self, token: impl Into<String>, user_id: UserId) {
        self.sessions.write().await.insert(token.into(), user_id);
    }

    /// Ends a session. Returns true if it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

#[async_trait]
impl SessionResolver for InMemorySessions {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions.read().await.get(token).copied()
    }
}
