//! Bearer-token sessions.
//!
//! Login issues an opaque UUID token mapped to the user's global ID. Tokens
//! live in memory only, so a restart logs everyone out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use quire_shared::GlobalUserId;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Session entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Session {
    user_id: GlobalUserId,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SessionStore {
    ttl: Duration,
    /// token -> session
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(1)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Issue a new token for `user_id`.
    pub async fn create(&self, user_id: GlobalUserId) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            user_id,
            expires_at: Utc::now() + self.ttl,
        };
        debug!(user_id = %session.user_id, "Session created");
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    /// The user behind a live token.
    pub async fn resolve(&self, token: &str) -> Option<GlobalUserId> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.is_live())
            .map(|s| s.user_id.clone())
    }

    /// Returns `true` if the token existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every session belonging to `user_id`.
    pub async fn revoke_user(&self, user_id: &GlobalUserId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| &s.user_id != user_id);
        before - sessions.len()
    }

    /// Remove expired sessions.
    pub async fn purge_expired(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live());
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
    }
}
