//! Pending uploads keyed by user context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// An upload waiting for a pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// Staged copy of the document
    pub staged_path: PathBuf,
    /// Name as uploaded by the user
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingUpload {
    /// Expiry saturates at the latest representable time.
    pub fn new(staged_path: PathBuf, display_name: &str, ttl: Duration) -> Self {
        Self {
            staged_path,
            display_name: display_name.to_string(),
            expires_at: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// At most one pending upload per user; the latest attempt wins.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, PendingUpload>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, user: &str) -> Option<PendingUpload> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(user).cloned()
    }

    /// Record a pending upload, returning the one it replaced.
    pub fn insert(&self, user: &str, pending: PendingUpload) -> Option<PendingUpload> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(user.to_string(), pending)
    }

    pub fn remove(&self, user: &str) -> Option<PendingUpload> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(user)
    }

    /// Remove the user's upload only if it is still the one staged at `staged_path`.
    pub fn remove_if(&self, user: &str, staged_path: &Path) -> Option<PendingUpload> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get(user) {
            Some(pending) if pending.staged_path == staged_path => sessions.remove(user),
            _ => None,
        }
    }

    /// Drop expired sessions and hand them back for cleanup.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Vec<PendingUpload> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, p)| p.is_expired(now))
            .map(|(user, _)| user.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|user| sessions.remove(&user))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
