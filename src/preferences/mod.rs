//! Per-user notification switches and where they live.
//!
//! The preference object is a flat map of boolean switches. It is owned by a
//! [`PreferenceStore`] that is injected into whatever needs it; consumers
//! either `load` once or hold a `watch` receiver that sees every save made
//! anywhere (another tab, another device).

mod redis_store;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, watch};

use crate::models::NotificationKind;

pub use redis_store::RedisPreferenceStore;

pub const PUSH_NOTIFICATIONS: &str = "pushNotifications";
pub const MENTORSHIP_REQUESTS: &str = "mentorshipRequests";
pub const MESSAGES: &str = "messages";
pub const LIKES_AND_COMMENTS: &str = "likesAndComments";

#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("preference store unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed preferences: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences(BTreeMap<String, bool>);

impl NotificationPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, enabled: bool) -> Self {
        self.set(key, enabled);
        self
    }

    pub fn set(&mut self, key: &str, enabled: bool) {
        self.0.insert(key.to_string(), enabled);
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    /// Applies every switch present in `changes`, leaving the others alone.
    pub fn merge(&mut self, changes: &NotificationPreferences) {
        for (key, enabled) in &changes.0 {
            self.0.insert(key.clone(), *enabled);
        }
    }

    /// Master switch; unset counts as on.
    pub fn push_enabled(&self) -> bool {
        self.get(PUSH_NOTIFICATIONS).unwrap_or(true)
    }

    pub fn switch_for(kind: &NotificationKind) -> Option<&'static str> {
        match kind {
            NotificationKind::MentorshipRequest | NotificationKind::MentorshipResponse => {
                Some(MENTORSHIP_REQUESTS)
            }
            NotificationKind::Message => Some(MESSAGES),
            NotificationKind::ForumReaction => Some(LIKES_AND_COMMENTS),
            NotificationKind::Other(_) => None,
        }
    }

    /// Whether a notification of `kind` is shown. Categories without a
    /// switch, or whose switch is unset, are shown.
    pub fn allows(&self, kind: &NotificationKind) -> bool {
        if !self.push_enabled() {
            return false;
        }
        Self::switch_for(kind)
            .and_then(|key| self.get(key))
            .unwrap_or(true)
    }
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<NotificationPreferences, PreferenceError>;

    async fn save(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferenceError>;

    /// Current preferences plus every later save.
    async fn watch(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<NotificationPreferences>, PreferenceError>;
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    users: Mutex<HashMap<String, watch::Sender<NotificationPreferences>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, user_id: &str) -> Result<NotificationPreferences, PreferenceError> {
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferenceError> {
        let mut users = self.users.lock().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(NotificationPreferences::default()).0)
            .send_replace(preferences.clone());
        Ok(())
    }

    async fn watch(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<NotificationPreferences>, PreferenceError> {
        let mut users = self.users.lock().await;
        Ok(users
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(NotificationPreferences::default()).0)
            .subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_is_shown() {
        let prefs = NotificationPreferences::new()
            .with(PUSH_NOTIFICATIONS, true)
            .with(MENTORSHIP_REQUESTS, false);

        assert!(prefs.allows(&NotificationKind::Other("event-reminder".into())));
        assert!(!prefs.allows(&NotificationKind::MentorshipRequest));
        assert!(!prefs.allows(&NotificationKind::MentorshipResponse));
        assert!(prefs.allows(&NotificationKind::ForumReaction));
    }

    #[test]
    fn test_master_switch_hides_everything() {
        let prefs = NotificationPreferences::new()
            .with(PUSH_NOTIFICATIONS, false)
            .with(MESSAGES, true)
            .with(LIKES_AND_COMMENTS, true);

        assert!(!prefs.allows(&NotificationKind::Message));
        assert!(!prefs.allows(&NotificationKind::ForumReaction));
        assert!(!prefs.allows(&NotificationKind::Other("anything".into())));
    }

    #[test]
    fn test_empty_preferences_show_everything() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.push_enabled());
        assert!(prefs.allows(&NotificationKind::Message));
    }

    #[test]
    fn test_merge_keeps_untouched_switches() {
        let mut prefs = NotificationPreferences::new()
            .with(MESSAGES, false)
            .with(LIKES_AND_COMMENTS, false);
        prefs.merge(&NotificationPreferences::new().with(MESSAGES, true));

        assert_eq!(prefs.get(MESSAGES), Some(true));
        assert_eq!(prefs.get(LIKES_AND_COMMENTS), Some(false));
    }

    #[tokio::test]
    async fn test_watchers_see_saves_from_elsewhere() {
        let store = MemoryPreferenceStore::new();
        let mut watcher = store.watch("u1").await.unwrap();
        assert!(watcher.borrow().push_enabled());

        store
            .save("u1", &NotificationPreferences::new().with(PUSH_NOTIFICATIONS, false))
            .await
            .unwrap();

        watcher.changed().await.unwrap();
        assert!(!watcher.borrow().push_enabled());
        assert!(!store.load("u1").await.unwrap().push_enabled());
    }
}
