//! The unread badge: unread conversations plus visible unread notifications.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{Backend, Query};
use crate::error::AppError;
use crate::models::{Chat, Notification, collections};
use crate::preferences::{NotificationPreferences, PreferenceStore};

/// Counterparts with at least one unread conversation. Duplicate chats with
/// the same counterpart count once.
pub fn unread_chat_count(user_id: &str, chats: &[Chat]) -> usize {
    chats
        .iter()
        .filter(|chat| chat.is_unread_for(user_id))
        .filter_map(|chat| chat.counterpart(user_id))
        .collect::<HashSet<_>>()
        .len()
}

pub fn visible_notification_count(
    user_id: &str,
    notifications: &[Notification],
    preferences: &NotificationPreferences,
) -> usize {
    notifications
        .iter()
        .filter(|n| n.recipient_id == user_id && !n.read && preferences.allows(&n.kind))
        .count()
}

/// Latest known inputs for one signed-in user. Either source may still be
/// missing; a missing source contributes nothing.
#[derive(Debug, Clone)]
pub struct BadgeState {
    pub user_id: String,
    pub chats: Option<Vec<Chat>>,
    pub notifications: Option<Vec<Notification>>,
    pub preferences: NotificationPreferences,
}

impl BadgeState {
    pub fn new(user_id: &str, preferences: NotificationPreferences) -> Self {
        Self {
            user_id: user_id.to_string(),
            chats: None,
            notifications: None,
            preferences,
        }
    }

    pub fn count(&self) -> u32 {
        let chats = self
            .chats
            .as_deref()
            .map(|chats| unread_chat_count(&self.user_id, chats))
            .unwrap_or(0);
        let notifications = self
            .notifications
            .as_deref()
            .map(|n| visible_notification_count(&self.user_id, n, &self.preferences))
            .unwrap_or(0);
        u32::try_from(chats + notifications).unwrap_or(u32::MAX)
    }
}

fn chats_query(user_id: &str) -> Query {
    Query::collection(collections::CHATS).array_contains("participants", user_id)
}

fn unread_notifications_query(user_id: &str) -> Query {
    Query::collection(collections::NOTIFICATIONS)
        .where_eq("recipientId", user_id)
        .where_eq("read", false)
}

/// One-shot evaluation for request/response callers.
pub async fn current_badge(
    backend: &dyn Backend,
    preferences: &dyn PreferenceStore,
    user_id: &str,
) -> Result<u32, AppError> {
    let mut state = BadgeState::new(user_id, preferences.load(user_id).await?);
    state.chats = Some(backend.query_as(&chats_query(user_id)).await?);
    state.notifications = Some(backend.query_as(&unread_notifications_query(user_id)).await?);
    Ok(state.count())
}

enum SessionEnd {
    Changed,
    Closed,
}

/// Live badge for whoever is signed in on `session`. Reads 0 whenever nobody
/// is signed in and restarts from 0 on every user switch.
pub struct UnreadBadge {
    count: watch::Receiver<u32>,
    task: JoinHandle<()>,
}

impl UnreadBadge {
    pub fn spawn(
        backend: Arc<dyn Backend>,
        preferences: Arc<dyn PreferenceStore>,
        mut session: watch::Receiver<Option<String>>,
    ) -> Self {
        let (sender, count) = watch::channel(0);

        let task = tokio::spawn(async move {
            loop {
                let user = session.borrow_and_update().clone();
                sender.send_replace(0);

                let end = match user {
                    None => match session.changed().await {
                        Ok(()) => SessionEnd::Changed,
                        Err(_) => SessionEnd::Closed,
                    },
                    Some(user_id) => {
                        match track_user(
                            backend.as_ref(),
                            preferences.as_ref(),
                            &user_id,
                            &sender,
                            &mut session,
                        )
                        .await
                        {
                            Ok(end) => end,
                            Err(e) => {
                                tracing::error!("Unread badge for {} unavailable: {}", user_id, e);
                                match session.changed().await {
                                    Ok(()) => SessionEnd::Changed,
                                    Err(_) => SessionEnd::Closed,
                                }
                            }
                        }
                    }
                };

                if let SessionEnd::Closed = end {
                    sender.send_replace(0);
                    break;
                }
            }
        });

        Self { count, task }
    }

    pub fn count(&self) -> u32 {
        *self.count.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.count.clone()
    }
}

impl Drop for UnreadBadge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn track_user(
    backend: &dyn Backend,
    preferences: &dyn PreferenceStore,
    user_id: &str,
    sender: &watch::Sender<u32>,
    session: &mut watch::Receiver<Option<String>>,
) -> Result<SessionEnd, AppError> {
    let mut chats = backend.subscribe_as::<Chat>(chats_query(user_id)).await?;
    let mut notifications = backend
        .subscribe_as::<Notification>(unread_notifications_query(user_id))
        .await?;
    let mut prefs = preferences.watch(user_id).await?;

    let mut state = BadgeState::new(user_id, prefs.borrow_and_update().clone());
    let (mut chats_open, mut notifications_open, mut prefs_open) = (true, true, true);

    loop {
        tokio::select! {
            biased;
            changed = session.changed() => {
                return Ok(match changed {
                    Ok(()) => SessionEnd::Changed,
                    Err(_) => SessionEnd::Closed,
                });
            }
            snapshot = chats.next(), if chats_open => match snapshot {
                Some(snapshot) => state.chats = Some(snapshot),
                None => chats_open = false,
            },
            snapshot = notifications.next(), if notifications_open => match snapshot {
                Some(snapshot) => state.notifications = Some(snapshot),
                None => notifications_open = false,
            },
            changed = prefs.changed(), if prefs_open => match changed {
                Ok(()) => state.preferences = prefs.borrow_and_update().clone(),
                Err(_) => prefs_open = false,
            },
        }

        // A pending sign-out or switch wins over an update for the old user.
        if session.has_changed().unwrap_or(true) {
            continue;
        }
        sender.send_replace(state.count());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::backend::{MemoryBackend, encode};
    use crate::models::NotificationKind;
    use crate::preferences::{
        LIKES_AND_COMMENTS, MENTORSHIP_REQUESTS, MemoryPreferenceStore, PUSH_NOTIFICATIONS,
    };
    use crate::session::Session;

    fn chat(id: &str, me: &str, other: &str, sender: &str, read: bool) -> Chat {
        Chat {
            id: id.into(),
            participants: vec![me.into(), other.into()],
            last_message_sender_id: Some(sender.into()),
            last_message_read: read,
            last_message_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    fn notification(kind: NotificationKind) -> Notification {
        Notification::new("me", "someone", kind, "hello")
    }

    async fn wait_for(count: &mut watch::Receiver<u32>, expected: u32) {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            while *count.borrow_and_update() != expected {
                count.changed().await.unwrap();
            }
        })
        .await;
        assert!(result.is_ok(), "badge never reached {expected}, last {}", *count.borrow());
    }

    #[test]
    fn test_duplicate_chats_count_once() {
        let chats = vec![
            chat("a", "me", "other", "other", false),
            chat("b", "me", "other", "other", true),
        ];
        assert_eq!(unread_chat_count("me", &chats), 1);
    }

    #[test]
    fn test_own_last_message_is_not_unread() {
        let chats = vec![chat("a", "me", "other", "me", false)];
        assert_eq!(unread_chat_count("me", &chats), 0);
    }

    #[test]
    fn test_notification_filtering() {
        let notifications = vec![
            notification(NotificationKind::MentorshipRequest),
            notification(NotificationKind::ForumReaction),
            notification(NotificationKind::Other("new-kind".into())),
        ];

        let prefs = NotificationPreferences::new()
            .with(PUSH_NOTIFICATIONS, true)
            .with(MENTORSHIP_REQUESTS, false);
        assert_eq!(visible_notification_count("me", &notifications, &prefs), 2);

        let muted = NotificationPreferences::new()
            .with(PUSH_NOTIFICATIONS, false)
            .with(LIKES_AND_COMMENTS, true);
        assert_eq!(visible_notification_count("me", &notifications, &muted), 0);
    }

    #[test]
    fn test_master_switch_leaves_chats_counted() {
        let mut state = BadgeState::new(
            "me",
            NotificationPreferences::new().with(PUSH_NOTIFICATIONS, false),
        );
        state.chats = Some(vec![chat("a", "me", "other", "other", false)]);
        state.notifications = Some(vec![notification(NotificationKind::Message)]);
        assert_eq!(state.count(), 1);
    }

    #[tokio::test]
    async fn test_live_badge_follows_sources_preferences_and_session() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(MemoryPreferenceStore::new());
        let session = Session::new();

        backend
            .seed(
                collections::CHATS,
                "me_other",
                encode(&chat("me_other", "me", "other", "other", false)).unwrap(),
            )
            .await;

        let badge = UnreadBadge::spawn(backend.clone(), store.clone(), session.subscribe());
        let mut count = badge.subscribe();
        assert_eq!(badge.count(), 0);

        session.sign_in("me");
        wait_for(&mut count, 1).await;

        backend
            .create(
                collections::NOTIFICATIONS,
                Some("n1"),
                encode(&notification(NotificationKind::ForumReaction)).unwrap(),
            )
            .await
            .unwrap();
        wait_for(&mut count, 2).await;

        // Saved from another tab.
        store
            .save("me", &NotificationPreferences::new().with(LIKES_AND_COMMENTS, false))
            .await
            .unwrap();
        wait_for(&mut count, 1).await;

        backend
            .update(collections::CHATS, "me_other", json!({"lastMessageRead": true}))
            .await
            .unwrap();
        wait_for(&mut count, 0).await;

        backend
            .update(collections::NOTIFICATIONS, "n1", json!({"type": "mentorship-request"}))
            .await
            .unwrap();
        wait_for(&mut count, 1).await;

        session.sign_out();
        wait_for(&mut count, 0).await;
    }

    #[tokio::test]
    async fn test_one_shot_badge() {
        let backend = MemoryBackend::new();
        let store = MemoryPreferenceStore::new();
        backend
            .seed(
                collections::NOTIFICATIONS,
                "n1",
                encode(&notification(NotificationKind::Message)).unwrap(),
            )
            .await;

        assert_eq!(current_badge(&backend, &store, "me").await.unwrap(), 1);
        assert_eq!(current_badge(&backend, &store, "nobody").await.unwrap(), 0);
    }
}
