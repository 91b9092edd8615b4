use std::pin::pin;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::watch;

use super::{NotificationPreferences, PreferenceError, PreferenceStore};

const PREFERENCES_KEY_PREFIX: &str = "prefs:";
const PREFERENCES_CHANNEL_PREFIX: &str = "prefs:changed:";

fn preferences_key(user_id: &str) -> String {
    format!("{}{}", PREFERENCES_KEY_PREFIX, user_id)
}

fn preferences_channel(user_id: &str) -> String {
    format!("{}{}", PREFERENCES_CHANNEL_PREFIX, user_id)
}

/// Preferences stored as JSON in Redis. Every save is also published so that
/// other sessions of the same user pick it up without reloading.
#[derive(Clone)]
pub struct RedisPreferenceStore {
    client: redis::Client,
}

impl RedisPreferenceStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PreferenceStore for RedisPreferenceStore {
    async fn load(&self, user_id: &str) -> Result<NotificationPreferences, PreferenceError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(preferences_key(user_id)).await?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(NotificationPreferences::default()),
        }
    }

    async fn save(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferenceError> {
        let json = serde_json::to_string(preferences)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _: () = conn.set(preferences_key(user_id), &json).await?;
        let _: () = conn.publish(preferences_channel(user_id), &json).await?;
        tracing::debug!("Saved notification preferences for {}", user_id);
        Ok(())
    }

    async fn watch(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<NotificationPreferences>, PreferenceError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(preferences_channel(user_id)).await?;

        // Subscribe before loading so no save can fall between the two.
        let initial = self.load(user_id).await?;
        let (sender, receiver) = watch::channel(initial);
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let mut messages = pin!(pubsub.on_message());
            loop {
                tokio::select! {
                    _ = sender.closed() => break,
                    message = messages.next() => {
                        let Some(message) = message else {
                            tracing::warn!("Preference channel for {} closed", user_id);
                            break;
                        };
                        let parsed = message
                            .get_payload::<String>()
                            .map_err(PreferenceError::from)
                            .and_then(|payload| {
                                serde_json::from_str::<NotificationPreferences>(&payload)
                                    .map_err(PreferenceError::from)
                            });
                        match parsed {
                            Ok(preferences) => {
                                sender.send_replace(preferences);
                            }
                            Err(e) => {
                                tracing::warn!("Ignoring preference update for {}: {}", user_id, e);
                            }
                        }
                    }
                }
            }
            tracing::debug!("Stopped watching preferences for {}", user_id);
        });

        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_channel_are_per_user() {
        assert_eq!(preferences_key("u1"), "prefs:u1");
        assert_eq!(preferences_channel("u1"), "prefs:changed:u1");
        assert_ne!(preferences_channel("u1"), preferences_key("u1"));
    }
}
