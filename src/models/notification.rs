use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification category as stored in the `type` field. Categories this
/// client does not know are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    #[default]
    MentorshipRequest,
    MentorshipResponse,
    Message,
    ForumReaction,
    Other(String),
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "mentorship-request" => NotificationKind::MentorshipRequest,
            "mentorship-response" => NotificationKind::MentorshipResponse,
            "message" => NotificationKind::Message,
            "forum-reaction" => NotificationKind::ForumReaction,
            _ => NotificationKind::Other(value),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::MentorshipRequest => "mentorship-request".into(),
            NotificationKind::MentorshipResponse => "mentorship-response".into(),
            NotificationKind::Message => "message".into(),
            NotificationKind::ForumReaction => "forum-reaction".into(),
            NotificationKind::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: &str,
        sender_id: &str,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            recipient_id: recipient_id.to_string(),
            sender_id: sender_id.to_string(),
            kind,
            message: message.into(),
            link: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_kind_survives_round_trip() {
        let notification: Notification = serde_json::from_value(json!({
            "recipientId": "u1",
            "type": "event-reminder",
        }))
        .unwrap();
        assert_eq!(
            notification.kind,
            NotificationKind::Other("event-reminder".into())
        );

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "event-reminder");
    }
}
