use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chat {
    pub id: String,
    pub participants: Vec<String>,
    pub participant_info: HashMap<String, UserSummary>,
    pub last_message: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_read: bool,
    pub last_message_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// The participant who is not `user_id`.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if !self.participants.iter().any(|p| p == user_id) {
            return None;
        }
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != user_id)
    }

    /// Unread for `user_id` when the counterpart sent the last message and it
    /// has not been marked read.
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        match &self.last_message_sender_id {
            Some(sender) => sender != user_id && !self.last_message_read,
            None => false,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.last_message_time.unwrap_or(self.created_at)
    }

    /// True when the chat is exactly the conversation between `a` and `b`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let mut expected = [a, b];
        expected.sort_unstable();
        let mut actual: Vec<&str> = self.participants.iter().map(String::as_str).collect();
        actual.sort_unstable();
        actual == expected
    }
}

/// Chat documents are keyed by the sorted participant pair, so two clients
/// opening the same conversation address one document. `%` and `_` are
/// escaped in each id so the separator is unambiguous.
pub fn chat_id_for(a: &str, b: &str) -> String {
    fn escape(id: &str) -> String {
        id.replace('%', "%25").replace('_', "%5F")
    }

    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}_{}", escape(first), escape(second))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl Message {
    /// Text shown as the chat's last-message preview.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => self.text.clone().unwrap_or_default(),
            MessageKind::Image => "Sent an image".to_string(),
            MessageKind::File => format!(
                "Sent a file: {}",
                self.file_name.as_deref().unwrap_or("attachment")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_is_order_independent() {
        assert_eq!(chat_id_for("alice", "bob"), chat_id_for("bob", "alice"));
        assert_eq!(chat_id_for("alice", "bob"), "alice_bob");
    }

    #[test]
    fn test_chat_id_separates_underscored_pairs() {
        assert_ne!(chat_id_for("a_b", "c"), chat_id_for("a", "b_c"));
        assert_ne!(chat_id_for("a%5F", "b"), chat_id_for("a_", "b"));
        assert_eq!(chat_id_for("c", "a_b"), "a%5Fb_c");
    }

    #[test]
    fn test_chat_is_between() {
        let chat = Chat {
            participants: vec!["a_b".into(), "c".into()],
            ..Default::default()
        };
        assert!(chat.is_between("c", "a_b"));
        assert!(!chat.is_between("a", "b_c"));
        assert!(!chat.is_between("a_b", "a_b"));
    }

    #[test]
    fn test_counterpart_and_unread() {
        let chat = Chat {
            participants: vec!["u1".into(), "u2".into()],
            last_message_sender_id: Some("u2".into()),
            ..Default::default()
        };

        assert_eq!(chat.counterpart("u1"), Some("u2"));
        assert_eq!(chat.counterpart("u3"), None);
        assert!(chat.is_unread_for("u1"));
        assert!(!chat.is_unread_for("u2"));
    }
}
