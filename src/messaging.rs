//! Direct messages between two users.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::backend::{
    Backend, BackendError, Direction, Query, TypedSubscription, encode, is_safe_blob_name,
};
use crate::effects::{RetryPolicy, retry_idempotent};
use crate::error::AppError;
use crate::models::{Chat, Message, MessageKind, User, UserSummary, chat_id_for, collections};
use crate::reconcile::{JoinSource, JoinedRow, RowOrder, resolve};
use crate::reporting::{ErrorContext, ErrorKind, ErrorReporter};

/// Joins a user's chats with the profile of the person on the other side.
pub struct ChatListSource {
    backend: Arc<dyn Backend>,
    user_id: String,
}

impl ChatListSource {
    pub fn new(backend: Arc<dyn Backend>, user_id: &str) -> Self {
        Self {
            backend,
            user_id: user_id.to_string(),
        }
    }

    pub fn query(&self) -> Query {
        Query::collection(collections::CHATS).array_contains("participants", self.user_id.as_str())
    }

    pub fn newest_first() -> RowOrder<Chat, User> {
        Arc::new(|a, b| b.primary.updated_at().cmp(&a.primary.updated_at()))
    }
}

#[async_trait]
impl JoinSource for ChatListSource {
    type Primary = Chat;
    type Secondary = User;

    fn primary_id(&self, chat: &Chat) -> String {
        chat.id.clone()
    }

    fn counterpart_key(&self, chat: &Chat) -> Option<String> {
        chat.counterpart(&self.user_id).map(str::to_string)
    }

    fn updated_at(&self, chat: &Chat) -> DateTime<Utc> {
        chat.updated_at()
    }

    async fn lookup(&self, key: &str) -> Result<Option<User>, BackendError> {
        self.backend.get_as::<User>(collections::USERS, key).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: String,
    pub counterpart_id: String,
    pub counterpart_name: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread: bool,
}

impl ChatSummary {
    pub fn from_row(row: &JoinedRow<Chat, User>, user_id: &str) -> Self {
        Self {
            chat_id: row.primary.id.clone(),
            counterpart_id: row.key.clone(),
            counterpart_name: row.counterpart.label(User::display_name),
            last_message: row.primary.last_message.clone(),
            last_message_time: row.primary.last_message_time,
            unread: row.primary.is_unread_for(user_id),
        }
    }
}

pub struct Messenger {
    backend: Arc<dyn Backend>,
    reporter: Arc<dyn ErrorReporter>,
    retry: RetryPolicy,
}

impl Messenger {
    pub fn new(
        backend: Arc<dyn Backend>,
        reporter: Arc<dyn ErrorReporter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            reporter,
            retry,
        }
    }

    /// Returns the conversation between `user_id` and `other_id`, creating
    /// it on first contact. Both sides derive the same document id, so a
    /// concurrent first message from the other side lands on the same chat.
    pub async fn open_chat(&self, user_id: &str, other_id: &str) -> Result<Chat, AppError> {
        if user_id == other_id {
            return Err(AppError::Validation("cannot start a chat with yourself".into()));
        }

        let chat_id = chat_id_for(user_id, other_id);
        if let Some(chat) = self.backend.get_as::<Chat>(collections::CHATS, &chat_id).await? {
            return Self::checked_pair(chat, user_id, other_id);
        }

        let me = self.user(user_id).await?;
        let other = self.user(other_id).await?;
        let chat = Chat {
            id: chat_id.clone(),
            participants: vec![user_id.to_string(), other_id.to_string()],
            participant_info: HashMap::from([
                (user_id.to_string(), UserSummary::from(&me)),
                (other_id.to_string(), UserSummary::from(&other)),
            ]),
            created_at: Utc::now(),
            ..Default::default()
        };

        match self
            .backend
            .create(collections::CHATS, Some(&chat_id), encode(&chat)?)
            .await
        {
            Ok(_) => {
                tracing::info!("Chat {} created by {}", chat_id, user_id);
                Ok(chat)
            }
            Err(BackendError::AlreadyExists { .. }) => {
                tracing::debug!("Chat {} was created concurrently", chat_id);
                let chat = self.backend.require::<Chat>(collections::CHATS, &chat_id).await?;
                Self::checked_pair(chat, user_id, other_id)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A stored chat is only handed out when it belongs to exactly this pair.
    fn checked_pair(chat: Chat, user_id: &str, other_id: &str) -> Result<Chat, AppError> {
        if chat.is_between(user_id, other_id) {
            return Ok(chat);
        }
        tracing::error!(
            "Chat {} belongs to {:?}, not to {} and {}",
            chat.id,
            chat.participants,
            user_id,
            other_id
        );
        Err(BackendError::AlreadyExists {
            collection: collections::CHATS.to_string(),
            id: chat.id,
        }
        .into())
    }

    pub async fn send_text(
        &self,
        chat_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Message, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("message is empty".into()));
        }

        let message = Message {
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            ..Default::default()
        };
        self.append(chat_id, message).await
    }

    pub async fn send_attachment(
        &self,
        chat_id: &str,
        sender_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        kind: MessageKind,
    ) -> Result<Message, AppError> {
        if kind == MessageKind::Text {
            return Err(AppError::Validation("attachments must be images or files".into()));
        }
        if !is_safe_blob_name(file_name) {
            return Err(AppError::Validation(format!("invalid file name {file_name:?}")));
        }
        let chat = self.participant_chat(chat_id, sender_id).await?;

        let path = format!(
            "{}/{}/{}-{}",
            collections::CHATS,
            chat.id,
            uuid::Uuid::new_v4().simple(),
            file_name
        );
        self.backend.upload(&path, bytes).await?;
        let url = self.backend.download_url(&path).await?;

        let message = Message {
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            kind,
            file_url: Some(url),
            file_name: Some(file_name.to_string()),
            ..Default::default()
        };
        self.append(chat_id, message).await
    }

    /// Marks the last message read if it came from the other side.
    pub async fn mark_read(&self, chat_id: &str, reader_id: &str) -> Result<bool, AppError> {
        let chat = self.participant_chat(chat_id, reader_id).await?;
        if !chat.is_unread_for(reader_id) {
            return Ok(false);
        }

        self.backend
            .update(collections::CHATS, chat_id, json!({ "lastMessageRead": true }))
            .await?;
        Ok(true)
    }

    pub async fn messages(&self, chat_id: &str, reader_id: &str) -> Result<Vec<Message>, AppError> {
        self.participant_chat(chat_id, reader_id).await?;
        let query =
            Query::collection(collections::messages(chat_id)).order_by("timestamp", Direction::Asc);
        Ok(self.backend.query_as(&query).await?)
    }

    pub async fn subscribe_messages(
        &self,
        chat_id: &str,
        reader_id: &str,
    ) -> Result<TypedSubscription<Message>, AppError> {
        self.participant_chat(chat_id, reader_id).await?;
        let query =
            Query::collection(collections::messages(chat_id)).order_by("timestamp", Direction::Asc);
        Ok(self.backend.subscribe_as(query).await?)
    }

    /// The chat list as shown in the inbox: one row per counterpart, newest first.
    pub async fn chat_list(&self, user_id: &str) -> Result<Vec<ChatSummary>, AppError> {
        let source = Arc::new(ChatListSource::new(self.backend.clone(), user_id));
        let chats = self.backend.query_as::<Chat>(&source.query()).await?;
        let rows = resolve(source, chats, Some(ChatListSource::newest_first())).await;

        Ok(rows
            .iter()
            .map(|row| ChatSummary::from_row(row, user_id))
            .collect())
    }

    async fn user(&self, user_id: &str) -> Result<User, AppError> {
        self.backend
            .get_as::<User>(collections::USERS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    async fn participant_chat(&self, chat_id: &str, user_id: &str) -> Result<Chat, AppError> {
        let chat = self
            .backend
            .get_as::<Chat>(collections::CHATS, chat_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chat {chat_id}")))?;
        if !chat.participants.iter().any(|p| p == user_id) {
            return Err(AppError::PermissionDenied(format!(
                "{user_id} is not part of chat {chat_id}"
            )));
        }
        Ok(chat)
    }

    /// Appends the message, then refreshes the chat's last-message preview.
    /// A preview that cannot be written is reported; the message stands.
    async fn append(&self, chat_id: &str, mut message: Message) -> Result<Message, AppError> {
        self.participant_chat(chat_id, &message.sender_id).await?;

        message.id = self
            .backend
            .create(&collections::messages(chat_id), None, encode(&message)?)
            .await?;

        let preview = json!({
            "lastMessage": message.preview(),
            "lastMessageSenderId": message.sender_id,
            "lastMessageRead": false,
            "lastMessageTime": message.timestamp,
        });
        let backend = self.backend.as_ref();
        let result = retry_idempotent(self.retry, "chat-preview", || {
            backend.update(collections::CHATS, chat_id, preview.clone())
        })
        .await;
        if let Err(e) = result {
            self.reporter.report(
                ErrorKind::PartialWrite,
                ErrorContext::new(
                    "chat-preview",
                    format!("message {} sent but chat {} not updated: {}", message.id, chat_id, e),
                ),
            );
        }

        Ok(message)
    }
}
