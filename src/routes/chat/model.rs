use serde::{Deserialize, Serialize};

use crate::models::MessageKind;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatRequest {
    pub other_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// The attachment bytes travel as the request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentQuery {
    pub file_name: String,
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
}

fn default_kind() -> MessageKind {
    MessageKind::File
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub changed: bool,
}
