mod handler;
mod model;

pub use handler::{list_chats, list_messages, mark_read, open_chat, send_attachment, send_message};
