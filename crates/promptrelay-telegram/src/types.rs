//! Serde types for the subset of the Bot API in use.
//!
//! Unknown fields are ignored; anything optional on Telegram's side is an
//! `Option` here.

use serde::Deserialize;

/// Envelope around every Bot API result.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub description: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// The message object returned by `sendMessage`.
#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

impl Update {
    /// Text of the update if it is a message in `chat_id`.
    pub fn text_in_chat(&self, chat_id: i64) -> Option<&str> {
        let message = self.message.as_ref()?;
        if message.chat.id != chat_id {
            return None;
        }
        message.text.as_deref()
    }
}
