//! promptrelay-telegram: Telegram Bot API channel.
//!
//! A thin `sendMessage`/`getUpdates` client plus [`TelegramBridge`], which
//! implements the core crate's `ReplyBridge` on top of a single chat.

pub mod api;
pub mod bridge;
pub mod error;
pub mod format;
pub mod types;

pub use api::TelegramApi;
pub use bridge::{select_reply, TelegramBridge, TelegramSettings};
pub use error::{TelegramError, TelegramResult};
pub use format::{split_message, truncate_chars, MAX_MESSAGE_CHARS};
pub use types::{ApiResponse, Chat, Message, SentMessage, Update};
