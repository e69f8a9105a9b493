//! Operator reply bridge.
//!
//! The controller talks to the human through two calls: push a message out,
//! and wait for the next answer. Concrete channels (Telegram, the in-process
//! [`MemoryBridge`]) implement [`ReplyBridge`]; the controller only sees the
//! trait.

pub mod memory;

use std::fmt;
use std::future::Future;
use std::time::Duration;

pub use memory::MemoryBridge;

/// Highest reply id already consumed.
///
/// Passed into every wait and handed back to the caller so the next call
/// (or the conversation loop that owns the chat) never reads the same reply
/// twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(pub i64);

impl Watermark {
    /// The offset a channel should resume polling from.
    pub fn next_offset(self) -> i64 {
        self.0 + 1
    }

    /// Whether a reply with `id` has not been consumed yet.
    pub fn admits(self, id: i64) -> bool {
        id > self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One operator answer taken from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub id: i64,
}

impl Reply {
    pub fn new(text: impl Into<String>, id: i64) -> Self {
        Self {
            text: text.into(),
            id,
        }
    }

    /// The watermark after consuming this reply.
    pub fn watermark(&self) -> Watermark {
        Watermark(self.id)
    }
}

/// Notify the operator and collect replies.
///
/// `notify` is fire-and-forget: implementations log delivery failures and
/// return normally, since losing a notification must not end a session.
///
/// `await_reply` returns only replies whose id is strictly greater than
/// `after`, and at most one per call: the lowest such id. Later replies stay
/// queued for the next call. `None` means nothing arrived within `timeout`.
pub trait ReplyBridge: Send + Sync {
    fn notify(&self, message: &str) -> impl Future<Output = ()> + Send;

    fn await_reply(
        &self,
        after: Watermark,
        timeout: Duration,
    ) -> impl Future<Output = Option<Reply>> + Send;
}
