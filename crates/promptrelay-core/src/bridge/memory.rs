//! In-process bridge backed by a reply map.
//!
//! Used by tests and by embedders that drive sessions from their own UI.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Reply, ReplyBridge, Watermark};

#[derive(Debug, Default)]
pub struct MemoryBridge {
    replies: Mutex<BTreeMap<i64, String>>,
    sent: Mutex<Vec<String>>,
    arrived: Notify,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load replies, e.g. `MemoryBridge::with_replies([(5, "yes")])`.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let bridge = Self::new();
        for (id, text) in replies {
            bridge.push_reply(id, text);
        }
        bridge
    }

    /// Queue a reply and wake any waiter.
    pub fn push_reply(&self, id: i64, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, text.into());
        self.arrived.notify_waiters();
    }

    /// Every message passed to `notify`, oldest first.
    pub fn notifications(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn first_after(&self, after: Watermark) -> Option<Reply> {
        let replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        replies
            .range(after.next_offset()..)
            .find(|(_, text)| !text.trim().is_empty())
            .map(|(id, text)| Reply::new(text.trim(), *id))
    }
}

impl ReplyBridge for MemoryBridge {
    async fn notify(&self, message: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }

    async fn await_reply(&self, after: Watermark, timeout: Duration) -> Option<Reply> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register before looking so a push between the check and the
            // wait is not missed.
            let arrived = self.arrived.notified();
            if let Some(reply) = self.first_after(after) {
                return Some(reply);
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return None;
            }
        }
    }
}
