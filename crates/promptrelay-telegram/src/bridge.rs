//! [`ReplyBridge`] over one Telegram chat.
//!
//! Notifications go out as plain `sendMessage` calls. Replies are read with
//! `getUpdates` starting just past the caller's watermark, so updates at or
//! below it are acknowledged to Telegram and never seen again, while
//! anything after the chosen reply stays queued server-side for the next
//! call.

use std::sync::Arc;
use std::time::Duration;

use promptrelay_core::ansi::strip_ansi_str;
use promptrelay_core::{Reply, ReplyBridge, Watermark};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::TelegramApi;
use crate::format::{truncate_chars, MAX_MESSAGE_CHARS};
use crate::types::Update;

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub chat_id: i64,
    /// Upper bound for a single long poll.
    pub max_poll_secs: u64,
    /// Pause after a failed poll before trying again.
    pub error_backoff: Duration,
    pub max_message_chars: usize,
}

impl TelegramSettings {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            max_poll_secs: 10,
            error_backoff: Duration::from_secs(2),
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }
}

/// Relays session questions to one chat and reads the operator's answers
/// from it. Messages from other chats are skipped.
pub struct TelegramBridge {
    api: Arc<TelegramApi>,
    settings: TelegramSettings,
}

impl TelegramBridge {
    pub fn new(api: Arc<TelegramApi>, settings: TelegramSettings) -> Self {
        Self { api, settings }
    }
}

impl ReplyBridge for TelegramBridge {
    async fn notify(&self, message: &str) {
        let clean = strip_ansi_str(message);
        let text = truncate_chars(clean.trim(), self.settings.max_message_chars);
        if text.is_empty() {
            debug!("skipping empty notification");
            return;
        }
        if let Err(e) = self.api.send_message(self.settings.chat_id, text).await {
            warn!(chat_id = self.settings.chat_id, error = %e, "failed to deliver notification");
        }
    }

    async fn await_reply(&self, after: Watermark, timeout: Duration) -> Option<Reply> {
        let deadline = Instant::now() + timeout;
        let mut offset = after.next_offset();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let poll_secs = remaining.as_secs().clamp(1, self.settings.max_poll_secs);

            match self.api.get_updates(offset, poll_secs).await {
                Ok(updates) => {
                    if let Some(reply) = select_reply(&updates, self.settings.chat_id, after) {
                        info!(id = reply.id, "reply received");
                        return Some(reply);
                    }
                    // Nothing usable in this batch; acknowledge it on the next poll.
                    if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                        offset = offset.max(last + 1);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed while waiting for reply");
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tokio::time::sleep(self.settings.error_backoff.min(remaining)).await;
                }
            }
        }
    }
}

/// The lowest-id update after `after` that is a non-blank text message in
/// `chat_id`, as a trimmed [`Reply`].
pub fn select_reply(updates: &[Update], chat_id: i64, after: Watermark) -> Option<Reply> {
    updates
        .iter()
        .filter(|u| after.admits(u.update_id))
        .filter_map(|u| {
            let text = u.text_in_chat(chat_id)?.trim();
            (!text.is_empty()).then(|| Reply::new(text, u.update_id))
        })
        .min_by_key(|reply| reply.id)
}
