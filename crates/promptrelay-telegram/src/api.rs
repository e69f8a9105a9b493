//! Raw HTTP calls to the Telegram Bot API.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{TelegramError, TelegramResult};
use crate::types::{ApiResponse, SentMessage, Update};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Slack added to a long poll's own timeout for the HTTP request.
const POLL_SLACK: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client for the Bot API methods the relay needs, bound to one bot
/// token. Every request carries its own timeout.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(bot_token, DEFAULT_API_BASE)
    }

    /// Point the client at another server, e.g. a local Bot API instance.
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), bot_token),
        }
    }

    /// Send plain text to a chat. Returns the new message id.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<i64> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });

        debug!(chat_id, chars = text.chars().count(), "sendMessage");

        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let api_resp: ApiResponse<SentMessage> = resp.json().await?;
        if !api_resp.ok {
            let desc = api_resp.description.unwrap_or_default();
            warn!("sendMessage failed: {desc}");
            return Err(TelegramError::Api(desc));
        }

        Ok(api_resp.result.map(|m| m.message_id).unwrap_or(0))
    }

    /// Long-poll for updates with id `>= offset`, waiting up to
    /// `timeout_secs` for one to arrive.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });

        let resp = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs) + POLL_SLACK)
            .json(&body)
            .send()
            .await?;

        let api_resp: ApiResponse<Vec<Update>> = resp.json().await?;
        if !api_resp.ok {
            let desc = api_resp.description.unwrap_or_default();
            warn!("getUpdates failed: {desc}");
            return Err(TelegramError::Api(desc));
        }

        Ok(api_resp.result.unwrap_or_default())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}
