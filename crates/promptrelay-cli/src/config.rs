//! Configuration at `~/.promptrelay/config.toml`.
//!
//! Two sections: `[telegram]` for the operator channel and `[session]` for
//! how the interactive program is launched. CLI flags and environment
//! variables override file values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use promptrelay_core::SessionConfig;
use promptrelay_telegram::api::DEFAULT_API_BASE;
use promptrelay_telegram::{TelegramApi, TelegramSettings, MAX_MESSAGE_CHARS};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "~/.promptrelay/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<i64>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Long-poll timeout for the conversation loop.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_max_message_chars() -> usize {
    MAX_MESSAGE_CHARS
}

/// Values from the command line (or its environment fallbacks).
#[derive(Debug, Default)]
pub struct Overrides {
    pub bot_token: Option<String>,
    pub chat_id: Option<i64>,
    pub command: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(token) = overrides.bot_token {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = overrides.chat_id {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(command) = overrides.command {
            self.session.command = command;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.session.timeout_secs = timeout;
        }
        if let Some(dir) = self.session.record_dir.take() {
            self.session.record_dir = Some(expand_tilde(&dir.to_string_lossy()));
        }
    }

    /// Bot token and chat id, both required for anything that talks to
    /// Telegram.
    pub fn credentials(&self) -> Result<(String, i64)> {
        let token = self
            .telegram
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("missing bot token (set TELEGRAM_API_KEY, --bot-token, or [telegram].bot_token)")?;
        let chat_id = self
            .telegram
            .chat_id
            .context("missing chat id (set TELEGRAM_CHAT_ID, --chat-id, or [telegram].chat_id)")?;
        Ok((token, chat_id))
    }

    pub fn api(&self, token: &str) -> Arc<TelegramApi> {
        Arc::new(TelegramApi::with_base_url(token, &self.telegram.api_base))
    }

    pub fn bridge_settings(&self, chat_id: i64) -> TelegramSettings {
        TelegramSettings {
            max_message_chars: self.telegram.max_message_chars,
            ..TelegramSettings::new(chat_id)
        }
    }
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert_eq!(config.session.command, "kiro-cli");
        assert_eq!(config.session.timeout_secs, 300);
    }

    #[test]
    fn parses_both_sections() {
        let toml_str = r#"
[telegram]
bot_token = "123:abc"
chat_id = -1001

[session]
command = "/opt/kiro/bin/kiro-cli"
extra_args = ["--trust-all-tools"]
reply_timeout_secs = 120
silence_threshold_ms = 800
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.chat_id, Some(-1001));
        assert_eq!(config.session.command, "/opt/kiro/bin/kiro-cli");
        assert_eq!(config.session.extra_args, vec!["--trust-all-tools"]);
        assert_eq!(config.session.reply_timeout_secs, 120);
        assert_eq!(config.session.silence_threshold_ms, 800);
        assert_eq!(config.session.lead_args, vec!["chat"]);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.telegram.bot_token.is_none());
    }

    #[test]
    fn load_reads_file_and_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[telegram]\nchat_id = 7\n").unwrap();
        assert_eq!(Config::load(&good).unwrap().telegram.chat_id, Some(7));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[telegram\nchat_id = ").unwrap();
        let err = Config::load(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }

    #[test]
    fn overrides_win() {
        let mut config: Config =
            toml::from_str("[telegram]\nbot_token = \"file\"\nchat_id = 1\n").unwrap();
        config.apply(Overrides {
            bot_token: Some("flag".into()),
            chat_id: None,
            command: Some("sh".into()),
            timeout_secs: Some(60),
        });
        assert_eq!(config.credentials().unwrap(), ("flag".to_string(), 1));
        assert_eq!(config.session.command, "sh");
        assert_eq!(config.session.timeout_secs, 60);
    }

    #[test]
    fn credentials_are_required() {
        let config = Config::default();
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("bot token"));

        let mut config = Config::default();
        config.telegram.bot_token = Some("t".into());
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("chat id"));
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/.promptrelay/config.toml");
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
        assert_eq!(expand_tilde("/etc/promptrelay.toml"), PathBuf::from("/etc/promptrelay.toml"));
    }
}
