//! `promptrelay run <PROMPT>`: one relayed session.
//!
//! Prints the transcript to stdout and the offset the next caller should
//! resume from to stderr.

use anyhow::{Context, Result};
use promptrelay_core::{run_interactive, Watermark};
use promptrelay_telegram::TelegramBridge;
use tracing::info;

use crate::config::Config;

pub async fn run(config: &Config, prompt: &str, extra_args: &[String], after: i64) -> Result<()> {
    let (token, chat_id) = config.credentials()?;
    let bridge = TelegramBridge::new(config.api(&token), config.bridge_settings(chat_id));

    info!(command = %config.session.command, after, "starting relayed session");
    let outcome = run_interactive(prompt, &bridge, Watermark(after), extra_args, &config.session)
        .await
        .with_context(|| format!("failed to launch {}", config.session.command))?;

    print!("{}", outcome.transcript);
    eprintln!(
        "session {}; next offset {}",
        outcome.state,
        outcome.watermark.next_offset()
    );
    Ok(())
}
