//! `promptrelay serve`: the conversation loop.
//!
//! Long-polls the configured chat. Every plain message becomes the prompt
//! of an interactive session; the operator answers the session's questions
//! in the same chat, and the transcript is posted back when it ends.

use std::time::Duration;

use anyhow::Result;
use promptrelay_core::{run_interactive, SessionOutcome, SessionState, Watermark};
use promptrelay_telegram::{split_message, TelegramApi, TelegramBridge};
use tracing::{debug, info, warn};

use crate::config::Config;

const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, PartialEq, Eq)]
enum Inbound<'a> {
    Help,
    Unknown(&'a str),
    Prompt(&'a str),
}

fn parse_inbound(text: &str) -> Inbound<'_> {
    let text = text.trim();
    let Some(command) = text.strip_prefix('/') else {
        return Inbound::Prompt(text);
    };
    // Group chats address bots as `/help@name_bot`.
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");
    match name {
        "help" | "start" => Inbound::Help,
        _ => Inbound::Unknown(text),
    }
}

fn help_text(command: &str) -> String {
    format!(
        "Send any message to run it as a prompt for {command}.\n\
         If it stops to ask something, the question is posted here; \
         your next message is typed in as the answer.\n\n\
         /help - show this message"
    )
}

/// Messages that report a finished session back to the chat.
fn outcome_messages(outcome: &SessionOutcome, max_chars: usize) -> Vec<String> {
    let mut messages = if outcome.transcript.trim().is_empty() {
        vec!["(no output)".to_string()]
    } else {
        split_message(outcome.transcript.trim_end(), max_chars)
    };
    match outcome.state {
        SessionState::Completed => {}
        SessionState::TimedOut => messages.push("(session ended: no reply in time)".to_string()),
        SessionState::DeadlineExceeded => {
            messages.push("(session ended: time limit reached)".to_string())
        }
        other => messages.push(format!("(session ended: {other})")),
    }
    messages
}

async fn send_all(api: &TelegramApi, chat_id: i64, messages: &[String]) {
    for message in messages {
        if let Err(e) = api.send_message(chat_id, message).await {
            warn!(error = %e, "failed to send message");
        }
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let (token, chat_id) = config.credentials()?;
    let api = config.api(&token);
    let bridge = TelegramBridge::new(api.clone(), config.bridge_settings(chat_id));
    let max_chars = config.telegram.max_message_chars;

    let mut offset: i64 = 0;
    let mut backoff_secs = 1u64;

    info!(chat_id, command = %config.session.command, "conversation loop started");

    loop {
        let updates = match api
            .get_updates(offset, config.telegram.poll_timeout_secs)
            .await
        {
            Ok(updates) => {
                backoff_secs = 1;
                updates
            }
            Err(e) => {
                warn!(error = %e, backoff_secs, "getUpdates failed, backing off");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        };

        for update in updates {
            // Replies consumed inside a session are already behind the offset.
            if update.update_id < offset {
                continue;
            }
            offset = update.update_id + 1;

            let Some(text) = update.text_in_chat(chat_id) else {
                debug!(update_id = update.update_id, "ignoring update outside the chat");
                continue;
            };

            match parse_inbound(text) {
                Inbound::Help => {
                    send_all(&api, chat_id, &[help_text(&config.session.command)]).await;
                }
                Inbound::Unknown(command) => {
                    let reply = format!(
                        "Unknown command: {command}\n\n{}",
                        help_text(&config.session.command)
                    );
                    send_all(&api, chat_id, &[reply]).await;
                }
                Inbound::Prompt("") => {}
                Inbound::Prompt(prompt) => {
                    info!(update_id = update.update_id, "running prompt");
                    let started = Watermark(update.update_id);
                    match run_interactive(prompt, &bridge, started, &[], &config.session).await {
                        Ok(outcome) => {
                            offset = offset.max(outcome.watermark.next_offset());
                            send_all(&api, chat_id, &outcome_messages(&outcome, max_chars)).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "session failed to start");
                            send_all(&api, chat_id, &[format!("Error: {e}")]).await;
                        }
                    }
                }
            }
        }
    }
}
