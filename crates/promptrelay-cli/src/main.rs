//! promptrelay: relay interactive CLI prompts to a Telegram chat.
//!
//! Runs a command-line assistant on a pseudo-terminal and, whenever it stops
//! to ask something, forwards the question to the operator's chat and types
//! the answer back in.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use config::{expand_tilde, Config, Overrides, DEFAULT_CONFIG_PATH};

/// promptrelay: interactive CLI sessions over Telegram
#[derive(Parser, Debug)]
#[command(name = "promptrelay", version, about = "Relay interactive CLI prompts to a Telegram chat")]
struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Telegram bot token
    #[arg(long, global = true, env = "TELEGRAM_API_KEY", hide_env_values = true)]
    bot_token: Option<String>,

    /// Telegram chat to relay through
    #[arg(long, global = true, env = "TELEGRAM_CHAT_ID", allow_negative_numbers = true)]
    chat_id: Option<i64>,

    /// Program to run instead of the configured one
    #[arg(long, global = true)]
    command: Option<String>,

    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one prompt and relay its questions
    Run {
        /// Prompt passed to the program as its final argument
        prompt: String,

        /// Extra argument placed before the prompt (repeatable)
        #[arg(long = "extra-arg", allow_hyphen_values = true)]
        extra_args: Vec<String>,

        /// Highest chat update id already handled
        #[arg(long, default_value_t = 0)]
        after: i64,

        /// Overall session budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Turn every chat message into a relayed session
    Serve,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path: PathBuf = expand_tilde(&cli.config);
    let mut cfg = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e:#}");
            eprintln!("promptrelay: {e:#}");
            std::process::exit(1);
        }
    };

    let timeout_secs = match &cli.subcommand {
        Command::Run { timeout, .. } => *timeout,
        Command::Serve => None,
    };
    cfg.apply(Overrides {
        bot_token: cli.bot_token,
        chat_id: cli.chat_id,
        command: cli.command,
        timeout_secs,
    });

    let result = match cli.subcommand {
        Command::Run {
            prompt,
            extra_args,
            after,
            ..
        } => commands::run::run(&cfg, &prompt, &extra_args, after).await,
        Command::Serve => {
            tokio::select! {
                result = commands::serve::run(&cfg) => result,
                _ = shutdown_signal() => {
                    info!("received shutdown signal");
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        eprintln!("promptrelay: {e:#}");
        std::process::exit(1);
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
