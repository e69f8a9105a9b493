use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::SessionSettings;
use crate::pty::LaunchOptions;

/// How interactive sessions are launched and timed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program to run.
    pub command: String,
    /// Arguments placed before everything else, e.g. the `chat` subcommand.
    pub lead_args: Vec<String>,
    /// Arguments added to every session, after `lead_args`.
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
    pub reply_timeout_secs: u64,
    pub silence_threshold_ms: u64,
    pub grace_period_secs: u64,
    pub rows: u16,
    pub cols: u16,
    pub term: String,
    pub working_dir: Option<PathBuf>,
    /// Write a JSON-lines recording of each session here.
    pub record_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: "kiro-cli".to_string(),
            lead_args: vec!["chat".to_string()],
            extra_args: Vec::new(),
            timeout_secs: 300,
            reply_timeout_secs: 300,
            silence_threshold_ms: 500,
            grace_period_secs: 5,
            rows: 24,
            cols: 80,
            term: "xterm-256color".to_string(),
            working_dir: None,
            record_dir: None,
        }
    }
}

impl SessionConfig {
    /// Full argument vector: lead-in, configured extras, per-call extras,
    /// then the prompt last.
    pub fn argv(&self, prompt: &str, extra_args: &[String]) -> Vec<String> {
        self.lead_args
            .iter()
            .chain(&self.extra_args)
            .chain(extra_args)
            .cloned()
            .chain(std::iter::once(prompt.to_string()))
            .collect()
    }

    pub fn launch_options(&self, prompt: &str, extra_args: &[String]) -> LaunchOptions {
        let mut opts = LaunchOptions::new(self.command.as_str()).args(self.argv(prompt, extra_args));
        if let Some(dir) = &self.working_dir {
            opts = opts.working_dir(dir.clone());
        }
        LaunchOptions {
            term: self.term.clone(),
            rows: self.rows,
            cols: self.cols,
            ..opts
        }
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            silence_threshold: Duration::from_millis(self.silence_threshold_ms),
            reply_timeout: Duration::from_secs(self.reply_timeout_secs),
            overall_timeout: Duration::from_secs(self.timeout_secs),
            grace_period: Duration::from_secs(self.grace_period_secs),
            ..SessionSettings::default()
        }
    }
}
