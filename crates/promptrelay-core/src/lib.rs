//! promptrelay-core: interactive session bridge.
//!
//! Runs a command-line program on a pseudo-terminal, spots when it stops to
//! ask a question, relays the question to an operator and types the answer
//! back in. The operator channel is abstract ([`ReplyBridge`]); the Telegram
//! implementation lives in `promptrelay-telegram`.

pub mod ansi;
pub mod bridge;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod output;
pub mod pty;
pub mod recording;
pub mod runner;
pub mod silence;

// Re-export commonly used items at crate root.
pub use bridge::{MemoryBridge, Reply, ReplyBridge, Watermark};
pub use classifier::{looks_like_prompt, HeuristicPolicy, PromptEvent, PromptPolicy};
pub use config::SessionConfig;
pub use controller::{SessionController, SessionOutcome, SessionSettings, SessionState};
pub use error::{RelayError, RelayResult};
pub use pty::{LaunchOptions, PtySession, ReadOutcome};
pub use runner::run_interactive;
