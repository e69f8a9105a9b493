use thiserror::Error;

/// Errors produced by the session bridge.
///
/// Only launch problems surface to callers of a session run; transport
/// failures on the terminal are folded into a normal completion.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("command not found on PATH: {0}")]
    CommandNotFound(String),

    #[error("error starting {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("pty error: {0}")]
    Pty(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
