use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `ok: false`.
    #[error("telegram api error: {0}")]
    Api(String),
}

pub type TelegramResult<T> = Result<T, TelegramError>;
