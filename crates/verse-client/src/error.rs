use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("progress channel: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported origin scheme '{0}'")]
    Scheme(String),

    #[error("invalid session token")]
    InvalidToken,

    #[error("session store: {0}")]
    Session(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
