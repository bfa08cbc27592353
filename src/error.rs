use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("GitLab API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("GitLab API still failing with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
