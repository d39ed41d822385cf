use std::path::PathBuf;
use thiserror::Error;

pub type ScopeResult<T> = Result<T, ScopeError>;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Background task error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Unreadable root '{0}': not an accessible directory")]
    UnreadableRoot(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}
