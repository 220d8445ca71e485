use crate::stream::Protocol;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("No router factory registered for protocol {0}")]
    NoRouterFactory(Protocol),

    #[error("Unknown listener: {0}")]
    UnknownListener(String),
}

pub type Result<T> = std::result::Result<T, MeshProxyError>;
