//! Error types for RTDE client operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RtdeError>;

#[derive(Error, Debug)]
pub enum RtdeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("RTDE protocol error: {0}")]
    Protocol(String),

    #[error("Controller version error: {0}")]
    Version(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RtdeError {
    /// True for errors that indicate a lost or unusable transport. The
    /// session must be reconnected before further use.
    pub fn is_transport(&self) -> bool {
        matches!(self, RtdeError::Connection(_) | RtdeError::Io(_))
    }
}
