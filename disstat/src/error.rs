//! Error types for the statistics client

use thiserror::Error;

/// Client result type alias
pub type Result<T> = std::result::Result<T, DisstatError>;

/// Errors raised by the statistics client
#[derive(Error, Debug)]
pub enum DisstatError {
    /// Rejected input, raised before any request is made
    #[error("Validation error: {0}")]
    Validation(String),

    /// The service answered with an unexpected status
    #[error("{message} {status_code}")]
    Api { status_code: u16, message: String },

    /// The configured backend does not offer this operation
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DisstatError {
    /// Build an API error. Status 401 always reports an invalid key.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        let message = if status_code == 401 {
            "Invalid API key".to_string()
        } else {
            message.into()
        };
        DisstatError::Api {
            status_code,
            message,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DisstatError::Validation(message.into())
    }

    /// Status code carried by an API error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DisstatError::Api { status_code, .. } => Some(*status_code),
            DisstatError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DisstatError::Validation(_))
    }
}

impl From<config::ConfigError> for DisstatError {
    fn from(err: config::ConfigError) -> Self {
        DisstatError::Config(err.to_string())
    }
}
