//! Error types for the Persephone console

use thiserror::Error;

/// Main error type for the Persephone console
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No run id could be resolved for the stage
    #[error("No active run: {0}")]
    MissingRunId(String),

    /// The control plane answered with a non-success status
    #[error("{message}")]
    Api { status: u16, message: String },

    /// No usable response from the control plane
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local validation failed before any call was made
    #[error("{0}")]
    Precondition(String),

    /// A stage command ended with the stage's error slot set
    #[error("{0}")]
    StageFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Build the remote error for a failed response
    pub fn api(status: u16, message: Option<String>) -> Self {
        ConsoleError::Api {
            status,
            message: message.unwrap_or_else(|| format!("Request failed with status {}", status)),
        }
    }

    /// Text a stage may show verbatim.
    ///
    /// `None` for transport-level failures; the stage picks its own wording.
    pub fn user_message(&self) -> Option<String> {
        match self {
            ConsoleError::Api { message, .. } => Some(message.clone()),
            ConsoleError::MissingRunId(message) | ConsoleError::Precondition(message) => {
                Some(message.clone())
            }
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ConsoleError::Transport(_))
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ConsoleError::api(status.as_u16(), None);
        }
        ConsoleError::Transport(err.to_string())
    }
}
