//! Error types for the prediction adapter.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::SUPPORTED_WEIGHTS_URL;

/// Adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Input file extension is not an archive or a supported image.
    #[error("Unsupported file type: {extension}")]
    UnsupportedInput { extension: String },

    /// Weight name is not present in the manifest.
    #[error("{name} unavailable. View the list of available weights: {SUPPORTED_WEIGHTS_URL}")]
    UnknownWeight { name: String },

    /// Workflow JSON is malformed or does not match the expected shape.
    #[error("invalid workflow: {message}")]
    Workflow { message: String },

    /// Filesystem failure.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be read or unpacked.
    #[error("failed to extract {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// Network error talking to the engine or the weight store.
    #[error("network error: {message}")]
    Network { message: String },

    /// Engine refused the prompt or failed while executing it.
    #[error("engine error: {message}")]
    Engine { message: String },

    /// Engine did not answer within the startup window.
    #[error("engine at {address} not reachable after {waited:?}")]
    EngineUnavailable { address: String, waited: Duration },

    /// `run_workflow` was called before `connect`.
    #[error("engine client is not connected")]
    NotConnected,

    /// Weight download failed.
    #[error("failed to download {name}: {message}")]
    Download { name: String, message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AdapterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AdapterError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network {
            message: format!("websocket: {}", err),
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
