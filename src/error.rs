//! Error types shared by the surface, the bridge and the panel server.

use thiserror::Error;

/// Errors raised while relaying chat traffic or managing the panel.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The HTTP request to the chat backend failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A boundary message or backend body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend answered with a non-success status and no `error` field.
    #[error("backend error ({status}): {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        message: String,
    },

    /// The configured backend URL is invalid.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The panel was closed. Disposed panels never come back.
    #[error("panel has been disposed")]
    PanelDisposed,

    /// No panel has been opened yet.
    #[error("no panel is open")]
    NoPanel,
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
