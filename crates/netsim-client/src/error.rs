use thiserror::Error;

use crate::simulation::SimulationError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay answered an HTTP call with a non-success status
    #[error("{message} ({code}, HTTP {status})")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// The relay refused a WebSocket event with an `error` push
    #[error("relay refused the request ({code}): {message}")]
    Refused { code: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
