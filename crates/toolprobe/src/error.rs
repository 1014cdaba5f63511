use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model stream: {0}")]
    Stream(String),

    #[error("Turn exceeded deadline of {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Max tool rounds ({0}) exceeded")]
    MaxRoundsExceeded(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}
