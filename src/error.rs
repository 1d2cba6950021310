use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployLensError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    #[error("Missing required parameter '{param}' for {endpoint}")]
    MissingParam { endpoint: String, param: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeployLensError>;
