use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Command `{program}` failed ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Drive API error: {0}")]
    RemoteApi(String),
}

impl AppError {
    /// Steps whose failure aborts the run map to these kinds; used for the
    /// final log line only.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) | AppError::InvalidInput(_) => "configuration",
            AppError::Command { .. } => "external tool",
            AppError::Compression(_) => "compression",
            AppError::Auth(_) => "authentication",
            AppError::RemoteApi(_) | AppError::Reqwest(_) => "remote api",
            AppError::Io(_) | AppError::SerdeJson(_) => "runtime",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
