//! Error types for the deploy service

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for the deploy service
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("git clone failed ({}): {message}", exit_label(*code))]
    CloneFailed { code: Option<i32>, message: String },

    #[error("could not resolve checked out commit: {0}")]
    CommitResolutionFailed(String),

    #[error("{step} step failed ({}): {message}", exit_label(*code))]
    BuildStepFailed {
        step: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{dir_name} directory not found at {}", path.display())]
    ArtifactMissing { dir_name: String, path: PathBuf },

    #[error("container engine {operation} failed: {message}")]
    ContainerEngine { operation: String, message: String },

    #[error("container {0} disappeared while the action was running")]
    ContainerVanished(String),

    #[error("{program} failed: {message}")]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("Deploy service is shutting down.")]
    ShuttingDown,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl DeployerError {
    /// HTTP status used when this error reaches the API surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeployerError::Validation(_) => StatusCode::BAD_REQUEST,
            DeployerError::NotFound(_) | DeployerError::ContainerVanished(_) => {
                StatusCode::NOT_FOUND
            }
            DeployerError::ContainerEngine { .. } => StatusCode::BAD_GATEWAY,
            DeployerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeployerError::Cancelled)
    }
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}
