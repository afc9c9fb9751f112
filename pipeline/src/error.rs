use std::path::PathBuf;
use thiserror::Error;

use estimation_remote::RemoteError;
use estimation_vision::VisionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Failed to write {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
