use crate::core::validator::ValidationReport;
use std::time::Duration;
use thiserror::Error;

pub type FineTuneResult<T> = std::result::Result<T, FineTuneError>;

#[derive(Debug, Error)]
pub enum FineTuneError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dataset failed validation: {0}")]
    Validation(ValidationReport),

    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),

    #[error("failed to write result artifact: {0}")]
    ArtifactWrite(String),

    #[error("gave up waiting for job {job_id} after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
