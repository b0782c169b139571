use crate::core::dataset::Message;
use crate::core::job::{CreateJobRequest, FileSummary, FineTuningJob, JobSummary};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::Path;

/// Remote operations the fine-tuning lifecycle needs from a provider.
///
/// Implementations report failures as-is; callers decide whether to retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FineTuningTransport: Send + Sync {
    /// Uploads a dataset file and returns the provider's file id.
    async fn upload_file(&self, path: &Path) -> Result<String>;

    /// Submits a job and returns its id.
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String>;

    async fn get_job(&self, job_id: &str) -> Result<FineTuningJob>;

    async fn list_files(&self, limit: usize) -> Result<Vec<FileSummary>>;

    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobSummary>>;

    /// Raw file body, possibly base64 encoded by the provider.
    async fn download_file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Returns the assistant's reply text.
    async fn chat_completion(&self, model: &str, messages: &[Message]) -> Result<String>;
}
