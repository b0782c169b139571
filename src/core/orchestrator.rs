//! Drives a fine-tuning job from an uploaded file to a usable model id.
//!
//! The orchestrator never changes job state on its own. It submits, then observes the states
//! the provider reports until one of them is terminal.

use crate::adapters::output::{Clock, ResultArtifactWriter};
use crate::adapters::transport::FineTuningTransport;
use crate::config::FineTuningSettings;
use crate::core::job::{CreateJobRequest, FileSummary, FineTuningJob, JobState, JobSummary};
use crate::error::{FineTuneError, FineTuneResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const METRICS_CATEGORY: &str = "training_metrics";
pub const METRICS_EXTENSION: &str = "csv";

pub struct JobOrchestrator<'a, T: FineTuningTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: FineTuningTransport + ?Sized> JobOrchestrator<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    pub async fn upload(&self, path: &Path) -> FineTuneResult<String> {
        info!("Uploading training file: {:?}", path);
        self.transport.upload_file(path).await.map_err(FineTuneError::Transport)
    }

    /// Builds the creation request from settings and submits it.
    ///
    /// Hyperparameters left at `"auto"` are omitted from the request.
    pub async fn submit(
        &self,
        training_file_id: &str,
        settings: &FineTuningSettings,
        validation_file_id: Option<&str>,
    ) -> FineTuneResult<String> {
        let request = build_request(training_file_id, settings, validation_file_id)?;
        info!("Creating fine-tuning job with model: {}", request.model);
        let job_id = self
            .transport
            .create_job(&request)
            .await
            .map_err(FineTuneError::Transport)?;
        info!("Fine-tuning job created. Job ID: {}", job_id);
        Ok(job_id)
    }

    pub async fn fetch_status(&self, job_id: &str) -> FineTuneResult<FineTuningJob> {
        self.transport.get_job(job_id).await.map_err(FineTuneError::Transport)
    }

    /// Polls until the job reaches a terminal state. Never gives up on its own.
    pub async fn await_completion(
        &self,
        job_id: &str,
        poll_interval: Duration,
    ) -> FineTuneResult<FineTuningJob> {
        self.await_completion_with(job_id, poll_interval, |_| {}).await
    }

    /// Like [`Self::await_completion`], calling `on_poll` with every observed snapshot.
    ///
    /// A failed status fetch ends the wait with that error; it is not retried. A zero interval
    /// is rejected before the first fetch.
    pub async fn await_completion_with<F>(
        &self,
        job_id: &str,
        poll_interval: Duration,
        mut on_poll: F,
    ) -> FineTuneResult<FineTuningJob>
    where
        F: FnMut(&FineTuningJob) + Send,
    {
        if poll_interval.is_zero() {
            return Err(FineTuneError::Configuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        info!("Waiting for job {} to complete...", job_id);
        loop {
            let job = self.fetch_status(job_id).await?;
            info!("Job {} status: {}", job_id, job.status);
            on_poll(&job);

            if job.is_terminal() {
                return Ok(job);
            }
            sleep(poll_interval).await;
        }
    }

    /// Bounded variant of [`Self::await_completion_with`].
    ///
    /// On deadline the polling future is dropped, which also abandons any in-flight fetch.
    pub async fn await_completion_within<F>(
        &self,
        job_id: &str,
        poll_interval: Duration,
        deadline: Duration,
        on_poll: F,
    ) -> FineTuneResult<FineTuningJob>
    where
        F: FnMut(&FineTuningJob) + Send,
    {
        match timeout(deadline, self.await_completion_with(job_id, poll_interval, on_poll)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Stopped waiting for job {} after {:?}", job_id, deadline);
                Err(FineTuneError::Timeout { job_id: job_id.to_string(), waited: deadline })
            }
        }
    }

    /// Downloads every result file of a succeeded job into the writer's directory.
    ///
    /// Files already written stay on disk if a later one fails.
    pub async fn retrieve_result_artifacts<C: Clock>(
        &self,
        job: &FineTuningJob,
        writer: &ResultArtifactWriter<C>,
    ) -> FineTuneResult<Vec<PathBuf>> {
        if job.status != JobState::Succeeded {
            warn!("Job {} is {}, no result files to retrieve", job.id, job.status);
            return Ok(Vec::new());
        }

        let mut written = Vec::with_capacity(job.result_files.len());
        for (index, file_id) in job.result_files.iter().enumerate() {
            let raw = self
                .transport
                .download_file_content(file_id)
                .await
                .map_err(FineTuneError::Transport)?;
            let text = decode_artifact(&raw).map_err(|reason| {
                FineTuneError::ArtifactWrite(format!("result file {}: {}", file_id, reason))
            })?;

            let category = if index == 0 {
                METRICS_CATEGORY.to_string()
            } else {
                format!("{}_{}", METRICS_CATEGORY, index + 1)
            };
            let path = writer
                .write(text.as_bytes(), &category, METRICS_EXTENSION)
                .map_err(|e| FineTuneError::ArtifactWrite(format!("result file {}: {}", file_id, e)))?;
            written.push(path);
        }
        Ok(written)
    }

    pub async fn list_files(&self, limit: usize) -> FineTuneResult<Vec<FileSummary>> {
        self.transport.list_files(limit).await.map_err(FineTuneError::Transport)
    }

    pub async fn list_jobs(&self, limit: usize) -> FineTuneResult<Vec<JobSummary>> {
        self.transport.list_jobs(limit).await.map_err(FineTuneError::Transport)
    }
}

pub fn build_request(
    training_file_id: &str,
    settings: &FineTuningSettings,
    validation_file_id: Option<&str>,
) -> FineTuneResult<CreateJobRequest> {
    let model = settings.base_model()?.to_string();
    let validation_file = validation_file_id
        .map(str::to_string)
        .or_else(|| settings.validation_file.clone())
        .filter(|id| !id.is_empty());
    let suffix = settings.suffix.clone().filter(|s| !s.is_empty());

    Ok(CreateJobRequest {
        training_file: training_file_id.to_string(),
        model,
        hyperparameters: settings.hyperparameters.overrides(),
        validation_file,
        suffix,
    })
}

/// Result files usually arrive base64 encoded; plain bodies pass through unchanged.
///
/// A decoding is only kept when it yields text, so plain text that happens to be valid
/// base64 alphabet is not mangled into binary.
fn decode_artifact(raw: &[u8]) -> Result<String, String> {
    let compact: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    if let Some(text) = STANDARD
        .decode(&compact)
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
    {
        return Ok(text);
    }
    String::from_utf8(raw.to_vec()).map_err(|e| format!("content is not valid UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::output::FixedClock;
    use crate::adapters::transport::MockFineTuningTransport;
    use crate::core::job::{Hyperparameters, HyperparameterOverrides, Tunable};
    use chrono::{Local, TimeZone};
    use mockall::predicate::eq;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn settings() -> FineTuningSettings {
        FineTuningSettings { model: Some("gpt-4o-mini".to_string()), ..Default::default() }
    }

    fn job(status: JobState) -> FineTuningJob {
        FineTuningJob {
            id: "ftjob-1".to_string(),
            model: "gpt-4o-mini".to_string(),
            status,
            fine_tuned_model: None,
            created_at: 1_700_000_000,
            finished_at: None,
            error: None,
            result_files: Vec::new(),
        }
    }

    fn writer(dir: &Path) -> ResultArtifactWriter<FixedClock> {
        ResultArtifactWriter::with_clock(
            dir,
            FixedClock(Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        )
    }

    #[test]
    fn auto_hyperparameters_are_left_out() {
        let settings = FineTuningSettings {
            hyperparameters: Hyperparameters {
                n_epochs: Tunable::Auto,
                batch_size: Tunable::Value(4),
                learning_rate_multiplier: Tunable::Auto,
            },
            ..settings()
        };

        let request = build_request("file-1", &settings, None).unwrap();
        assert_eq!(
            request.hyperparameters,
            Some(HyperparameterOverrides { batch_size: Some(4), ..Default::default() })
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap()["hyperparameters"],
            serde_json::json!({"batch_size": 4})
        );
    }

    #[test]
    fn request_merges_optional_fields() {
        let settings = FineTuningSettings {
            suffix: Some("support".to_string()),
            validation_file: Some("file-from-config".to_string()),
            ..settings()
        };

        let request = build_request("file-1", &settings, Some("file-val")).unwrap();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.validation_file.as_deref(), Some("file-val"));
        assert_eq!(request.suffix.as_deref(), Some("support"));
        assert_eq!(request.hyperparameters, None);

        let request = build_request("file-1", &settings, None).unwrap();
        assert_eq!(request.validation_file.as_deref(), Some("file-from-config"));
    }

    #[tokio::test]
    async fn submit_without_model_fails_before_any_call() {
        let transport = MockFineTuningTransport::new();
        let orchestrator = JobOrchestrator::new(&transport);

        let err = orchestrator
            .submit("file-1", &FineTuningSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FineTuneError::Configuration(_)));
    }

    #[tokio::test]
    async fn submit_sends_built_request() {
        let mut transport = MockFineTuningTransport::new();
        transport
            .expect_create_job()
            .withf(|request| request.training_file == "file-1" && request.model == "gpt-4o-mini")
            .times(1)
            .returning(|_| Ok("ftjob-1".to_string()));
        let orchestrator = JobOrchestrator::new(&transport);

        let job_id = orchestrator.submit("file-1", &settings(), None).await.unwrap();
        assert_eq!(job_id, "ftjob-1");
    }

    #[tokio::test]
    async fn submit_surfaces_transport_errors() {
        let mut transport = MockFineTuningTransport::new();
        transport
            .expect_create_job()
            .returning(|_| Err(anyhow::anyhow!("401 unauthorized")));
        let orchestrator = JobOrchestrator::new(&transport);

        let err = orchestrator.submit("file-1", &settings(), None).await.unwrap_err();
        assert!(matches!(err, FineTuneError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_first_observation_returns_after_one_fetch() {
        let mut transport = MockFineTuningTransport::new();
        transport
            .expect_get_job()
            .with(eq("ftjob-1"))
            .times(1)
            .returning(|_| Ok(job(JobState::Failed)));
        let orchestrator = JobOrchestrator::new(&transport);

        let started = Instant::now();
        let finished = orchestrator
            .await_completion("ftjob-1", Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(finished.status, JobState::Failed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_once_per_interval_until_terminal() {
        let interval = Duration::from_secs(30);
        let succeeds_at = Duration::from_secs(75);
        let queued_until = Duration::from_secs(20);
        let started = Instant::now();
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut transport = MockFineTuningTransport::new();
        let counter = Arc::clone(&fetches);
        transport.expect_get_job().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let elapsed = started.elapsed();
            let status = if elapsed >= succeeds_at {
                JobState::Succeeded
            } else if elapsed >= queued_until {
                JobState::Running
            } else {
                JobState::Queued
            };
            Ok(job(status))
        });
        let orchestrator = JobOrchestrator::new(&transport);

        let mut observed = Vec::new();
        let finished = orchestrator
            .await_completion_with("ftjob-1", interval, |j| observed.push(j.status))
            .await
            .unwrap();

        // Fetches at t = 0, 30, 60, 90: ceil(75 / 30) waits, plus the immediate first look.
        let waits = (succeeds_at.as_secs() + interval.as_secs() - 1) / interval.as_secs();
        assert_eq!(finished.status, JobState::Succeeded);
        assert_eq!(fetches.load(Ordering::SeqCst) as u64, waits + 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= interval * waits as u32);
        assert!(elapsed < interval * waits as u32 + Duration::from_secs(1));
        assert_eq!(
            observed,
            vec![JobState::Queued, JobState::Running, JobState::Running, JobState::Succeeded]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_fetch_propagates_immediately() {
        let mut transport = MockFineTuningTransport::new();
        let mut calls = 0;
        transport.expect_get_job().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(job(JobState::ValidatingFiles))
            } else {
                Err(anyhow::anyhow!("connection reset"))
            }
        });
        let orchestrator = JobOrchestrator::new(&transport);

        let err = orchestrator
            .await_completion("ftjob-1", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, FineTuneError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_refused_without_polling() {
        let mut transport = MockFineTuningTransport::new();
        transport.expect_get_job().times(0);
        let orchestrator = JobOrchestrator::new(&transport);

        let err = orchestrator
            .await_completion("ftjob-1", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, FineTuneError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_endless_wait_into_timeout() {
        let mut transport = MockFineTuningTransport::new();
        transport.expect_get_job().returning(|_| Ok(job(JobState::Running)));
        let orchestrator = JobOrchestrator::new(&transport);

        let err = orchestrator
            .await_completion_within(
                "ftjob-1",
                Duration::from_secs(30),
                Duration::from_secs(100),
                |_| {},
            )
            .await
            .unwrap_err();

        match err {
            FineTuneError::Timeout { job_id, waited } => {
                assert_eq!(job_id, "ftjob-1");
                assert_eq!(waited, Duration::from_secs(100));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn retrieves_and_decodes_result_files() {
        let mut transport = MockFineTuningTransport::new();
        transport
            .expect_download_file_content()
            .with(eq("file-a"))
            .returning(|_| Ok(STANDARD.encode("step,train_loss\n1,0.9\n").into_bytes()));
        transport
            .expect_download_file_content()
            .with(eq("file-b"))
            .returning(|_| Ok(b"step,valid_loss\n1,1.1\n".to_vec()));
        let orchestrator = JobOrchestrator::new(&transport);

        let dir = tempfile::tempdir().unwrap();
        let mut succeeded = job(JobState::Succeeded);
        succeeded.result_files = vec!["file-a".to_string(), "file-b".to_string()];

        let paths = orchestrator
            .retrieve_result_artifacts(&succeeded, &writer(dir.path()))
            .await
            .unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("training_metrics_20240102_030405.csv"),
                dir.path().join("training_metrics_2_20240102_030405.csv"),
            ]
        );
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "step,train_loss\n1,0.9\n");
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "step,valid_loss\n1,1.1\n");
    }

    #[tokio::test]
    async fn unsucceeded_job_has_no_artifacts() {
        let transport = MockFineTuningTransport::new();
        let orchestrator = JobOrchestrator::new(&transport);
        let dir = tempfile::tempdir().unwrap();

        let mut failed = job(JobState::Failed);
        failed.result_files = vec!["file-a".to_string()];

        let paths = orchestrator
            .retrieve_result_artifacts(&failed, &writer(dir.path()))
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn undecodable_artifact_keeps_earlier_output() {
        let mut transport = MockFineTuningTransport::new();
        transport
            .expect_download_file_content()
            .with(eq("file-a"))
            .returning(|_| Ok(STANDARD.encode("ok\n").into_bytes()));
        transport
            .expect_download_file_content()
            .with(eq("file-b"))
            .returning(|_| Ok(vec![0xff, 0xfe, 0x00]));
        let orchestrator = JobOrchestrator::new(&transport);

        let dir = tempfile::tempdir().unwrap();
        let mut succeeded = job(JobState::Succeeded);
        succeeded.result_files = vec!["file-a".to_string(), "file-b".to_string()];

        let err = orchestrator
            .retrieve_result_artifacts(&succeeded, &writer(dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, FineTuneError::ArtifactWrite(_)));
        assert!(dir.path().join("training_metrics_20240102_030405.csv").exists());
    }

    #[test]
    fn decode_artifact_handles_both_encodings() {
        assert_eq!(decode_artifact(b"aGVsbG8=\n").unwrap(), "hello");
        assert_eq!(decode_artifact(b"a,b\n1,2\n").unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn plain_text_in_base64_alphabet_is_kept_verbatim() {
        // "datarows" decodes as base64, but to bytes that are not UTF-8.
        assert!(STANDARD.decode("datarows").is_ok());
        assert_eq!(decode_artifact(b"data\nrows\n").unwrap(), "data\nrows\n");
    }
}
