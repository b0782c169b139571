use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state reported by the provider for a fine-tuning job.
///
/// `validating_files -> queued -> running -> {succeeded | failed | cancelled}`.
/// States the provider adds later deserialize as `Unknown` and are treated as in-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    ValidatingFiles,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::ValidatingFiles => "validating_files",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

impl JobError {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none() && self.param.is_none()
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{}: {}", code, message),
            (None, Some(message)) => f.write_str(message),
            (Some(code), None) => f.write_str(code),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

/// Snapshot of a fine-tuning job as last reported by the provider.
///
/// A plain value: it never talks to the transport, so a fresher view means fetching again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuningJob {
    pub id: String,
    pub model: String,
    pub status: JobState,
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub error: Option<JobError>,
    #[serde(default)]
    pub result_files: Vec<String>,
}

impl FineTuningJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The provider sends an all-null error object for healthy jobs.
    pub fn error_detail(&self) -> Option<&JobError> {
        self.error.as_ref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub model: String,
    pub status: JobState,
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: String,
    pub filename: String,
    pub created_at: i64,
    pub purpose: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A hyperparameter that is either left to the provider (`"auto"`) or pinned to a value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Tunable<T> {
    #[default]
    Auto,
    Value(T),
}

impl<T: Copy> Tunable<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Tunable::Auto => None,
            Tunable::Value(v) => Some(*v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Tunable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Value(T),
            Keyword(String),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Value(v) => Ok(Tunable::Value(v)),
            Raw::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(Tunable::Auto),
            Raw::Keyword(other) => Err(de::Error::custom(format!(
                "expected a number or \"auto\", got {:?}",
                other
            ))),
        }
    }
}

impl<T: Serialize> Serialize for Tunable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tunable::Auto => serializer.serialize_str("auto"),
            Tunable::Value(v) => v.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    #[serde(alias = "epochs")]
    pub n_epochs: Tunable<u32>,
    pub batch_size: Tunable<u32>,
    pub learning_rate_multiplier: Tunable<f64>,
}

impl Hyperparameters {
    /// Only the explicitly pinned values, or `None` when everything is `"auto"`.
    pub fn overrides(&self) -> Option<HyperparameterOverrides> {
        let overrides = HyperparameterOverrides {
            n_epochs: self.n_epochs.value(),
            batch_size: self.batch_size.value(),
            learning_rate_multiplier: self.learning_rate_multiplier.value(),
        };
        if overrides == HyperparameterOverrides::default() {
            None
        } else {
            Some(overrides)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate_multiplier: Option<f64>,
}

/// Body of a job creation call; absent optionals are left out of the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub training_file: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperparameters: Option<HyperparameterOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::ValidatingFiles.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[test]
    fn unknown_provider_state_is_not_terminal() {
        let state: JobState = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(state, JobState::Unknown);
    }

    #[test]
    fn job_parses_provider_payload() {
        let job: FineTuningJob = serde_json::from_value(json!({
            "object": "fine_tuning.job",
            "id": "ftjob-abc",
            "model": "gpt-4o-mini-2024-07-18",
            "status": "succeeded",
            "fine_tuned_model": "ft:gpt-4o-mini:org::xyz",
            "created_at": 1_700_000_000,
            "finished_at": 1_700_000_600,
            "error": {"code": null, "message": null, "param": null},
            "result_files": ["file-res"],
            "trained_tokens": 1234
        }))
        .unwrap();

        assert_eq!(job.status, JobState::Succeeded);
        assert_eq!(job.fine_tuned_model.as_deref(), Some("ft:gpt-4o-mini:org::xyz"));
        assert_eq!(job.result_files, vec!["file-res".to_string()]);
        assert!(job.error_detail().is_none());
    }

    #[test]
    fn job_error_detail_is_kept_when_populated() {
        let job: FineTuningJob = serde_json::from_value(json!({
            "id": "ftjob-abc",
            "model": "gpt-4o-mini",
            "status": "failed",
            "created_at": 1,
            "error": {"code": "invalid_training_file", "message": "bad line 3"}
        }))
        .unwrap();

        let detail = job.error_detail().unwrap();
        assert_eq!(detail.to_string(), "invalid_training_file: bad line 3");
        assert!(job.result_files.is_empty());
    }

    #[test]
    fn tunable_accepts_auto_and_numbers() {
        let hp: Hyperparameters = serde_json::from_value(json!({
            "epochs": "auto",
            "batch_size": 4,
            "learning_rate_multiplier": 0.5
        }))
        .unwrap();

        assert_eq!(hp.n_epochs, Tunable::Auto);
        assert_eq!(hp.batch_size, Tunable::Value(4));
        assert_eq!(hp.learning_rate_multiplier, Tunable::Value(0.5));
    }

    #[test]
    fn tunable_rejects_other_keywords() {
        let err = serde_json::from_value::<Hyperparameters>(json!({"batch_size": "large"}));
        assert!(err.is_err());
    }

    #[test]
    fn all_auto_produces_no_overrides() {
        assert_eq!(Hyperparameters::default().overrides(), None);
    }

    #[test]
    fn request_omits_absent_fields() {
        let request = CreateJobRequest {
            training_file: "file-1".to_string(),
            model: "gpt-4o-mini".to_string(),
            hyperparameters: Some(HyperparameterOverrides {
                batch_size: Some(4),
                ..Default::default()
            }),
            validation_file: None,
            suffix: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "training_file": "file-1",
                "model": "gpt-4o-mini",
                "hyperparameters": {"batch_size": 4}
            })
        );
    }
}
