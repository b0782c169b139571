use crate::adapters::output::DEFAULT_RESULTS_DIR;
use crate::core::job::Hyperparameters;
use crate::error::{FineTuneError, FineTuneResult};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const ENV_PREFIX: &str = "FINETUNER";

/// Application settings, read from a YAML file and `FINETUNER__*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai: OpenAiSettings,
    pub fine_tuning: FineTuningSettings,
    pub results_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai: OpenAiSettings::default(),
            fine_tuning: FineTuningSettings::default(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_retries: u32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self { api_key: None, base_url: None, max_retries: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FineTuningSettings {
    pub model: Option<String>,
    pub training_file: Option<PathBuf>,
    pub validation_file: Option<String>,
    pub suffix: Option<String>,
    pub hyperparameters: Hyperparameters,
    pub poll_interval_secs: u64,
}

impl Default for FineTuningSettings {
    fn default() -> Self {
        Self {
            model: None,
            training_file: None,
            validation_file: None,
            suffix: None,
            hyperparameters: Hyperparameters::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Loads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

impl OpenAiSettings {
    pub fn resolve_api_key(&self) -> FineTuneResult<String> {
        pick_api_key(self.api_key.clone(), env::var("OPENAI_API_KEY").ok())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }
}

impl FineTuningSettings {
    pub fn base_model(&self) -> FineTuneResult<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .ok_or_else(|| {
                FineTuneError::Configuration(
                    "no base model configured; set fine_tuning.model".to_string(),
                )
            })
    }

    pub fn poll_interval(&self) -> FineTuneResult<Duration> {
        if self.poll_interval_secs == 0 {
            return Err(FineTuneError::Configuration(
                "fine_tuning.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.poll_interval_secs))
    }
}

fn pick_api_key(configured: Option<String>, from_env: Option<String>) -> FineTuneResult<String> {
    configured
        .filter(|key| !key.trim().is_empty())
        .or_else(|| from_env.filter(|key| !key.trim().is_empty()))
        .ok_or_else(|| {
            FineTuneError::Configuration(
                "OpenAI API key not found; set openai.api_key or OPENAI_API_KEY".to_string(),
            )
        })
}
