use crate::adapters::output::append_jsonl;
use crate::adapters::transport::FineTuningTransport;
use crate::core::dataset::{Message, Role};
use crate::error::{FineTuneError, FineTuneResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";
pub const DISPLAY_LIMIT: usize = 5;

/// What one side of a comparison produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutcome {
    Response(String),
    Error(String),
}

impl ModelOutcome {
    pub fn response(&self) -> Option<&str> {
        match self {
            ModelOutcome::Response(text) => Some(text),
            ModelOutcome::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ModelOutcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub system_message: String,
    pub prompt: String,
    pub base_model: String,
    pub base: ModelOutcome,
    pub finetuned_model: String,
    pub finetuned: ModelOutcome,
}

pub struct ComparisonRunner<'a, T: FineTuningTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: FineTuningTransport + ?Sized> ComparisonRunner<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Single-model chat; transport failures are returned to the caller.
    pub async fn chat(&self, model: &str, user_message: &str, system_message: &str) -> FineTuneResult<String> {
        let messages = prompt(user_message, system_message);
        self.transport
            .chat_completion(model, &messages)
            .await
            .map_err(FineTuneError::Transport)
    }

    /// Sends the same prompt to both models concurrently.
    ///
    /// Each side fails on its own: an error from one model is recorded in its outcome and the
    /// other model's answer is still returned.
    pub async fn compare(
        &self,
        base_model: &str,
        finetuned_model: &str,
        user_message: &str,
        system_message: &str,
    ) -> ComparisonResult {
        info!("Sending prompt to {} and {}", base_model, finetuned_model);
        let (base, finetuned) = futures::join!(
            self.outcome(base_model, user_message, system_message),
            self.outcome(finetuned_model, user_message, system_message),
        );

        ComparisonResult {
            system_message: system_message.to_string(),
            prompt: user_message.to_string(),
            base_model: base_model.to_string(),
            base,
            finetuned_model: finetuned_model.to_string(),
            finetuned,
        }
    }

    async fn outcome(&self, model: &str, user_message: &str, system_message: &str) -> ModelOutcome {
        match self.chat(model, user_message, system_message).await {
            Ok(text) => ModelOutcome::Response(text),
            Err(e) => {
                warn!("Model {} failed: {}", model, e);
                ModelOutcome::Error(e.to_string())
            }
        }
    }
}

fn prompt(user_message: &str, system_message: &str) -> Vec<Message> {
    vec![
        Message::new(Role::System, system_message),
        Message::new(Role::User, user_message),
    ]
}

/// Comparisons made during one session, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ComparisonHistory {
    entries: Vec<ComparisonResult>,
}

impl ComparisonHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ComparisonResult) {
        self.entries.push(result);
    }

    /// Adds a result, first appending it to `store` as a JSON line when given.
    ///
    /// If storing fails the history is left as it was.
    pub fn record(&mut self, result: ComparisonResult, store: Option<&Path>) -> FineTuneResult<()> {
        if let Some(path) = store {
            append_jsonl(path, &result)?;
        }
        self.entries.push(result);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ComparisonResult] {
        &self.entries
    }

    /// Up to `limit` entries, newest first, each paired with its 1-based position.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = (usize, &ComparisonResult)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(index, entry)| (index + 1, entry))
    }
}
