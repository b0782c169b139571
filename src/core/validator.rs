//! Offline structural checks for chat-format fine-tuning datasets.
//!
//! The validator works on untyped JSON records so that it can report on input that does not
//! even deserialize. It counts problems per category instead of stopping at the first one, and
//! it never fails: an empty report means the dataset is safe to upload.

use crate::core::dataset::TrainingExample;
use crate::error::{FineTuneError, FineTuneResult};
use log::{debug, info};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const RECOGNIZED_KEYS: [&str; 5] = ["role", "content", "name", "function_call", "weight"];
pub const VALID_ROLES: [&str; 4] = ["system", "user", "assistant", "function"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    DataType,
    MissingMessagesList,
    MessageMissingKey,
    MessageUnrecognizedKey,
    UnrecognizedRole,
    MissingContent,
    ExampleMissingAssistantMessage,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::DataType => "data_type",
            ErrorCategory::MissingMessagesList => "missing_messages_list",
            ErrorCategory::MessageMissingKey => "message_missing_key",
            ErrorCategory::MessageUnrecognizedKey => "message_unrecognized_key",
            ErrorCategory::UnrecognizedRole => "unrecognized_role",
            ErrorCategory::MissingContent => "missing_content",
            ErrorCategory::ExampleMissingAssistantMessage => "example_missing_assistant_message",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Occurrence count per error category. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    counts: BTreeMap<ErrorCategory, usize>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ErrorCategory, usize)> + '_ {
        self.counts.iter().map(|(category, count)| (*category, *count))
    }

    fn record(&mut self, category: ErrorCategory) {
        *self.counts.entry(category).or_insert(0) += 1;
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no errors");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(category, count)| format!("{}: {}", category, count))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

pub struct DatasetValidator;

impl DatasetValidator {
    /// Scans every record and tallies structural problems.
    pub fn validate(examples: &[Value]) -> ValidationReport {
        let mut report = ValidationReport::default();

        for example in examples {
            let Some(record) = example.as_object() else {
                report.record(ErrorCategory::DataType);
                continue;
            };

            let messages = match record.get("messages") {
                Some(Value::Array(messages)) if !messages.is_empty() => messages,
                _ => {
                    report.record(ErrorCategory::MissingMessagesList);
                    continue;
                }
            };

            let empty = Map::new();
            let mut has_assistant = false;
            for message in messages {
                // A non-mapping message is judged as if it had no keys at all.
                let message = message.as_object().unwrap_or(&empty);
                check_message(message, &mut report);
                if message.get("role").and_then(Value::as_str) == Some("assistant") {
                    has_assistant = true;
                }
            }

            if !has_assistant {
                report.record(ErrorCategory::ExampleMissingAssistantMessage);
            }
        }

        if report.is_empty() {
            info!("Validated {} examples with no errors", examples.len());
        } else {
            info!(
                "Validated {} examples, found {} problems: {}",
                examples.len(),
                report.total(),
                report
            );
        }
        report
    }

    /// Validates and, when clean, converts the records into typed examples.
    ///
    /// A structurally sound record whose recognized fields carry the wrong type, such as a
    /// numeric `name`, is counted under `data_type`.
    pub fn check(examples: &[Value]) -> FineTuneResult<Vec<TrainingExample>> {
        let mut report = Self::validate(examples);
        if !report.is_empty() {
            return Err(FineTuneError::Validation(report));
        }

        let mut typed = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            match TrainingExample::deserialize(example) {
                Ok(example) => typed.push(example),
                Err(e) => {
                    debug!("Example {} has mistyped fields: {}", index + 1, e);
                    report.record(ErrorCategory::DataType);
                }
            }
        }

        if report.is_empty() {
            Ok(typed)
        } else {
            info!("{} examples have mistyped fields", report.total());
            Err(FineTuneError::Validation(report))
        }
    }
}

fn check_message(message: &Map<String, Value>, report: &mut ValidationReport) {
    if !message.contains_key("role") || !message.contains_key("content") {
        report.record(ErrorCategory::MessageMissingKey);
    }

    if message.keys().any(|k| !RECOGNIZED_KEYS.contains(&k.as_str())) {
        debug!("Message carries unrecognized keys: {:?}", message.keys().collect::<Vec<_>>());
        report.record(ErrorCategory::MessageUnrecognizedKey);
    }

    let role = message.get("role").and_then(Value::as_str);
    if !role.is_some_and(|r| VALID_ROLES.contains(&r)) {
        report.record(ErrorCategory::UnrecognizedRole);
    }

    let content = message.get("content").filter(|c| !c.is_null());
    let function_call = message.get("function_call");
    let nothing_to_say = !content.is_some_and(is_truthy) && !function_call.is_some_and(is_truthy);
    let not_text = content.is_some_and(|c| !c.is_string());
    if nothing_to_say || not_text {
        report.record(ErrorCategory::MissingContent);
    }
}

/// JSON truthiness: null, false, zero, and empty strings, arrays or objects are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
