use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A newline-delimited JSON dataset on disk.
pub struct DatasetFile {
    path: PathBuf,
}

impl DatasetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses every non-blank line as a JSON value.
    ///
    /// Records are returned untyped; shape checks belong to the validator.
    pub fn load(&self) -> Result<Vec<Value>> {
        info!("Reading training data from: {:?}", self.path);
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read file: {:?}", self.path))?;

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line)
                .with_context(|| format!("Malformed JSON on line {} of {:?}", index + 1, self.path))?;
            records.push(record);
        }
        debug!("Parsed {} records from {:?}", records.len(), self.path);
        Ok(records)
    }
}
