use crate::error::FineTuneResult;
use crate::utils::lib::output_filename;
use chrono::{DateTime, Local};
use log::{debug, info};
use serde::Serialize;
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_RESULTS_DIR: &str = "results";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Persists downloaded job artifacts as `{category}_{timestamp}.{extension}`.
///
/// Names have second granularity, so two writes of the same category within one second
/// collide. A collision is reported as an I/O error instead of overwriting the earlier file.
pub struct ResultArtifactWriter<C: Clock = SystemClock> {
    dir: PathBuf,
    clock: C,
}

impl ResultArtifactWriter<SystemClock> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, SystemClock)
    }
}

impl<C: Clock> ResultArtifactWriter<C> {
    pub fn with_clock(dir: impl Into<PathBuf>, clock: C) -> Self {
        Self { dir: dir.into(), clock }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the results directory if absent; safe to race with other writers.
    pub fn ensure_dir(&self) -> FineTuneResult<&Path> {
        create_dir_all(&self.dir)?;
        Ok(&self.dir)
    }

    pub fn write(&self, content: &[u8], category: &str, extension: &str) -> FineTuneResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(output_filename(category, extension, &self.clock.now()));

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(content)?;
        file.flush()?;

        info!("Result file saved to: {:?}", path);
        Ok(path)
    }
}

/// Appends one record as a JSON line, creating the file and its parent directory if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> FineTuneResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let json = serde_json::to_string(record)?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;
    debug!("Appended record to {:?}", path);
    Ok(())
}
