use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::future::Future;
use std::io;
use tokio::time::{sleep, Duration};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `{category}_{timestamp}.{extension}` with second granularity.
pub fn output_filename<Tz: TimeZone>(category: &str, extension: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.{}", category, now.format(TIMESTAMP_FORMAT), extension)
}

/// Renders a provider unix timestamp in local time.
pub fn format_unix_time(secs: i64) -> String {
    match Local.timestamp_opt(secs, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

pub fn create_spinner(message: &str) -> Result<ProgressBar, io::Error> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

pub async fn retry<F, Fut, T>(
    max_retries: u32,
    initial_delay: Duration,
    mut task: F
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    let mut delay = initial_delay;

    loop {
        match task().await {
            Ok(result) => return Ok(result),
            Err(e) if retries >= max_retries => {
                return Err(e).context(format!("Task failed after {} retries", max_retries))
            },
            Err(e) => {
                warn!("Task failed: {:#}. Retrying in {:?}...", e, delay);
                sleep(delay).await;
                retries += 1;
                delay *= 2; // Exponential backoff
            }
        }
    }
}
