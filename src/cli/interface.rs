use super::args::*;
use crate::adapters::input::DatasetFile;
use crate::adapters::openai::OpenAI;
use crate::adapters::output::ResultArtifactWriter;
use crate::adapters::transport::FineTuningTransport;
use crate::config::Settings;
use crate::core::comparison::*;
use crate::core::dataset::TrainingExample;
use crate::core::job::{FineTuningJob, JobState};
use crate::core::orchestrator::JobOrchestrator;
use crate::core::validator::{DatasetValidator, ValidationReport};
use crate::error::{FineTuneError, FineTuneResult};
use crate::utils::input::input_prompt_stdin;
use crate::utils::lib::*;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

pub const COMPARISONS_FILE: &str = "comparisons.jsonl";
const RULE_WIDTH: usize = 60;

pub async fn run_cli_interface() -> Result<ExitCode> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    match args.command {
        Command::Validate { file } => cmd_validate(&settings, file),
        Command::Upload { file } => {
            let transport = connect(&settings)?;
            cmd_upload(&transport, &settings, file).await
        }
        Command::Create { training_file_id, validation_file_id, wait, polling } => {
            let transport = connect(&settings)?;
            cmd_create(&transport, &settings, &training_file_id, validation_file_id.as_deref(), wait, polling).await
        }
        Command::Status { job_id } => {
            let transport = connect(&settings)?;
            cmd_status(&transport, &job_id).await
        }
        Command::ListFiles { limit } => {
            let transport = connect(&settings)?;
            cmd_list_files(&transport, limit).await
        }
        Command::ListJobs { limit } => {
            let transport = connect(&settings)?;
            cmd_list_jobs(&transport, limit).await
        }
        Command::Chat { model, message, system } => {
            let transport = connect(&settings)?;
            cmd_chat(&transport, &model, &message, system.as_deref()).await
        }
        Command::Compare { base_model, finetuned_model, message, system, save, interactive } => {
            let transport = connect(&settings)?;
            let request = CompareRequest {
                base_model,
                finetuned_model,
                message,
                system,
                save,
                interactive,
            };
            cmd_compare(&transport, &settings, request).await
        }
        Command::Run { file, polling } => {
            let transport = connect(&settings)?;
            cmd_run(&transport, &settings, file, polling).await
        }
    }
}

fn connect(settings: &Settings) -> Result<OpenAI> {
    OpenAI::from_settings(&settings.openai).context("Failed to set up OpenAI client")
}

fn training_file(file: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    file.or_else(|| settings.fine_tuning.training_file.clone())
        .context("No training file specified; pass --file or set fine_tuning.training_file")
}

fn cmd_validate(settings: &Settings, file: Option<PathBuf>) -> Result<ExitCode> {
    let path = training_file(file, settings)?;
    println!("Validating data format: {}", path.display());

    let Some(examples) = load_examples(&path)? else {
        return Ok(ExitCode::FAILURE);
    };
    println!("\nNo errors found. {} examples validated successfully.", examples.len());
    Ok(ExitCode::SUCCESS)
}

/// Loads and checks a dataset. `None` means the report has already been printed.
fn load_examples(path: &Path) -> Result<Option<Vec<TrainingExample>>> {
    let records = DatasetFile::new(path).load()
        .context("Failed to load training data")?;
    match DatasetValidator::check(&records) {
        Ok(examples) => Ok(Some(examples)),
        Err(FineTuneError::Validation(report)) => {
            print_report(&report);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn poll_interval(settings: &Settings, polling: PollingArgs) -> FineTuneResult<Duration> {
    match polling.poll_interval {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => settings.fine_tuning.poll_interval(),
    }
}

async fn cmd_upload<T: FineTuningTransport + ?Sized>(
    transport: &T,
    settings: &Settings,
    file: Option<PathBuf>,
) -> Result<ExitCode> {
    let path = training_file(file, settings)?;
    let file_id = JobOrchestrator::new(transport).upload(&path).await?;
    println!("File uploaded successfully. File ID: {}", file_id);
    println!("\nUse this file ID in your fine-tuning job: {}", file_id);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_create<T: FineTuningTransport + ?Sized>(
    transport: &T,
    settings: &Settings,
    training_file_id: &str,
    validation_file_id: Option<&str>,
    wait: bool,
    polling: PollingArgs,
) -> Result<ExitCode> {
    let interval = if wait { Some(poll_interval(settings, polling)?) } else { None };
    let orchestrator = JobOrchestrator::new(transport);
    let job_id = orchestrator
        .submit(training_file_id, &settings.fine_tuning, validation_file_id)
        .await?;
    println!("Fine-tuning job created. Job ID: {}", job_id);

    let Some(interval) = interval else {
        return Ok(ExitCode::SUCCESS);
    };
    let job = wait_for_job(&orchestrator, &job_id, interval, polling.timeout).await?;
    finish_job(&orchestrator, &job, settings).await
}

async fn cmd_status<T: FineTuningTransport + ?Sized>(transport: &T, job_id: &str) -> Result<ExitCode> {
    let job = JobOrchestrator::new(transport).fetch_status(job_id).await?;
    print_job(&job);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list_files<T: FineTuningTransport + ?Sized>(transport: &T, limit: usize) -> Result<ExitCode> {
    let files = JobOrchestrator::new(transport).list_files(limit).await?;
    println!("\nFiles (showing up to {}):", limit);
    for (i, f) in files.iter().enumerate() {
        println!(
            "  {}. {} - {} ({}, {})",
            i + 1,
            f.id,
            f.filename,
            f.status.as_deref().unwrap_or("unknown"),
            format_unix_time(f.created_at)
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list_jobs<T: FineTuningTransport + ?Sized>(transport: &T, limit: usize) -> Result<ExitCode> {
    let jobs = JobOrchestrator::new(transport).list_jobs(limit).await?;
    println!("\nFine-tuning Jobs (showing up to {}):", limit);
    for (i, job) in jobs.iter().enumerate() {
        let model_info = job.fine_tuned_model.as_deref().unwrap_or("pending");
        println!("  {}. {} - {} - {}", i + 1, job.id, job.status, model_info);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_chat<T: FineTuningTransport + ?Sized>(
    transport: &T,
    model: &str,
    message: &str,
    system: Option<&str>,
) -> Result<ExitCode> {
    let response = ComparisonRunner::new(transport)
        .chat(model, message, system.unwrap_or(DEFAULT_SYSTEM_MESSAGE))
        .await?;
    println!("\nResponse:\n{}", response);
    Ok(ExitCode::SUCCESS)
}

pub struct CompareRequest {
    pub base_model: Option<String>,
    pub finetuned_model: String,
    pub message: Option<String>,
    pub system: Option<String>,
    pub save: bool,
    pub interactive: bool,
}

async fn cmd_compare<T: FineTuningTransport + ?Sized>(
    transport: &T,
    settings: &Settings,
    request: CompareRequest,
) -> Result<ExitCode> {
    let base_model = match request.base_model {
        Some(model) => model,
        None => settings.fine_tuning.base_model()?.to_string(),
    };
    let system = request.system.as_deref().unwrap_or(DEFAULT_SYSTEM_MESSAGE);
    let store = request.save.then(|| settings.results_dir.join(COMPARISONS_FILE));
    let runner = ComparisonRunner::new(transport);
    let mut history = ComparisonHistory::new();

    let mut all_failed = false;
    if let Some(message) = request.message.as_deref() {
        let result = runner.compare(&base_model, &request.finetuned_model, message, system).await;
        all_failed = result.base.is_error() && result.finetuned.is_error();
        print_comparison(&result);
        keep(&mut history, result, store.as_deref());
    }

    if request.interactive {
        while let Some(message) = input_prompt_stdin("\nYour message (exit to quit): ")? {
            let result = runner.compare(&base_model, &request.finetuned_model, &message, system).await;
            print_comparison(&result);
            keep(&mut history, result, store.as_deref());
            print_history(&history);
        }
        return Ok(ExitCode::SUCCESS);
    }

    Ok(if all_failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn keep(history: &mut ComparisonHistory, result: ComparisonResult, store: Option<&Path>) {
    if let Err(e) = history.record(result, store) {
        eprintln!("Failed to save comparison: {}", e);
    }
}

async fn cmd_run<T: FineTuningTransport + ?Sized>(
    transport: &T,
    settings: &Settings,
    file: Option<PathBuf>,
    polling: PollingArgs,
) -> Result<ExitCode> {
    let path = training_file(file, settings)?;
    settings.fine_tuning.base_model()?;
    let interval = poll_interval(settings, polling)?;
    let orchestrator = JobOrchestrator::new(transport);

    println!("\n=== Step 1: Validating training data ===");
    let Some(examples) = load_examples(&path)? else {
        return Ok(ExitCode::FAILURE);
    };
    println!("Validation passed. {} examples found.", examples.len());

    println!("\n=== Step 2: Uploading training file ===");
    let file_id = orchestrator.upload(&path).await?;
    println!("File ID: {}", file_id);

    println!("\n=== Step 3: Creating fine-tuning job ===");
    let job_id = orchestrator.submit(&file_id, &settings.fine_tuning, None).await?;
    println!("Job ID: {}", job_id);

    println!("\n=== Step 4: Waiting for job completion ===");
    let job = wait_for_job(&orchestrator, &job_id, interval, polling.timeout).await?;
    finish_job(&orchestrator, &job, settings).await
}

async fn wait_for_job<T: FineTuningTransport + ?Sized>(
    orchestrator: &JobOrchestrator<'_, T>,
    job_id: &str,
    interval: Duration,
    timeout: Option<u64>,
) -> Result<FineTuningJob> {
    let spinner = create_spinner(&format!("Waiting for job {}", job_id))
        .context("Failed to create spinner")?;
    let on_poll = |job: &FineTuningJob| {
        spinner.set_message(format!("Job {}: {}", job.id, job.status));
    };

    let result = match timeout {
        Some(secs) => {
            orchestrator
                .await_completion_within(job_id, interval, Duration::from_secs(secs), on_poll)
                .await
        }
        None => orchestrator.await_completion_with(job_id, interval, on_poll).await,
    };
    spinner.finish_and_clear();
    Ok(result?)
}

async fn finish_job<T: FineTuningTransport + ?Sized>(
    orchestrator: &JobOrchestrator<'_, T>,
    job: &FineTuningJob,
    settings: &Settings,
) -> Result<ExitCode> {
    println!("\nJob completed with status: {}", job.status);

    if job.status != JobState::Succeeded {
        let reason = job.error_detail().map(ToString::to_string).unwrap_or_else(|| "none reported".to_string());
        println!("\nJob did not succeed. Error: {}", reason);
        return Ok(ExitCode::FAILURE);
    }

    if let Some(model) = &job.fine_tuned_model {
        println!("\nFine-tuned model ready: {}", model);
    }
    if !job.result_files.is_empty() {
        println!("\n=== Downloading result files ===");
        let writer = ResultArtifactWriter::new(&settings.results_dir);
        for path in orchestrator.retrieve_result_artifacts(job, &writer).await? {
            println!("Result file saved to: {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &ValidationReport) {
    println!("\nFound errors:");
    for (category, count) in report.iter() {
        println!("  {}: {}", category, count);
    }
}

fn print_job(job: &FineTuningJob) {
    println!("\nJob Status:");
    println!("  id: {}", job.id);
    println!("  status: {}", job.status);
    println!("  model: {}", job.model);
    println!("  fine_tuned_model: {}", job.fine_tuned_model.as_deref().unwrap_or("-"));
    println!("  created_at: {}", format_unix_time(job.created_at));
    println!(
        "  finished_at: {}",
        job.finished_at.map(format_unix_time).unwrap_or_else(|| "-".to_string())
    );
    if let Some(error) = job.error_detail() {
        println!("  error: {}", error);
    }
    println!("  result_files: {}", job.result_files.join(", "));
}

fn print_section(title: &str) {
    println!("\n{}", "=".repeat(RULE_WIDTH));
    println!("{}", title);
    println!("{}", "=".repeat(RULE_WIDTH));
}

fn outcome_text(outcome: &ModelOutcome) -> String {
    match outcome {
        ModelOutcome::Response(text) => text.clone(),
        ModelOutcome::Error(e) => format!("[error] {}", e),
    }
}

fn print_comparison(result: &ComparisonResult) {
    print_section("PROMPT");
    println!("System: {}", result.system_message);
    println!("User: {}", result.prompt);

    print_section(&format!("BASE MODEL: {}", result.base_model));
    println!("{}", outcome_text(&result.base));

    print_section(&format!("FINE-TUNED MODEL: {}", result.finetuned_model));
    println!("{}", outcome_text(&result.finetuned));
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn print_history(history: &ComparisonHistory) {
    println!("\nComparison History (latest {}):", DISPLAY_LIMIT.min(history.len()));
    for (n, item) in history.recent(DISPLAY_LIMIT) {
        println!("  #{} - {}", n, preview(&item.prompt, 50));
        println!("     Base: {}", preview(&outcome_text(&item.base), 200));
        println!("     Fine-tuned: {}", preview(&outcome_text(&item.finetuned), 200));
    }
}
