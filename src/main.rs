use anyhow::Result;
use finetuner::cli::interface::run_cli_interface;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run_cli_interface().await
}
