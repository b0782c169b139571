use crate::core::orchestrator::DEFAULT_LIST_LIMIT;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Fine-tune GPT models with the OpenAI API", long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[clap(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate training data format
    Validate {
        /// Path to training data file (defaults to fine_tuning.training_file)
        #[clap(long)]
        file: Option<PathBuf>,
    },
    /// Upload training file to OpenAI
    Upload {
        #[clap(long)]
        file: Option<PathBuf>,
    },
    /// Create a fine-tuning job
    Create {
        #[clap(long)]
        training_file_id: String,

        #[clap(long)]
        validation_file_id: Option<String>,

        /// Wait for the job to finish and download its result files
        #[clap(long)]
        wait: bool,

        #[clap(flatten)]
        polling: PollingArgs,
    },
    /// Get fine-tuning job status
    Status {
        #[clap(long)]
        job_id: String,
    },
    /// List uploaded files
    ListFiles {
        #[clap(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// List fine-tuning jobs
    ListJobs {
        #[clap(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Chat with a model
    Chat {
        #[clap(long)]
        model: String,

        #[clap(long)]
        message: String,

        #[clap(long)]
        system: Option<String>,
    },
    /// Compare base model vs fine-tuned model
    Compare {
        /// Base model name (defaults to fine_tuning.model)
        #[clap(long)]
        base_model: Option<String>,

        #[clap(long)]
        finetuned_model: String,

        #[clap(long, required_unless_present = "interactive")]
        message: Option<String>,

        #[clap(long)]
        system: Option<String>,

        /// Append each comparison to <results_dir>/comparisons.jsonl
        #[clap(long)]
        save: bool,

        /// Keep prompting for messages and show recent history
        #[clap(long)]
        interactive: bool,
    },
    /// Run the complete fine-tuning workflow
    Run {
        #[clap(long)]
        file: Option<PathBuf>,

        #[clap(flatten)]
        polling: PollingArgs,
    },
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct PollingArgs {
    /// Seconds between status checks (defaults to fine_tuning.poll_interval_secs)
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Stop waiting after this many seconds
    #[clap(long)]
    pub timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_with_wait() {
        let args = Args::try_parse_from([
            "finetuner", "create", "--training-file-id", "file-1", "--wait", "--poll-interval", "5",
        ])
        .unwrap();

        match args.command {
            Command::Create { training_file_id, wait, polling, validation_file_id } => {
                assert_eq!(training_file_id, "file-1");
                assert!(wait);
                assert_eq!(polling.poll_interval, Some(5));
                assert_eq!(validation_file_id, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn poll_interval_must_be_positive() {
        assert!(Args::try_parse_from([
            "finetuner", "run", "--poll-interval", "0",
        ])
        .is_err());
        assert!(Args::try_parse_from(["finetuner", "run", "--poll-interval", "1"]).is_ok());
    }

    #[test]
    fn create_requires_training_file_id() {
        assert!(Args::try_parse_from(["finetuner", "create"]).is_err());
    }

    #[test]
    fn compare_needs_message_unless_interactive() {
        assert!(Args::try_parse_from(["finetuner", "compare", "--finetuned-model", "ft:x"]).is_err());
        assert!(Args::try_parse_from([
            "finetuner", "compare", "--finetuned-model", "ft:x", "--interactive",
        ])
        .is_ok());
    }

    #[test]
    fn list_limit_defaults_to_twenty() {
        let args = Args::try_parse_from(["finetuner", "list-jobs", "--config", "other.yaml"]).unwrap();
        assert!(matches!(args.command, Command::ListJobs { limit: 20 }));
        assert_eq!(args.config, PathBuf::from("other.yaml"));
    }
}
