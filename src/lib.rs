pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;

pub use crate::error::{FineTuneError, FineTuneResult};
