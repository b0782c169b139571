pub mod comparison;
pub mod dataset;
pub mod job;
pub mod orchestrator;
pub mod validator;
