pub mod input;
pub mod openai;
pub mod output;
pub mod transport;
