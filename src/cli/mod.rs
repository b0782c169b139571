pub mod args;
pub mod interface;
