//! Process configuration.

pub mod cli;

pub use cli::Cli;
