//! CLI command implementations for devstat-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Poll device statistics and print them
//! - `config`: Configuration file generation
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
