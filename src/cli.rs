//! CLI arguments and subcommands for devstat-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parses a config-file log level string.
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "devstat-exporter",
    about = "Prometheus exporter for FreeBSD devstat disk I/O statistics",
    long_about = "Prometheus exporter for FreeBSD devstat disk I/O statistics.\n\n\
                  Polls libdevstat on every scrape and exposes per-device byte, transfer, \
                  duration, busy time, queue, throughput and latency counters.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Metric namespace prefix (default: node)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Path to JSON test data file (uses synthetic data instead of libdevstat)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal scrape_collector_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll device statistics and print them
    Check {
        /// Number of polls
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print every observation instead of a per-device summary
        #[arg(long)]
        verbose: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Driver names to generate devices for (comma-separated)
        #[arg(long, default_value = "ada,da,nvd")]
        drivers: String,

        /// Number of units per driver
        #[arg(long, default_value_t = 2)]
        units: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_flags() {
        let args = Args::parse_from([
            "devstat-exporter",
            "-p",
            "9200",
            "--namespace",
            "freebsd",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.port, Some(9200));
        assert_eq!(args.namespace.as_deref(), Some("freebsd"));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_generate_testdata() {
        let args = Args::parse_from(["devstat-exporter", "generate-testdata", "--units", "4"]);
        match args.command {
            Some(Commands::GenerateTestdata { units, drivers, .. }) => {
                assert_eq!(units, 4);
                assert_eq!(drivers, "ada,da,nvd");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_log_level_from_config() {
        assert_eq!(LogLevel::from_config("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_config("verbose"), None);
    }
}
