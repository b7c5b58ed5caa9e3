//! Configuration management for devstat-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use devstat_exporter::collector::{validate_namespace, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9100;

/// Default config file locations, searched in order.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/usr/local/etc/devstat-exporter.yaml",
    "/usr/local/etc/devstat-exporter.yml",
    "/etc/devstat-exporter.yaml",
    "./devstat-exporter.yaml",
    "./devstat-exporter.yml",
    "./devstat-exporter.json",
];

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Metrics
    pub namespace: Option<String>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-telemetry")]
    pub enable_telemetry: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    /// Path to JSON test data file (uses synthetic data instead of libdevstat)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            test_data_file: None,
        }
    }
}

impl Config {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.port == Some(0) {
        return Err("port must be between 1 and 65535".into());
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    validate_namespace(cfg.namespace())?;

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_config(level).is_none() {
            return Err(format!(
                "Invalid log_level '{}', expected one of off/error/warn/info/debug/trace",
                level
            )
            .into());
        }
    }

    if let Some(path) = cfg.test_data_file.as_deref() {
        if !path.exists() {
            return Err(format!("Test data file not found: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&path, &content)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses config content, picking the format from the file extension.
fn parse_config(path: &Path, content: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let cfg = Config {
            namespace: Some("node-exporter".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let cfg = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_missing_test_data_file_rejected() {
        let cfg = Config {
            test_data_file: Some(PathBuf::from("/nonexistent/devstat.json")),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_parse_each_format() {
        let yaml = parse_config(Path::new("c.yaml"), "port: 9300\nnamespace: bsd\n").unwrap();
        assert_eq!(yaml.port, Some(9300));
        assert_eq!(yaml.namespace(), "bsd");

        let json = parse_config(Path::new("c.json"), r#"{"enable-health": false}"#).unwrap();
        assert_eq!(json.enable_health, Some(false));
        assert_eq!(json.namespace(), DEFAULT_NAMESPACE);

        let toml = parse_config(Path::new("c.toml"), "log_level = \"debug\"\n").unwrap();
        assert_eq!(toml.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: 9300\nnamespace: fromfile").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::parse_from([
            "devstat-exporter",
            "-c",
            path.as_str(),
            "--namespace",
            "fromcli",
            "--disable-health",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.port, Some(9300));
        assert_eq!(cfg.namespace(), "fromcli");
        assert_eq!(cfg.enable_health, Some(false));
    }

    #[test]
    fn test_render_round_trips_defaults() {
        let rendered = render_config(&Config::default(), ConfigFormat::Yaml).unwrap();
        let parsed = parse_config(Path::new("x.yaml"), &rendered).unwrap();
        assert_eq!(parsed.port, Some(DEFAULT_PORT));
        assert_eq!(parsed.namespace(), DEFAULT_NAMESPACE);
    }
}
