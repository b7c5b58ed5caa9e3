//! devstat-exporter - version 0.1.0
//!
//! Prometheus exporter for FreeBSD devstat disk I/O statistics.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod state;

use axum::{routing::get, Router};
use clap::Parser;
use devstat_exporter::devstat::open_provider;
use devstat_exporter::health_stats::HealthStats;
use devstat_exporter::{DevstatCollector, ExporterMetrics};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_generate_testdata};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::AppState;

/// Picks the effective log level: CLI flag, then config file, then info.
fn effective_log_level(config: &Config, args: &Args) -> LogLevel {
    args.log_level
        .or_else(|| config.log_level.as_deref().and_then(LogLevel::from_config))
        .unwrap_or(LogLevel::Info)
}

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level = effective_log_level(config, args);
    let log_level = match level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), *format, *commented),

            Commands::GenerateTestdata {
                output,
                drivers,
                units,
            } => command_generate_testdata(output.clone(), drivers, *units),

            Commands::Check {
                iterations,
                verbose,
            } => {
                let config = load_validated_config(&args)?;
                command_check(*iterations, *verbose, &config)
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config, &args)?;

    info!("Starting devstat-exporter {}", env!("CARGO_PKG_VERSION"));

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let provider = open_provider(config.test_data_file.as_deref()).map_err(|e| {
        error!("❌ Cannot open device statistics: {}", e);
        e
    })?;
    let collector = DevstatCollector::new(provider, config.namespace())?;

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    let exporter = if config.enable_telemetry.unwrap_or(true) {
        Some(ExporterMetrics::new(&registry, config.namespace())?)
    } else {
        debug!("Exporter telemetry disabled in configuration");
        None
    };

    let state = Arc::new(AppState {
        registry,
        exporter,
        collector,
        config: Arc::new(config.clone()),
        health_stats: Arc::new(HealthStats::new()),
        start_time: Instant::now(),
    });

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    } else {
        warn!("/health endpoint disabled in configuration");
    }

    let app = app.with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(
        "devstat-exporter listening on http://{}:{}",
        bind_ip_str, port
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("devstat-exporter stopped gracefully");
    Ok(())
}
