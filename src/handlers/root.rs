//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with build information and the available endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Build timestamp emitted by vergen, if available.
const BUILD_TIMESTAMP: Option<&str> = option_env!("VERGEN_BUILD_TIMESTAMP");
/// Git commit emitted by vergen, if available.
const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let built = BUILD_TIMESTAMP.unwrap_or("unknown");
    let commit = GIT_SHA.unwrap_or("unknown");

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let namespace = match state.collector.namespace() {
        "" => "(none)",
        ns => ns,
    };

    let health_item = if state.config.enable_health.unwrap_or(true) {
        r#"<li>
            <a href="/health">/health</a>
            <div class="endpoint-desc">Exporter internal health &amp; poll statistics (text)</div>
        </li>"#
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Devstat Exporter</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #333;
            border-bottom: 3px solid #b5121b;
            padding-bottom: 15px;
        }}
        .info {{
            background: #e9ecef;
            padding: 15px;
            border-radius: 4px;
            display: flex;
            justify-content: space-around;
            flex-wrap: wrap;
        }}
        .info-label {{
            font-weight: 600;
            color: #555;
            display: block;
            font-size: 0.9em;
        }}
        .info-value {{ color: #b5121b; }}
        .endpoint-list {{ list-style: none; padding: 0; }}
        .endpoint-list li {{
            margin: 20px 0;
            padding: 15px;
            background: #f8f9fa;
            border-left: 4px solid #b5121b;
        }}
        .endpoint-desc {{ color: #666; margin-top: 5px; }}
        .footer {{ margin-top: 40px; color: #666; font-size: 0.9em; text-align: center; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Devstat Exporter</h1>
    <p>FreeBSD devstat disk I/O statistics for Prometheus</p>

    <div class="info">
        <div><span class="info-label">Version</span><span class="info-value">{version}</span></div>
        <div><span class="info-label">Built</span><span class="info-value">{built}</span></div>
        <div><span class="info-label">Commit</span><span class="info-value">{commit}</span></div>
        <div><span class="info-label">Namespace</span><span class="info-value">{namespace}</span></div>
        <div><span class="info-label">Uptime</span><span class="info-value">{uptime}</span></div>
    </div>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li>
            <a href="/metrics">/metrics</a>
            <div class="endpoint-desc">Prometheus-compatible metrics endpoint (one devstat poll per scrape)</div>
        </li>
        {health_item}
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        built = built,
        commit = commit,
        namespace = namespace,
        uptime = uptime_str,
        health_item = health_item,
        footer = FOOTER_TEXT
    );

    Html(html)
}
