// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use toolmux::config;
use toolmux::server::{self, AppState};

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "toolmux", about = "OpenAI-compatible tool-call orchestration server")]
struct Cli {
    /// Path to the toolmux.yaml config file
    #[arg(long, default_value = "toolmux.yaml", env = "TOOLMUX_CONFIG")]
    config: String,

    /// Port to listen on (overrides server.port)
    #[arg(long, env = "TOOLMUX_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource::new(&cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %cli.config, "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        environment = %config.environment,
        llm_extraction = config.classifier.llm_extraction,
        cache_max_size = config.cache.max_size,
        tool_timeout_ms = config.tools.timeout.as_millis() as u64,
        "config loaded"
    );

    let state = AppState::from_config(&config, reqwest::Client::new());

    // Expired sessions are only removed here; reads never check the TTL.
    let sessions = Arc::clone(&state.sessions);
    let sweep_interval = config.sessions.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sessions.sweep_expired();
        }
    });

    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port.unwrap_or(config.server.port)));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "toolmux listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
