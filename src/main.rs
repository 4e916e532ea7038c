//! Process entry point: CLI parsing, layered configuration, logger
//! installation, router construction, bind + serve with graceful shutdown
//! (§3.3, §5, §6.3). Grounded on the teacher's `web::routes::launch_web_ui`
//! bind-and-serve shape, generalized from a single-process TUI companion
//! server to the gateway's standalone HTTP surface.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use gateway::api::{build_router, AppState};
use gateway::cli::Cli;
use gateway::config::Configuration;
use gateway::ollama::OllamaDispatcher;
use gateway::output::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let config = Configuration::load(config_path.as_deref().map(std::path::Path::new), cli.into_overrides())
        .context("failed to load configuration")?;

    init_logger(config.log_level.to_level_filter(), config.log_file.as_deref())
        .context("failed to initialize logger")?;

    log::info!(
        "event=startup port={} ollama_url={} default_model={} strict_thinking={} sequential_tool_calls={}",
        config.listen_port,
        config.ollama_base_url,
        config.default_model,
        config.strict_thinking,
        config.sequential_tool_calls
    );

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build http client")?;
    let dispatcher = OllamaDispatcher::new(client, config.ollama_base_url.clone(), config.request_timeout);

    let state = AppState {
        config: Arc::new(config.clone()),
        dispatcher: Arc::new(dispatcher),
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    log::info!("event=listening addr={}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("event=shutdown.complete");
    Ok(())
}

/// Resolves once SIGINT or (on unix) SIGTERM arrives, so `axum::serve` can
/// drain in-flight requests before exiting (§6.3).
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    log::info!("event=shutdown.signal_received");
}
