//! cosmowall - space wallpaper generator
//!
//! `serve` (default) runs the HTTP service; `generate` renders one pass to disk.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cosmowall_common::config::{load_config, TomlConfig};
use cosmowall_common::OutputFormat;
use tokio::signal;
use tracing::info;

use cosmowall_gen::services::{artifact_file_name, preview_file_name, GenerationPass};
use cosmowall_gen::AppState;

/// Command-line arguments for cosmowall
#[derive(Parser, Debug)]
#[command(name = "cosmowall")]
#[command(about = "Space wallpaper generator")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, global = true, env = "COSMOWALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long, env = "COSMOWALL_PORT")]
        port: Option<u16>,
    },
    /// Render one pass and write the artifacts to disk
    Generate {
        /// desktop or phone
        #[arg(short, long, default_value = "desktop")]
        format: OutputFormat,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing before reading config so config loading is logged
    let log_filter = cosmowall_gen::logging::init();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    log_filter
        .apply_config_level(&config.logging.level)
        .context("Failed to apply configured log level")?;

    info!("Starting cosmowall v{}", env!("CARGO_PKG_VERSION"));

    let api_key = cosmowall_gen::config::resolve_api_key(&config);
    let state = AppState::from_config(&config, api_key).context("Failed to build HTTP client")?;

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(state, &config, port).await,
        Command::Generate { format, out } => generate(state, format, &out).await,
    }
}

async fn serve(state: AppState, config: &TomlConfig, port: Option<u16>) -> Result<()> {
    let sweep_interval = Duration::from_secs(config.pool.sweep_interval_minutes.max(1) * 60);
    let _sweeper = state.pool_service.cache().spawn_sweeper(sweep_interval);

    let app = cosmowall_gen::build_router(state);

    let ip: std::net::IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;
    let addr = SocketAddr::new(ip, port.unwrap_or(config.port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn generate(state: AppState, format: OutputFormat, out: &Path) -> Result<()> {
    let pass = state.generate_pass(format).await;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let written = write_artifacts(&pass, &state.product_name, out).await?;
    info!("Wrote {} of {} slots to {}", written, pass.slots.len(), out.display());

    if written == 0 {
        anyhow::bail!("No slot produced an image");
    }
    Ok(())
}

async fn write_artifacts(pass: &Arc<GenerationPass>, product: &str, out: &Path) -> Result<usize> {
    let mut written = 0;
    for slot in &pass.slots {
        let (Some(full), Some(preview)) = (&slot.full_res_artifact, &slot.preview_artifact) else {
            tracing::error!(
                slot = slot.index,
                error = slot.error.as_deref().unwrap_or("unknown"),
                "Slot failed; nothing written"
            );
            continue;
        };

        let full_path = out.join(artifact_file_name(product, pass.format, slot.index));
        let preview_path = out.join(preview_file_name(product, pass.format, slot.index));
        tokio::fs::write(&full_path, full)
            .await
            .with_context(|| format!("Failed to write {}", full_path.display()))?;
        tokio::fs::write(&preview_path, preview)
            .await
            .with_context(|| format!("Failed to write {}", preview_path.display()))?;

        info!(
            slot = slot.index,
            fallback = slot.used_fallback(),
            source = slot.source.as_ref().map(|s| s.url()).unwrap_or("-"),
            "Wrote {}",
            full_path.display()
        );
        written += 1;
    }
    Ok(written)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
