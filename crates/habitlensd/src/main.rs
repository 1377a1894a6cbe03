use anyhow::{Context, Result};
use clap::Parser;
use habitlensd::api::{self, AppState};
use habitlensd::config::Config;
use habitlensd::engine::{spawn_engine, Models};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "habitlensd", version, about = "Face and activity verification API for habit check-ins")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "HABITLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the ONNX models and tokenizer (overrides config)
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, rejected) = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.model_dir {
        config.models.model_dir = dir;
    }

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    for bad in &rejected {
        tracing::warn!(key = bad.key, value = %bad.value, "ignoring unparseable environment override");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model_dir = %config.models.model_dir.display(),
        "habitlensd starting"
    );

    let models = Models::load(&config.models).context("failed to load models")?;
    let engine = spawn_engine(models, config.verification.face_margin)?;

    let state = AppState {
        engine,
        defaults: config.verification.clone(),
    };
    let router = api::router(state, config.server.body_limit_bytes);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "habitlensd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("habitlensd shutting down");
        })
        .await?;

    Ok(())
}
