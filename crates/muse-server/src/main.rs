use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use muse_engine::Studio;
use muse_server::{app, logging, ServerArgs};

fn main() {
    if let Err(err) = run() {
        eprintln!("muse error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = ServerArgs::parse();
    logging::init();

    // Blocking HTTP clients are built and dropped outside the async runtime.
    let config = args.studio_config()?;
    let studio = Arc::new(Studio::from_config(&config)?);
    if args.preload_model {
        studio.images().ensure_model()?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(serve(Arc::clone(&studio), args.bind_addr()))?;
    drop(runtime);
    drop(studio);
    Ok(())
}

async fn serve(studio: Arc<Studio>, addr: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("muse listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(studio))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("muse shutting down");
        })
        .await
        .context("server stopped unexpectedly")?;
    Ok(())
}
