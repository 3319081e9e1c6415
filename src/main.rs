//! image-tier-cache service binary.
//!
//! Exposes the image pipeline over HTTP: URI resolution, server-side render
//! checks, bulk preloading, cache inspection and clearing, and metrics.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use image_tier_cache::config::{Cli, Config};
use image_tier_cache::pipeline::ImagePipeline;
use image_tier_cache::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "image_tier_cache=debug,tower_http=debug"
    } else {
        "image_tier_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("image-tier-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        ttl_secs = config.cache.ttl_secs,
        cache_enabled = config.cache.enabled,
        transform_hosts = ?config.resolver.transform_hosts,
        prefetch_batch = config.prefetch.batch_size,
        prefetch_lookahead = config.prefetch.lookahead,
        "Configuration loaded"
    );

    // Build the pipeline: tier cache store, renderers, metrics.
    let pipeline = Arc::new(ImagePipeline::from_config(config.clone()).await?);

    let state = Arc::new(AppState::new(pipeline));
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
