use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kawaii_recsys::{
    api::{create_router, AppState},
    config::{Config, MetadataBackend},
    data::{load_dataset, DatasetFiles},
    db::{create_redis_client, Cache},
    services::{JikanProvider, MetadataProvider, RecommendationEngine, StaticProvider},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kawaii_recsys=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(data_dir = %config.data_dir.display(), "Starting KawaiiRecSys");

    let files = DatasetFiles::in_dir(&config.data_dir);
    let svd_params = config.svd_params();
    let neural_params = config.neural_params();

    // Loading and training are CPU-bound
    let engine = tokio::task::spawn_blocking(move || -> Result<RecommendationEngine> {
        let dataset = load_dataset(&files).context("Failed to load dataset")?;
        RecommendationEngine::train(Arc::new(dataset), &svd_params, &neural_params)
            .context("Failed to train recommenders")
    })
    .await
    .context("Training task panicked")??;
    info!("Recommenders ready");

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url).context("Invalid Redis URL")?;
            let (cache, writer) = Cache::new(client);
            info!("Redis cache enabled");
            (Some(cache), Some(writer))
        }
        None => {
            info!("REDIS_URL not set, caching disabled");
            (None, None)
        }
    };

    let metadata: Arc<dyn MetadataProvider> = match config.metadata_backend {
        MetadataBackend::Jikan => Arc::new(
            JikanProvider::new(
                config.jikan_api_url.clone(),
                cache.clone(),
                Duration::from_secs(config.jikan_timeout_secs),
            )
            .context("Failed to build Jikan HTTP client")?,
        ),
        MetadataBackend::Placeholder => Arc::new(StaticProvider),
    };
    info!(provider = metadata.name(), "Metadata provider configured");

    let state = AppState::new(Arc::new(engine), metadata, cache);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid host or port")?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
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
