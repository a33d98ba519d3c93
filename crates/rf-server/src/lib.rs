//! rf-server: HTTP API over the transcoding pipeline.
//!
//! This crate ties the other rf-* crates into a running server. It provides:
//!
//! - Multipart uploads into per-session staging directories
//! - Job submission, status, listing and cancellation
//! - An SSE stream of job lifecycle events
//! - Static serving of published results under `/outputs`
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use rf_core::config::Config;
use rf_pipeline::{FfmpegTransformer, Transformer};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the reelforge server.
///
/// Builds the [`AppContext`] and serves HTTP until a shutdown signal is
/// received. Running jobs are cancelled and awaited before returning.
pub async fn start(config: Config) -> rf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| rf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = build_context(config).await?;
    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    tracing::info!(
        uploads = %ctx.uploads_dir().display(),
        outputs = %ctx.outputs_dir().display(),
        "Staging directories ready"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let cancel = CancellationToken::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Server error: {e}")))?;

    ctx.pipeline.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Discover tools and build the shared context.
///
/// A missing ffmpeg does not stop the server: jobs then fail with a spawn
/// error that names the problem.
pub async fn build_context(config: Config) -> rf_core::Result<AppContext> {
    let tools = Arc::new(rf_av::ToolRegistry::discover(&config.tools));
    for info in tools.check_all().await {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::debug!("Tool not found: {}", info.name);
        }
    }

    let transformer: Arc<dyn Transformer> = match FfmpegTransformer::from_registry(&tools) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::warn!("{e}; transcoding jobs will fail until it is installed");
            Arc::new(FfmpegTransformer::new("ffmpeg"))
        }
    };

    AppContext::new(config, transformer, tools)
}

/// Wait for Ctrl+C, SIGTERM, or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
