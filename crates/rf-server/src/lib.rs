//! rf-server: HTTP API, chunked upload assembly, and the processing pipeline.
//!
//! This crate ties the other rf-* crates into a running service:
//!
//! - Axum HTTP API with identity and request-id middleware
//! - Upload assembler that turns chunk requests into one working file
//! - Bounded work queue and worker pool running encode and publish
//! - Per-user SSE stream of status changes
//! - Resume sweep for work interrupted by a restart
//! - Prometheus counters for uploads and pipeline runs

pub mod context;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod routes;
pub mod sweep;
pub mod telemetry;
pub mod upload;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rf_av::{EncoderSettings, FfmpegEncoder, ToolRegistry};
use rf_core::config::Config;
use rf_core::sessions::SessionRegistry;
use rf_core::StorageLayout;
use rf_store::{Publisher, RemoteStore};

use crate::context::AppContext;
use crate::pipeline::{PipelineQueue, PipelineReceiver};

/// Open the database, prepare storage, and wire up the production services.
///
/// Returns the context and the receiving end of its work queue; pass the
/// latter to [`pipeline::spawn_workers`].
pub fn build_context(config: Config) -> rf_core::Result<(AppContext, PipelineReceiver)> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = rf_db::pool::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    let layout = StorageLayout::new(&config.storage.root);
    layout.ensure_dirs()?;

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; processing will fail", info.name);
        }
    }

    let encoder = FfmpegEncoder::new(
        tools,
        EncoderSettings {
            segment_seconds: config.pipeline.segment_seconds,
            timeout: Duration::from_secs(config.pipeline.encode_timeout_secs),
            ..Default::default()
        },
    );
    let store = RemoteStore::new(&config.remote)?;
    let (queue, receiver) = PipelineQueue::new(config.pipeline.queue_capacity);

    let ctx = AppContext {
        db,
        sessions: Arc::new(SessionRegistry::new(config.sessions.queue_capacity)),
        layout: Arc::new(layout),
        encoder: Arc::new(encoder),
        publisher: Publisher::new(Arc::new(store)),
        queue,
        config: Arc::new(config),
    };
    Ok((ctx, receiver))
}

/// Start the reelforge server.
///
/// Spawns the pipeline workers, runs the resume sweep in the background,
/// and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> rf_core::Result<()> {
    let (ctx, receiver) = build_context(config)?;
    let cancel = CancellationToken::new();

    let workers = pipeline::spawn_workers(
        ctx.clone(),
        receiver,
        ctx.config.pipeline.workers,
        cancel.clone(),
    );

    let sweep_ctx = ctx.clone();
    tokio::spawn(async move {
        sweep::run_sweep(&sweep_ctx).await;
    });

    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .map_err(|e| rf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let app = router::build_router(ctx.clone(), ctx.config.server.static_dir.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Server error: {e}")))?;

    cancel.cancel();
    for worker in workers {
        let _ = worker.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Run the resume sweep once and wait for the work it queued.
pub async fn sweep_once(config: Config) -> rf_core::Result<sweep::SweepReport> {
    let (ctx, receiver) = build_context(config)?;
    let cancel = CancellationToken::new();
    let workers = pipeline::spawn_workers(
        ctx.clone(),
        receiver,
        ctx.config.pipeline.workers,
        cancel.clone(),
    );

    let report = sweep::run_sweep(&ctx).await;
    ctx.queue.wait_idle().await;

    cancel.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    Ok(report)
}

/// Wait for Ctrl+C, SIGTERM, or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
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
