//! ThesisTrack API Gateway
//!
//! HTTP entry point for the milestone review workflow.
//! Handles:
//! - Document uploads and review-revision cycles
//! - Status decisions and reviewer assignment
//! - File downloads
//! - Rate limiting on uploads
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thesistrack_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    directory::ActorDirectory,
    metrics,
    storage::{BlobStore, LocalBlobStore, UploadPolicy},
    workflow::{StatusController, SubmissionCoordinator, WorkflowStore},
};
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{rate_limit_middleware, UploadLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub directory: Arc<dyn ActorDirectory>,
    /// Present when backed by Postgres; used by the readiness probe
    pub db: Option<DbPool>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn ActorDirectory>,
        blobs: Arc<dyn BlobStore>,
        db: Option<DbPool>,
    ) -> Self {
        let coordinator = SubmissionCoordinator::new(
            store,
            blobs,
            UploadPolicy::from(&config.storage),
            StatusController::new(config.workflow.allow_reopen),
        );

        Self {
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
            directory,
            db,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);

    info!(
        version = thesistrack_common::VERSION,
        service = %config.observability.service_name,
        "Starting ThesisTrack API Gateway"
    );

    init_metrics(config.observability.metrics_port)?;

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let repo = Repository::new(db.clone());
    let blobs = LocalBlobStore::new(config.storage.root.clone()).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState::new(
        config,
        Arc::new(repo.clone()),
        Arc::new(repo),
        Arc::new(blobs),
        Some(db),
    );

    // Build the router
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_submission_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::UPLOAD_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limiter = UploadLimiter::from_config(&config.rate_limit);
    let upload_limit = || from_fn_with_state(limiter.clone(), rate_limit_middleware);

    // API routes
    let api_routes = Router::new()
        // Documents
        .route(
            "/documents",
            get(handlers::documents::list_documents)
                .merge(post(handlers::documents::open_document).layer(upload_limit())),
        )
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route(
            "/documents/{id}/reviewer",
            put(handlers::documents::assign_reviewer),
        )
        .route(
            "/documents/{id}/decision",
            post(handlers::documents::decide),
        )
        .route(
            "/documents/{id}/file",
            get(handlers::documents::download_file),
        )
        // Review-revision cycles
        .route(
            "/documents/{id}/cycles",
            get(handlers::cycles::list_cycles)
                .merge(post(handlers::cycles::submit_cycle).layer(upload_limit())),
        )
        .route("/cycles/{id}/file", get(handlers::cycles::download_file));

    // Compose the app
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .route_layer(from_fn(middleware::metrics::track_requests))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes()))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler. In-flight requests get `timeout` to
/// drain before the process exits anyway.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(timeout_secs = timeout.as_secs(), "Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}
