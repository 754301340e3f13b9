use anyhow::Result;
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::Config,
    handlers::{
        metrics_handler::{self, MetricsState},
        recorder_api,
    },
    metrics,
    recorder::{spawn_cleanup_task, CleanupConfig, Recorder},
    signals::setup_signal_handlers,
};

/// Start the recorder query server
///
/// This function:
/// 1. Initializes metrics
/// 2. Builds and initializes the recorder
/// 3. Spawns the retention cleanup loop
/// 4. Serves the query API until SIGINT/SIGTERM
/// 5. Flushes pending entries before returning
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let recorder = Arc::new(Recorder::new(&config.recorder)?);
    recorder
        .initialize(config.recorder.store_url.as_deref())
        .await?;

    let cleanup_handle = spawn_cleanup_task(
        recorder.clone(),
        CleanupConfig::from_config(&config.recorder),
    );

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let app = create_router(recorder.clone(), Some(metrics_handle));

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting recorder API on {}", addr);
    info!(
        retention_hours = config.recorder.retention_hours,
        cleanup_interval_secs = config.recorder.cleanup_interval_secs,
        watchers_configured = config.recorder.watchers.len(),
        "Recorder configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    signal_handle.await?;
    cleanup_handle.abort();

    recorder.flush().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with the query API and optional /metrics
pub fn create_router(recorder: Arc<Recorder>, metrics_handle: Option<Arc<PrometheusHandle>>) -> Router {
    let api = Router::new()
        .route("/health", get(recorder_api::health))
        .route("/stats", get(recorder_api::stats))
        .route(
            "/entries",
            get(recorder_api::list_entries).delete(recorder_api::clear_entries),
        )
        .route("/entries/:uuid", get(recorder_api::get_entry))
        .route("/pause", post(recorder_api::pause))
        .route("/resume", post(recorder_api::resume))
        .route("/watchers", get(recorder_api::list_watchers))
        .route("/watchers/:name", get(recorder_api::get_watcher))
        .route("/watchers/:name/enable", post(recorder_api::enable_watcher))
        .route("/watchers/:name/disable", post(recorder_api::disable_watcher))
        .with_state(recorder.clone());

    let app = match metrics_handle {
        Some(handle) => api.merge(
            Router::new()
                .route("/metrics", get(metrics_handler::metrics))
                .with_state(MetricsState { handle, recorder }),
        ),
        None => api,
    };

    // Browsers may read from anywhere; mutations stay same-origin
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    app.layer(cors).layer(TraceLayer::new_for_http())
}
