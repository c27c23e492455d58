use std::net::SocketAddr;
use std::sync::LazyLock;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use oracle_relay_core::task::TaskGroup;
use oracle_relay_logging::LOG_METRICS;
pub use prometheus::{
    self, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder,
    histogram_opts, opts, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry,
};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Registry every relay metric registers with, all names get the
/// `oracle_relay_` prefix
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    Registry::new_custom(Some("oracle_relay".into()), None)
        .expect("custom registry with a valid prefix")
});

/// Render all registered metrics in the prometheus text format
pub async fn get_metrics() -> (StatusCode, String) {
    let metric_families = REGISTRY.gather();
    let result = || -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    };
    match result() {
        Ok(result) => (StatusCode::OK, result),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")),
    }
}

/// Serve `/metrics` until the task group shuts down
pub async fn run_api_server(
    bind_address: SocketAddr,
    task_group: &TaskGroup,
) -> anyhow::Result<oneshot::Receiver<()>> {
    let app = Router::new().route("/metrics", get(get_metrics));
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(target: LOG_METRICS, %bind_address, "Starting metrics api");

    Ok(task_group.spawn("metrics-api", move |handle| async move {
        let shutdown = handle.make_shutdown_rx();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(target: LOG_METRICS, "Error shutting down metrics api: {e:?}");
        }
    }))
}
