use anyhow::Result;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tokio::task::JoinHandle;
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Reconciliation metrics
    pub static ref RECONCILE_TICKS_TOTAL: IntCounter = IntCounter::new(
        "updraft_reconcile_ticks_total",
        "Total number of reconciliation ticks run across all handlers"
    ).unwrap();

    pub static ref RECONCILE_ERRORS: IntCounter = IntCounter::new(
        "updraft_reconcile_errors_total",
        "Total number of reconciliation ticks that ended in an error"
    ).unwrap();

    pub static ref DEPLOYMENTS_SCANNED: IntCounter = IntCounter::new(
        "updraft_deployments_scanned_total",
        "Total number of Deployments examined during reconciliation"
    ).unwrap();

    pub static ref IMAGES_CHECKED: IntCounter = IntCounter::new(
        "updraft_images_checked_total",
        "Total number of container images checked against their registry"
    ).unwrap();

    // Action metrics
    pub static ref UPDATES_APPLIED: IntCounter = IntCounter::new(
        "updraft_updates_applied_total",
        "Total number of image tag updates patched into Deployments"
    ).unwrap();

    pub static ref RESTARTS_TRIGGERED: IntCounter = IntCounter::new(
        "updraft_restarts_triggered_total",
        "Total number of rollout restarts triggered for latest-tagged images"
    ).unwrap();

    pub static ref UPDATES_NOTIFY_ONLY: IntCounter = IntCounter::new(
        "updraft_updates_notify_only_total",
        "Total number of updates blocked by the version frontier"
    ).unwrap();

    // Registry metrics
    pub static ref REGISTRY_ERRORS: IntCounter = IntCounter::new(
        "updraft_registry_errors_total",
        "Total number of registry discovery failures"
    ).unwrap();

    // Notification metrics
    pub static ref NOTIFICATIONS_EMITTED: IntCounter = IntCounter::new(
        "updraft_notifications_emitted_total",
        "Total number of notifications that passed the dedupe gate"
    ).unwrap();

    pub static ref NOTIFICATION_TRANSPORT_FAILURES: IntCounter = IntCounter::new(
        "updraft_notification_transport_failures_total",
        "Total number of failed notification deliveries"
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(RECONCILE_TICKS_TOTAL.clone()))
        .ok();
    REGISTRY.register(Box::new(RECONCILE_ERRORS.clone())).ok();
    REGISTRY
        .register(Box::new(DEPLOYMENTS_SCANNED.clone()))
        .ok();
    REGISTRY.register(Box::new(IMAGES_CHECKED.clone())).ok();
    REGISTRY.register(Box::new(UPDATES_APPLIED.clone())).ok();
    REGISTRY
        .register(Box::new(RESTARTS_TRIGGERED.clone()))
        .ok();
    REGISTRY
        .register(Box::new(UPDATES_NOTIFY_ONLY.clone()))
        .ok();
    REGISTRY.register(Box::new(REGISTRY_ERRORS.clone())).ok();
    REGISTRY
        .register(Box::new(NOTIFICATIONS_EMITTED.clone()))
        .ok();
    REGISTRY
        .register(Box::new(NOTIFICATION_TRANSPORT_FAILURES.clone()))
        .ok();

    info!("Metrics registered");
}

pub async fn start_metrics_server() -> Result<JoinHandle<()>> {
    register_metrics();

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_check));

    let addr = "0.0.0.0:9090";
    info!("Starting metrics server on {}", addr);

    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind metrics server");

        axum::serve(listener, app)
            .await
            .expect("Metrics server failed");
    });

    Ok(handle)
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buffer,
    )
        .into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
