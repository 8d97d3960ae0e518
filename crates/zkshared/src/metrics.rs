//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  — Prometheus text format
//!   GET /healthz  — Liveness check (always 200 if process is running)
//!   GET /readyz   — Readiness check (200 if object storage is reachable)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zkshare_store::PurgeReport;

/// Sweep counters exported by the daemon
#[derive(Clone, Default)]
pub struct SweepMetrics {
    pub purged_shares: Counter,
    pub purged_handshakes: Counter,
    pub active_shares: Gauge,
}

impl SweepMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "zkshare_purged_shares",
            "Expired shares removed together with their objects",
            metrics.purged_shares.clone(),
        );
        registry.register(
            "zkshare_purged_handshakes",
            "Expired pairing handshakes removed",
            metrics.purged_handshakes.clone(),
        );
        registry.register(
            "zkshare_active_shares",
            "Shares that can still be downloaded",
            metrics.active_shares.clone(),
        );
        metrics
    }

    pub fn record(&self, report: &PurgeReport, active: usize) {
        self.purged_shares.inc_by(report.shares as u64);
        self.purged_handshakes.inc_by(report.handshakes as u64);
        self.active_shares.set(active as i64);
    }
}

/// State shared with the HTTP handlers
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub operator: opendal::Operator,
}

/// Serve Prometheus metrics and health endpoints on `addr` until cancelled
pub async fn serve(addr: String, state: HealthState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

fn encode_registry(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut body = String::new();
    encode(&mut body, registry)?;
    Ok(body)
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if zkshare_storage::is_healthy(&state.operator).await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "storage unreachable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_metrics_are_exported() {
        let mut registry = Registry::default();
        let metrics = SweepMetrics::register(&mut registry);
        metrics.record(
            &PurgeReport {
                shares: 2,
                handshakes: 5,
            },
            7,
        );
        metrics.record(
            &PurgeReport {
                shares: 1,
                handshakes: 0,
            },
            6,
        );

        let body = encode_registry(&registry).unwrap();
        assert!(body.contains("zkshare_purged_shares_total 3"), "{body}");
        assert!(body.contains("zkshare_purged_handshakes_total 5"), "{body}");
        assert!(body.contains("zkshare_active_shares 6"), "{body}");
    }
}
