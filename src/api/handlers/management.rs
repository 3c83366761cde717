use crate::api::types::HealthResponse;
use crate::connector::Connector;
use crate::pool::{Pool, PoolPhase};
use axum::{extract::State, http::StatusCode, Json};
use std::time::Instant;

/// API state containing shared resources
pub struct ApiState<C: Connector> {
    pub pool: Pool<C>,
    pub start_time: Instant,
}

impl<C: Connector> Clone for ApiState<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            start_time: self.start_time,
        }
    }
}

/// GET /health - Health check endpoint
///
/// Reports 503 once the pool has started terminating.
pub async fn health_check<C: Connector>(
    State(state): State<ApiState<C>>,
) -> (StatusCode, Json<HealthResponse>) {
    let phase = state.pool.phase();
    let (code, status) = match phase {
        PoolPhase::Active => (StatusCode::OK, "healthy"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pool_phase: phase.to_string(),
    };

    (code, Json(response))
}

/// GET /metrics - Prometheus metrics
#[cfg(feature = "metrics")]
pub async fn get_metrics() -> (StatusCode, String) {
    (StatusCode::OK, crate::pool::metrics::render())
}
