use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::handlers::{
    get_event_summary, get_pool_events, get_pool_stats, health_check, ApiState,
};
use crate::config::ApiSettings;
use crate::connector::Connector;
use crate::pool::Pool;
use crate::utils::error::{PoolError, Result};

/// Build the read-only diagnostics router for `pool`.
pub fn build_router<C: Connector>(pool: Pool<C>) -> Router {
    let state = ApiState {
        pool,
        start_time: Instant::now(),
    };

    let router = Router::new()
        .route("/health", get(health_check::<C>))
        .route("/api/pool/stats", get(get_pool_stats::<C>))
        .route("/api/pool/events", get(get_pool_events::<C>))
        .route("/api/pool/events/summary", get(get_event_summary::<C>));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(crate::api::handlers::get_metrics));

    router.with_state(state)
}

/// Start the diagnostics API server in the background.
pub async fn start_api_server<C: Connector>(
    settings: &ApiSettings,
    pool: Pool<C>,
) -> Result<JoinHandle<()>> {
    let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.bind_port)
        .parse()
        .map_err(|e| PoolError::Config(format!("Invalid API bind address: {}", e)))?;

    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Diagnostics API listening on http://{}", local_addr);

    let server = axum::serve(listener, build_router(pool));

    let handle = tokio::spawn(async move {
        if let Err(err) = server.await {
            error!("Diagnostics API error: {}", err);
        }
    });

    Ok(handle)
}
