use crate::api::handlers::management::ApiState;
use crate::api::types::{EventSummary, EventsQuery};
use crate::connector::Connector;
use crate::pool::PoolStats;
use crate::telemetry::{EventFilter, TelemetryEvent};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

/// GET /api/pool/stats - connection pool snapshot
pub async fn get_pool_stats<C: Connector>(
    State(state): State<ApiState<C>>,
) -> (StatusCode, Json<PoolStats>) {
    (StatusCode::OK, Json(state.pool.stats()))
}

/// GET /api/pool/events - recent pool lifecycle events
///
/// Optional filters: `minutes`, `category`, `severity` (minimum).
pub async fn get_pool_events<C: Connector>(
    State(state): State<ApiState<C>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<TelemetryEvent>>, (StatusCode, String)> {
    if query.minutes.is_some_and(|minutes| minutes <= 0) {
        return Err((
            StatusCode::BAD_REQUEST,
            "minutes must be greater than 0".to_string(),
        ));
    }

    let filter = EventFilter {
        minutes: query.minutes,
        category: query.category,
        min_severity: query.severity,
    };
    Ok(Json(state.pool.telemetry().query(&filter)))
}

/// GET /api/pool/events/summary - retained event counts per category
pub async fn get_event_summary<C: Connector>(
    State(state): State<ApiState<C>>,
) -> Json<EventSummary> {
    let by_category = state.pool.telemetry().counts();
    Json(EventSummary {
        pool: state.pool.config().name.clone(),
        total: by_category.values().sum(),
        by_category,
    })
}
