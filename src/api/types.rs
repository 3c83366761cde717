use crate::telemetry::{EventCategory, TelemetrySeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub pool_phase: String,
}

/// Query parameters for the events endpoint
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only return events from the last N minutes
    pub minutes: Option<i64>,
    pub category: Option<EventCategory>,
    /// Minimum severity (info, warning, error)
    pub severity: Option<TelemetrySeverity>,
}

/// Event counts per category
#[derive(Debug, Serialize, Deserialize)]
pub struct EventSummary {
    pub pool: String,
    pub total: usize,
    pub by_category: BTreeMap<EventCategory, usize>,
}
