#[cfg(feature = "metrics")]
mod prom {
    use lazy_static::lazy_static;
    use prometheus::{
        register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
        IntCounterVec, IntGaugeVec,
    };

    lazy_static! {
        pub static ref CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
            "connpool_connections",
            "Connections per pool by state (idle, leased, growing)",
            &["pool", "state"]
        )
        .expect("register connpool_connections gauge vec");
        pub static ref WAITING: IntGaugeVec = register_int_gauge_vec!(
            "connpool_waiting_requests",
            "Callers currently queued for a connection",
            &["pool"]
        )
        .expect("register connpool_waiting_requests gauge vec");
        pub static ref CREATED: IntCounterVec = register_int_counter_vec!(
            "connpool_connections_created_total",
            "Connections successfully created by the connector",
            &["pool"]
        )
        .expect("register connpool_connections_created_total counter vec");
        pub static ref DESTROYED: IntCounterVec = register_int_counter_vec!(
            "connpool_connections_destroyed_total",
            "Connections handed back to the connector for disposal",
            &["pool"]
        )
        .expect("register connpool_connections_destroyed_total counter vec");
        pub static ref FAILURES: IntCounterVec = register_int_counter_vec!(
            "connpool_connector_failures_total",
            "Connector failures by operation (create, destroy)",
            &["pool", "operation"]
        )
        .expect("register connpool_connector_failures_total counter vec");
        pub static ref TIMEOUTS: IntCounterVec = register_int_counter_vec!(
            "connpool_connect_timeouts_total",
            "Connect requests that expired while queued",
            &["pool"]
        )
        .expect("register connpool_connect_timeouts_total counter vec");
        pub static ref WAIT_DURATION: HistogramVec = register_histogram_vec!(
            "connpool_wait_duration_seconds",
            "Time a queued connect request waited before being served",
            &["pool"],
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0]
        )
        .expect("register connpool_wait_duration_seconds histogram vec");
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolMetrics;

#[cfg(feature = "metrics")]
impl PoolMetrics {
    #[inline]
    pub fn observe_state(pool: &str, idle: usize, leased: usize, growing: usize, waiting: usize) {
        prom::CONNECTIONS
            .with_label_values(&[pool, "idle"])
            .set(idle as i64);
        prom::CONNECTIONS
            .with_label_values(&[pool, "leased"])
            .set(leased as i64);
        prom::CONNECTIONS
            .with_label_values(&[pool, "growing"])
            .set(growing as i64);
        prom::WAITING.with_label_values(&[pool]).set(waiting as i64);
    }

    #[inline]
    pub fn record_created(pool: &str) {
        prom::CREATED.with_label_values(&[pool]).inc();
    }

    #[inline]
    pub fn record_destroyed(pool: &str) {
        prom::DESTROYED.with_label_values(&[pool]).inc();
    }

    #[inline]
    pub fn record_failure(pool: &str, operation: &str) {
        prom::FAILURES.with_label_values(&[pool, operation]).inc();
    }

    #[inline]
    pub fn record_timeout(pool: &str) {
        prom::TIMEOUTS.with_label_values(&[pool]).inc();
    }

    #[inline]
    pub fn observe_wait(pool: &str, duration_secs: f64) {
        prom::WAIT_DURATION
            .with_label_values(&[pool])
            .observe(duration_secs);
    }
}

#[cfg(not(feature = "metrics"))]
impl PoolMetrics {
    #[inline]
    pub fn observe_state(_: &str, _: usize, _: usize, _: usize, _: usize) {}
    #[inline]
    pub fn record_created(_: &str) {}
    #[inline]
    pub fn record_destroyed(_: &str) {}
    #[inline]
    pub fn record_failure(_: &str, _: &str) {}
    #[inline]
    pub fn record_timeout(_: &str) {}
    #[inline]
    pub fn observe_wait(_: &str, _: f64) {}
}

/// Render every registered metric in the Prometheus text format.
#[cfg(feature = "metrics")]
pub fn render() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
