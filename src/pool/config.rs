use crate::utils::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validated pool configuration.
///
/// Durations of zero disable the corresponding timer: a zero
/// `connect_timeout` lets waiters queue without a deadline, a zero
/// `pool_timeout` keeps idle connections forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Label used in logs, metrics and telemetry
    pub name: String,
    /// Maximum wait for a connection before the waiter fails
    pub connect_timeout: Duration,
    /// Connections added per growth event
    pub pool_increment: usize,
    /// Hard capacity ceiling
    pub pool_max: usize,
    /// Floor maintained even when idle
    pub pool_min: usize,
    /// Idle eviction delay for available connections
    pub pool_timeout: Duration,
    /// Grace period before leased connections are force-destroyed on terminate
    pub terminate_grace: Duration,
    /// Queue callers when the pool is full; when false, fail with `Limit`
    pub queue_requests: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            connect_timeout: Duration::from_secs(30),
            pool_increment: 1,
            pool_max: 4,
            pool_min: 0,
            pool_timeout: Duration::from_secs(60),
            terminate_grace: Duration::from_secs(60),
            queue_requests: true,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_max == 0 {
            return Err(PoolError::Config(
                "pool_max must be greater than 0".to_string(),
            ));
        }
        if self.pool_increment == 0 {
            return Err(PoolError::Config(
                "pool_increment must be at least 1".to_string(),
            ));
        }
        if self.pool_min > self.pool_max {
            return Err(PoolError::Config(format!(
                "pool_min ({}) must not exceed pool_max ({})",
                self.pool_min, self.pool_max
            )));
        }
        if self.name.trim().is_empty() {
            return Err(PoolError::Config("pool name cannot be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn connect_deadline(&self) -> Option<Duration> {
        Some(self.connect_timeout).filter(|d| !d.is_zero())
    }

    pub(crate) fn idle_deadline(&self) -> Option<Duration> {
        Some(self.pool_timeout).filter(|d| !d.is_zero())
    }
}
