use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pool. There is no way back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolPhase {
    Active,
    Terminating,
    Terminated,
}

impl PoolPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolPhase::Active => "active",
            PoolPhase::Terminating => "terminating",
            PoolPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a pool, taken under the pool lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub name: String,
    pub phase: PoolPhase,
    /// Idle connections ready for immediate lease
    pub immediate: usize,
    /// Connections obtainable without exceeding `pool_max`
    pub available: usize,
    pub leased: usize,
    /// Create operations in flight
    pub growing: usize,
    /// Callers queued for a connection
    pub waiting: usize,
    pub size: usize,
    pub pool_min: usize,
    pub pool_max: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
    pub total_leases: u64,
    pub create_failures: u64,
    pub destroy_failures: u64,
    pub connect_timeouts: u64,
}
