// connpool - Elastic async connection pool

pub mod api;
pub mod config;
pub mod connector;
pub mod pool;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use connector::Connector;
pub use pool::{Lease, Pool, PoolConfig, PoolPhase, PoolStats};
pub use utils::error::{PoolError, Result};
