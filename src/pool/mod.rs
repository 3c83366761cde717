//! Connection pool: admission, elastic growth, idle eviction, FIFO waiters
//! and two-phase shutdown over any [`Connector`](crate::connector::Connector).

pub mod config;
mod controller;
mod lease;
pub mod metrics;
pub mod registry;
pub mod stats;
mod terminate;

pub use config::PoolConfig;
pub use controller::Pool;
pub use lease::Lease;
pub use registry::TimeoutRegistry;
pub use stats::{PoolPhase, PoolStats};
