use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error produced by a [`Connector`](crate::connector::Connector), shared so a
/// single failure can be reported to every caller waiting on termination.
pub type ConnectorError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    #[error("pool is terminated")]
    Terminated,

    #[error("lease has been revoked")]
    Revoked,

    #[error("pool is at its limit of {max} connections")]
    Limit { max: usize },

    #[error("connector error: {0}")]
    Connector(#[source] ConnectorError),

    #[error("{} connection(s) failed to close during termination", .0.len())]
    Termination(Vec<ConnectorError>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    pub(crate) fn connector<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PoolError::Connector(Arc::new(err))
    }

    /// Whether retrying `connect` on the same pool may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::Timeout(_) | PoolError::Limit { .. } | PoolError::Connector(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
