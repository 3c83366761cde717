//! In-memory connector for tests, benchmarks and dry runs.

use super::Connector;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mock connector: {0}")]
pub struct MockError(pub String);

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MockConnection {
    pub id: usize,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    failed_creates: AtomicUsize,
    fail_next_creates: AtomicUsize,
    fail_destroys: AtomicBool,
    create_delay: Mutex<Duration>,
    live: Mutex<HashSet<usize>>,
}

/// Cloneable handle; clones share counters so a test can keep one while the
/// pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `create` by `delay` before it resolves.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.state.create_delay.lock() = delay;
        self
    }

    /// Make the next `count` calls to `create` fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.state.fail_next_creates.store(count, Ordering::SeqCst);
    }

    /// Make every subsequent `destroy` fail (the connection is still gone).
    pub fn fail_destroys(&self, fail: bool) {
        self.state.fail_destroys.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn failed_creates(&self) -> usize {
        self.state.failed_creates.load(Ordering::SeqCst)
    }

    /// Connections created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.state.live.lock().len()
    }

    fn take_create_failure(&self) -> bool {
        self.state
            .fail_next_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Error = MockError;

    async fn create(&self) -> Result<MockConnection, MockError> {
        let delay = *self.state.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.take_create_failure() {
            self.state.failed_creates.fetch_add(1, Ordering::SeqCst);
            return Err(MockError("create refused".to_string()));
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.live.lock().insert(id);
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection { id })
    }

    async fn destroy(&self, conn: MockConnection) -> Result<(), MockError> {
        if !self.state.live.lock().remove(&conn.id) {
            return Err(MockError(format!("connection {} destroyed twice", conn.id)));
        }
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_destroys.load(Ordering::SeqCst) {
            return Err(MockError(format!("close of connection {} failed", conn.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_live_connections() {
        let mock = MockConnector::new();
        let a = mock.create().await.unwrap();
        let b = mock.create().await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(mock.live(), 2);

        mock.destroy(a).await.unwrap();
        assert_eq!(mock.live(), 1);
        assert_eq!(mock.destroyed(), 1);
    }

    #[tokio::test]
    async fn rejects_double_destroy() {
        let mock = MockConnector::new();
        let conn = mock.create().await.unwrap();
        let id = conn.id;
        mock.destroy(conn).await.unwrap();

        let err = mock.destroy(MockConnection { id }).await.unwrap_err();
        assert!(err.0.contains("destroyed twice"));
        assert_eq!(mock.destroyed(), 1);
    }

    #[tokio::test]
    async fn injected_create_failures_are_consumed() {
        let mock = MockConnector::new();
        mock.fail_next_creates(1);

        assert!(mock.create().await.is_err());
        assert!(mock.create().await.is_ok());
        assert_eq!(mock.failed_creates(), 1);
        assert_eq!(mock.created(), 1);
    }
}
