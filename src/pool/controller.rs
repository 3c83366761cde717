use super::config::PoolConfig;
use super::lease::{Lease, LeaseSlot};
use super::metrics::PoolMetrics;
use super::registry::{ExpireHook, TimeoutRegistry};
use super::stats::{PoolPhase, PoolStats};
use super::terminate::{TerminationOutcome, TerminationState};
use crate::connector::Connector;
use crate::telemetry::{EventCategory, TelemetryHistory, TelemetrySeverity};
use crate::utils::error::{PoolError, Result};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

/// A queued `connect` call.
pub(super) struct Waiter<C: Connector> {
    tx: oneshot::Sender<Result<Lease<C>>>,
}

impl<C: Connector> Waiter<C> {
    pub(super) fn fail(self, err: PoolError) {
        // The caller may have stopped waiting; nothing to report then.
        let _ = self.tx.send(Err(err));
    }
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) created: u64,
    pub(super) destroyed: u64,
    pub(super) leases: u64,
    pub(super) create_failures: u64,
    pub(super) destroy_failures: u64,
    pub(super) timeouts: u64,
}

/// Everything mutable about a pool. Only ever touched under `Shared::state`.
pub(super) struct PoolState<C: Connector> {
    pub(super) phase: PoolPhase,
    pub(super) idle: TimeoutRegistry<C::Connection>,
    pub(super) waiters: TimeoutRegistry<Waiter<C>>,
    pub(super) leased: HashMap<u64, Arc<LeaseSlot<C::Connection>>>,
    pub(super) growing: usize,
    pub(super) next_lease_id: u64,
    pub(super) counters: Counters,
    pub(super) termination: TerminationState,
}

impl<C: Connector> PoolState<C> {
    /// Connections that count against `pool_max`: idle, leased and in creation.
    pub(super) fn size(&self) -> usize {
        self.idle.len() + self.leased.len() + self.growing
    }
}

pub(super) struct Shared<C: Connector> {
    pub(super) connector: C,
    pub(super) config: PoolConfig,
    pub(super) state: Mutex<PoolState<C>>,
    pub(super) telemetry: TelemetryHistory,
    pub(super) done: watch::Sender<Option<TerminationOutcome>>,
    /// Runtime captured at construction. Background work is spawned here so
    /// leases can be released or dropped from any thread.
    pub(super) runtime: Handle,
}

/// Elastic pool of connections produced by a [`Connector`].
///
/// `Pool` is a cheap handle; clones share the same connections. Growth,
/// idle eviction and hand-off to queued callers all happen on background
/// Tokio tasks of the runtime the pool was created in.
///
/// Dropping every handle does not close connections. Call
/// [`terminate`](Pool::terminate) for an orderly shutdown.
pub struct Pool<C: Connector> {
    pub(super) shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool and start warming it up to `pool_min`.
    pub fn new(connector: C, config: PoolConfig) -> Result<Self> {
        Self::with_telemetry(connector, config, TelemetryHistory::default())
    }

    /// Like [`new`](Pool::new), recording lifecycle events into `telemetry`.
    pub fn with_telemetry(
        connector: C,
        config: PoolConfig,
        telemetry: TelemetryHistory,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            PoolError::Config("a pool must be created inside a Tokio runtime".to_string())
        })?;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<C>>| {
            let idle_hook: ExpireHook = {
                let weak = weak.clone();
                Arc::new(move |key| {
                    if let Some(shared) = weak.upgrade() {
                        shared.evict_idle(key);
                    }
                })
            };
            let waiter_hook: ExpireHook = {
                let weak = weak.clone();
                Arc::new(move |key| {
                    if let Some(shared) = weak.upgrade() {
                        shared.expire_waiter(key);
                    }
                })
            };

            let state = PoolState {
                phase: PoolPhase::Active,
                idle: TimeoutRegistry::new(config.idle_deadline(), idle_hook, runtime.clone()),
                waiters: TimeoutRegistry::new(
                    config.connect_deadline(),
                    waiter_hook,
                    runtime.clone(),
                ),
                leased: HashMap::new(),
                growing: 0,
                next_lease_id: 0,
                counters: Counters::default(),
                termination: TerminationState::default(),
            };

            Shared {
                connector,
                config,
                state: Mutex::new(state),
                telemetry,
                done: watch::Sender::new(None),
                runtime,
            }
        });

        {
            let mut st = shared.state.lock();
            shared.ensure_min(&mut st);
            shared.publish(&st);
        }

        debug!(
            "Pool '{}' created (min {}, max {}, increment {})",
            shared.config.name,
            shared.config.pool_min,
            shared.config.pool_max,
            shared.config.pool_increment
        );

        Ok(Self { shared })
    }

    /// Lease a connection, waiting up to `connect_timeout` if none is idle.
    ///
    /// Callers are served in the order they called `connect`.
    pub async fn connect(&self) -> Result<Lease<C>> {
        let shared = &self.shared;
        let rx = {
            let mut st = shared.state.lock();
            if st.phase != PoolPhase::Active {
                return Err(PoolError::Terminated);
            }

            shared.ensure_min(&mut st);

            if let Some(conn) = st.idle.pop() {
                let lease = shared.lease_out(&mut st, conn);
                trace!("Leased idle connection {} from '{}'", lease.id(), shared.config.name);
                shared.publish(&st);
                return Ok(lease);
            }

            let max = shared.config.pool_max;
            if !shared.config.queue_requests && st.leased.len() + st.waiters.len() >= max {
                return Err(PoolError::Limit { max });
            }

            let (tx, rx) = oneshot::channel();
            st.waiters.push(Waiter { tx });
            shared.grow(&mut st);
            shared.publish(&st);
            rx
        };

        // The sender only disappears if the pool state itself is dropped.
        rx.await.unwrap_or(Err(PoolError::Terminated))
    }

    /// Connections obtainable right now or by growing, up to `pool_max`.
    pub fn available(&self) -> usize {
        let st = self.shared.state.lock();
        if st.phase != PoolPhase::Active {
            return 0;
        }
        self.shared.config.pool_max.saturating_sub(st.leased.len())
    }

    /// Idle connections ready without creating anything.
    pub fn immediate(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Idle + leased + in-flight creates.
    pub fn size(&self) -> usize {
        self.shared.state.lock().size()
    }

    pub fn leased(&self) -> usize {
        self.shared.state.lock().leased.len()
    }

    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    pub fn telemetry(&self) -> &TelemetryHistory {
        &self.shared.telemetry
    }

    pub fn stats(&self) -> PoolStats {
        let st = self.shared.state.lock();
        let config = &self.shared.config;
        let available = if st.phase == PoolPhase::Active {
            config.pool_max.saturating_sub(st.leased.len())
        } else {
            0
        };

        PoolStats {
            name: config.name.clone(),
            phase: st.phase,
            immediate: st.idle.len(),
            available,
            leased: st.leased.len(),
            growing: st.growing,
            waiting: st.waiters.len(),
            size: st.size(),
            pool_min: config.pool_min,
            pool_max: config.pool_max,
            total_created: st.counters.created,
            total_destroyed: st.counters.destroyed,
            total_leases: st.counters.leases,
            create_failures: st.counters.create_failures,
            destroy_failures: st.counters.destroy_failures,
            connect_timeouts: st.counters.timeouts,
        }
    }
}

impl<C: Connector> Shared<C> {
    pub(super) fn lease_out(self: &Arc<Self>, st: &mut PoolState<C>, conn: C::Connection) -> Lease<C> {
        let id = st.next_lease_id;
        st.next_lease_id += 1;

        let slot = Arc::new(LeaseSlot::new(conn));
        st.leased.insert(id, Arc::clone(&slot));
        st.counters.leases += 1;
        Lease::new(id, slot, Arc::clone(self))
    }

    /// Give `conn` to the oldest caller still waiting. Returns the connection
    /// if nobody took it.
    fn hand_off(self: &Arc<Self>, st: &mut PoolState<C>, mut conn: C::Connection) -> Option<C::Connection> {
        while let Some((waiter, waited)) = st.waiters.pop_entry() {
            let lease = self.lease_out(st, conn);
            let id = lease.id();
            let returned = match waiter.tx.send(Ok(lease)) {
                Ok(()) => {
                    trace!("Handed connection {} to waiter after {:?}", id, waited);
                    PoolMetrics::observe_wait(&self.config.name, waited.as_secs_f64());
                    return None;
                }
                Err(returned) => returned,
            };

            // The caller dropped its connect future; try the next one.
            conn = returned.ok().and_then(|lease| lease.disarm(st))?;
        }
        Some(conn)
    }

    /// Put a connection back into circulation, or into the idle set.
    fn recycle(self: &Arc<Self>, st: &mut PoolState<C>, conn: C::Connection) {
        if let Some(conn) = self.hand_off(st, conn) {
            st.idle.push(conn);
        }
    }

    /// Called by a lease on release or drop.
    pub(super) fn reclaim(self: &Arc<Self>, id: u64, conn: Option<C::Connection>) {
        let mut st = self.state.lock();
        st.leased.remove(&id);

        match conn {
            Some(conn) if st.phase == PoolPhase::Active => self.recycle(&mut st, conn),
            Some(conn) => self.spawn_destroy(&mut st, conn),
            None => self.check_terminated(&mut st),
        }
        self.publish(&st);
    }

    /// Schedule growth when queued callers outnumber connections being created.
    fn grow(self: &Arc<Self>, st: &mut PoolState<C>) {
        if st.waiters.len() <= st.growing {
            return;
        }

        let size = st.size();
        let max = self.config.pool_max;
        if size >= max {
            trace!("Pool '{}' at capacity ({}), waiter queued", self.config.name, max);
            return;
        }

        let count = self.config.pool_increment.min(max - size);
        debug!(
            "Pool '{}' growing by {} (size {}, waiting {}, growing {})",
            self.config.name,
            count,
            size,
            st.waiters.len(),
            st.growing
        );
        for _ in 0..count {
            self.spawn_create(st);
        }
    }

    /// Restore the `pool_min` floor.
    fn ensure_min(self: &Arc<Self>, st: &mut PoolState<C>) {
        let size = st.size();
        if size >= self.config.pool_min {
            return;
        }

        debug!(
            "Pool '{}' below minimum ({} < {}), creating {}",
            self.config.name,
            size,
            self.config.pool_min,
            self.config.pool_min - size
        );
        for _ in size..self.config.pool_min {
            self.spawn_create(st);
        }
    }

    fn spawn_create(self: &Arc<Self>, st: &mut PoolState<C>) {
        st.growing += 1;
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = shared.connector.create().await;
            shared.finish_create(result);
        });
    }

    fn finish_create(self: &Arc<Self>, result: std::result::Result<C::Connection, C::Error>) {
        let mut st = self.state.lock();
        st.growing -= 1;

        match result {
            Ok(conn) => {
                st.counters.created += 1;
                PoolMetrics::record_created(&self.config.name);

                if st.phase == PoolPhase::Active {
                    self.recycle(&mut st, conn);
                } else {
                    debug!("Pool '{}' terminating, discarding new connection", self.config.name);
                    self.spawn_destroy(&mut st, conn);
                }
            }
            Err(e) => {
                st.counters.create_failures += 1;
                PoolMetrics::record_failure(&self.config.name, "create");
                warn!("Pool '{}' failed to create connection: {}", self.config.name, e);
                self.telemetry.record_event(
                    TelemetrySeverity::Error,
                    &self.config.name,
                    EventCategory::Create,
                    format!("Connector create failed: {}", e),
                    Some(json!({ "waiting": st.waiters.len(), "size": st.size() })),
                );

                if let Some(waiter) = st.waiters.pop() {
                    waiter.fail(PoolError::connector(e));
                }
            }
        }

        self.check_terminated(&mut st);
        self.publish(&st);
    }

    pub(super) fn spawn_destroy(self: &Arc<Self>, st: &mut PoolState<C>, conn: C::Connection) {
        st.termination.destroying += 1;
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = shared.connector.destroy(conn).await;
            shared.finish_destroy(Some(result));
        });
    }

    /// Settle one destroy started by `spawn_destroy` or a lease revocation.
    /// `None` means the revoked lease no longer held a connection.
    pub(super) fn finish_destroy(&self, result: Option<std::result::Result<(), C::Error>>) {
        let mut st = self.state.lock();
        st.termination.destroying -= 1;

        if let Some(result) = result {
            st.counters.destroyed += 1;
            PoolMetrics::record_destroyed(&self.config.name);

            if let Err(e) = result {
                st.counters.destroy_failures += 1;
                PoolMetrics::record_failure(&self.config.name, "destroy");
                warn!("Pool '{}' failed to destroy connection: {}", self.config.name, e);
                self.telemetry.record_event(
                    TelemetrySeverity::Warning,
                    &self.config.name,
                    EventCategory::Destroy,
                    format!("Connector destroy failed: {}", e),
                    None,
                );
                if st.phase != PoolPhase::Active {
                    st.termination.failures.push(Arc::new(e));
                }
            }
        }

        self.check_terminated(&mut st);
        self.publish(&st);
    }

    fn evict_idle(self: &Arc<Self>, key: u64) {
        let mut st = self.state.lock();
        let Some(conn) = st.idle.expire(key) else {
            return;
        };

        if st.phase == PoolPhase::Active && st.size() < self.config.pool_min {
            trace!("Pool '{}' keeping idle connection for pool_min", self.config.name);
            st.idle.push(conn);
            return;
        }

        debug!(
            "Evicting idle connection from pool '{}' after {:?}",
            self.config.name, self.config.pool_timeout
        );
        self.telemetry.record_event(
            TelemetrySeverity::Info,
            &self.config.name,
            EventCategory::Eviction,
            "Idle connection evicted",
            Some(json!({
                "size": st.size(),
                "idle_ms": u64::try_from(self.config.pool_timeout.as_millis()).unwrap_or(u64::MAX),
            })),
        );
        self.spawn_destroy(&mut st, conn);
        self.publish(&st);
    }

    fn expire_waiter(&self, key: u64) {
        let mut st = self.state.lock();
        let Some(waiter) = st.waiters.expire(key) else {
            return;
        };

        st.counters.timeouts += 1;
        PoolMetrics::record_timeout(&self.config.name);
        debug!(
            "Connect request on '{}' timed out after {:?}",
            self.config.name, self.config.connect_timeout
        );
        self.telemetry.record_event(
            TelemetrySeverity::Warning,
            &self.config.name,
            EventCategory::Timeout,
            format!("Connect request timed out after {:?}", self.config.connect_timeout),
            Some(json!({ "leased": st.leased.len(), "growing": st.growing })),
        );
        waiter.fail(PoolError::Timeout(self.config.connect_timeout));
        self.publish(&st);
    }

    pub(super) fn publish(&self, st: &PoolState<C>) {
        PoolMetrics::observe_state(
            &self.config.name,
            st.idle.len(),
            st.leased.len(),
            st.growing,
            st.waiters.len(),
        );
    }
}
