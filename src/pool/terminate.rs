//! Two-phase shutdown.
//!
//! Terminating stops admission, fails queued callers and destroys idle
//! connections straight away. Leased connections are either revoked at once
//! (hard) or given `terminate_grace` to come back before being revoked. The
//! pool reaches `Terminated` once no lease, create or destroy is outstanding.

use super::controller::{Pool, PoolState, Shared};
use super::stats::PoolPhase;
use crate::connector::Connector;
use crate::telemetry::{EventCategory, TelemetrySeverity};
use crate::utils::error::{ConnectorError, PoolError, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Destroy failures collected during termination, shared by every caller.
pub(super) type TerminationOutcome = Arc<Vec<ConnectorError>>;

#[derive(Default)]
pub(super) struct TerminationState {
    /// Destroy operations not yet settled.
    pub(super) destroying: usize,
    pub(super) failures: Vec<ConnectorError>,
    grace_timer: Option<JoinHandle<()>>,
}

impl<C: Connector> Pool<C> {
    /// Shut the pool down and wait until every connection is destroyed.
    ///
    /// With `hard = false` leased connections get `terminate_grace` to be
    /// released before they are revoked; with `hard = true` they are revoked
    /// immediately. Repeated calls wait on the same termination; a hard call
    /// during a graceful one revokes the remaining leases right away.
    ///
    /// Destroy failures do not stop termination. They are returned together
    /// as [`PoolError::Termination`].
    pub async fn terminate(&self, hard: bool) -> Result<()> {
        let shared = &self.shared;
        let mut done = {
            let mut st = shared.state.lock();
            match st.phase {
                PoolPhase::Active => shared.begin_termination(&mut st, hard),
                PoolPhase::Terminating if hard => {
                    info!(
                        "Pool '{}' escalating to hard termination ({} leased)",
                        shared.config.name,
                        st.leased.len()
                    );
                    shared.revoke_leases(&mut st);
                    shared.check_terminated(&mut st);
                    shared.publish(&st);
                }
                _ => {}
            }
            shared.done.subscribe()
        };

        // The sender lives in `shared`, which we hold, so it cannot close.
        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PoolError::Terminated)?
            .clone();

        match outcome {
            Some(failures) if !failures.is_empty() => {
                Err(PoolError::Termination(failures.to_vec()))
            }
            _ => Ok(()),
        }
    }
}

impl<C: Connector> Shared<C> {
    fn begin_termination(self: &Arc<Self>, st: &mut PoolState<C>, hard: bool) {
        st.phase = PoolPhase::Terminating;
        info!(
            "Pool '{}' terminating ({}): {} idle, {} leased, {} waiting, {} growing",
            self.config.name,
            if hard { "hard" } else { "graceful" },
            st.idle.len(),
            st.leased.len(),
            st.waiters.len(),
            st.growing
        );

        for waiter in st.waiters.drain() {
            waiter.fail(PoolError::Terminated);
        }
        for conn in st.idle.drain() {
            self.spawn_destroy(st, conn);
        }

        if hard || self.config.terminate_grace.is_zero() {
            self.revoke_leases(st);
        } else if !st.leased.is_empty() {
            let grace = self.config.terminate_grace;
            let shared = Arc::clone(self);
            st.termination.grace_timer = Some(self.runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                let mut st = shared.state.lock();
                if st.phase != PoolPhase::Terminating {
                    return;
                }
                warn!(
                    "Pool '{}' grace period of {:?} elapsed, revoking {} lease(s)",
                    shared.config.name,
                    grace,
                    st.leased.len()
                );
                shared.revoke_leases(&mut st);
                shared.check_terminated(&mut st);
                shared.publish(&st);
            }));
        }

        self.check_terminated(st);
        self.publish(st);
    }

    /// Revoke every lease nobody is already releasing and destroy its
    /// connection once the holder's current `lock` guard is dropped.
    fn revoke_leases(self: &Arc<Self>, st: &mut PoolState<C>) {
        let mut claimed = Vec::new();
        // A slot that is already revoked is mid-release; its `reclaim` will
        // remove it and destroy the connection.
        st.leased.retain(|_, slot| {
            if slot.revoke() {
                claimed.push(Arc::clone(slot));
                false
            } else {
                true
            }
        });

        if !claimed.is_empty() {
            debug!(
                "Pool '{}' revoking {} leased connection(s)",
                self.config.name,
                claimed.len()
            );
        }

        for slot in claimed {
            st.termination.destroying += 1;
            let shared = Arc::clone(self);
            self.runtime.spawn(async move {
                let result = match slot.take().await {
                    Some(conn) => Some(shared.connector.destroy(conn).await),
                    None => None,
                };
                shared.finish_destroy(result);
            });
        }
    }

    pub(super) fn check_terminated(&self, st: &mut PoolState<C>) {
        if st.phase != PoolPhase::Terminating
            || !st.leased.is_empty()
            || st.growing > 0
            || st.termination.destroying > 0
        {
            return;
        }

        st.phase = PoolPhase::Terminated;
        if let Some(timer) = st.termination.grace_timer.take() {
            timer.abort();
        }

        let failures = std::mem::take(&mut st.termination.failures);
        if failures.is_empty() {
            info!("Pool '{}' terminated", self.config.name);
        } else {
            warn!(
                "Pool '{}' terminated with {} destroy failure(s)",
                self.config.name,
                failures.len()
            );
        }
        self.telemetry.record_event(
            if failures.is_empty() {
                TelemetrySeverity::Info
            } else {
                TelemetrySeverity::Error
            },
            &self.config.name,
            EventCategory::Termination,
            "Pool terminated",
            Some(json!({
                "destroyed": st.counters.destroyed,
                "failures": failures.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            })),
        );

        self.done.send_replace(Some(Arc::new(failures)));
    }
}
