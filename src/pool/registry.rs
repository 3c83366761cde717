//! FIFO queue whose entries each carry an independent expiry timer.
//!
//! The registry is used twice by the pool: once for idle connections (aged
//! out after `pool_timeout`) and once for waiters (failed after
//! `connect_timeout`). It performs no locking itself; it lives inside the
//! pool state and the expiry hook re-enters the pool through its own lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Callback invoked from the timer task with the key of the expired entry.
///
/// The hook is expected to call [`TimeoutRegistry::expire`] to take the item
/// out; if the entry was dequeued in the meantime that call returns `None`.
pub type ExpireHook = Arc<dyn Fn(u64) + Send + Sync>;

struct Entry<T> {
    key: u64,
    item: T,
    added_at: Instant,
    timer: Option<JoinHandle<()>>,
}

impl<T> Entry<T> {
    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct TimeoutRegistry<T> {
    entries: VecDeque<Entry<T>>,
    delay: Option<Duration>,
    next_key: u64,
    on_expire: ExpireHook,
    runtime: Handle,
}

impl<T> TimeoutRegistry<T> {
    /// Create a registry. `delay = None` disables timers entirely.
    ///
    /// Timer tasks run on `runtime`, so `push` may be called from any thread.
    pub fn new(delay: Option<Duration>, on_expire: ExpireHook, runtime: Handle) -> Self {
        Self {
            entries: VecDeque::new(),
            delay: delay.filter(|d| !d.is_zero()),
            next_key: 0,
            on_expire,
            runtime,
        }
    }

    /// Enqueue an item at the back and arm its timer. Returns the entry key.
    pub fn push(&mut self, item: T) -> u64 {
        let key = self.next_key;
        self.next_key += 1;

        let timer = self.delay.map(|delay| {
            let hook = Arc::clone(&self.on_expire);
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                trace!("Registry entry {} expired after {:?}", key, delay);
                hook(key);
            })
        });

        self.entries.push_back(Entry {
            key,
            item,
            added_at: Instant::now(),
            timer,
        });
        key
    }

    /// Dequeue the oldest item and cancel its timer.
    pub fn pop(&mut self) -> Option<T> {
        self.pop_entry().map(|(item, _)| item)
    }

    /// Dequeue the oldest item along with how long it sat in the queue.
    pub fn pop_entry(&mut self) -> Option<(T, Duration)> {
        let mut entry = self.entries.pop_front()?;
        entry.cancel();
        Some((entry.item, entry.added_at.elapsed()))
    }

    /// Remove the entry with `key`, if it is still queued.
    ///
    /// Called from expiry hooks; the timer has already fired so there is
    /// nothing left to cancel.
    pub fn expire(&mut self, key: u64) -> Option<T> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        let mut entry = self.entries.remove(index)?;
        entry.timer.take();
        Some(entry.item)
    }

    /// Remove every entry, oldest first, cancelling all timers.
    pub fn drain(&mut self) -> Vec<T> {
        self.entries
            .drain(..)
            .map(|mut entry| {
                entry.cancel();
                entry.item
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

impl<T> Drop for TimeoutRegistry<T> {
    fn drop(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.cancel();
        }
    }
}

impl<T> fmt::Debug for TimeoutRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutRegistry")
            .field("len", &self.entries.len())
            .field("delay", &self.delay)
            .finish()
    }
}
