//! Debounced connectivity observer.
//!
//! The host platform feeds raw connectivity events into
//! [`NetworkMonitor::report`]. A change is published to subscribers only after
//! it has held for the debounce window, so radio handoffs that flap
//! online/offline/online never reach the sync engine.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::models::NetworkState;

/// Shared, cloneable handle to one connectivity observer.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    debounce: Duration,
    published: watch::Sender<NetworkState>,
    pending: Mutex<PendingChange>,
}

#[derive(Debug, Default)]
struct PendingChange {
    generation: u64,
    candidate: Option<NetworkState>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("debounce", &self.inner.debounce)
            .field("current", &self.current())
            .finish()
    }
}

impl NetworkMonitor {
    /// Create a monitor that starts out publishing `initial`.
    pub fn new(initial: NetworkState, debounce: Duration) -> Self {
        let (published, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                debounce,
                published,
                pending: Mutex::new(PendingChange::default()),
            }),
        }
    }

    /// Feed a raw platform connectivity event. Never blocks.
    ///
    /// Outside a tokio runtime, or with a zero debounce, the change is
    /// published immediately.
    pub fn report(&self, raw: NetworkState) {
        let generation = {
            let mut pending = self.lock_pending();
            if pending.candidate == Some(raw) {
                return;
            }
            pending.generation += 1;
            if raw == *self.inner.published.borrow() {
                if pending.candidate.take().is_some() {
                    tracing::debug!("Connectivity flap suppressed");
                }
                return;
            }
            pending.candidate = Some(raw);
            pending.generation
        };

        if self.inner.debounce.is_zero() {
            self.settle(generation);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let monitor = self.clone();
                let debounce = self.inner.debounce;
                handle.spawn(async move {
                    tokio::time::sleep(debounce).await;
                    monitor.settle(generation);
                });
            }
            Err(_) => self.settle(generation),
        }
    }

    fn settle(&self, generation: u64) {
        let mut pending = self.lock_pending();
        if pending.generation != generation {
            return;
        }
        let Some(state) = pending.candidate.take() else {
            return;
        };

        let changed = self.inner.published.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network state changed: connected={} reachable={:?} type={} offline={}",
                state.is_connected,
                state.is_internet_reachable,
                state.connection_type,
                state.is_offline()
            );
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingChange> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest published (debounced) state
    pub fn current(&self) -> NetworkState {
        *self.inner.published.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.current().is_offline()
    }

    /// Subscribe to published states.
    ///
    /// The first `changed()` on the returned receiver resolves immediately
    /// with the current state.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        let mut receiver = self.inner.published.subscribe();
        receiver.mark_changed();
        receiver
    }
}
