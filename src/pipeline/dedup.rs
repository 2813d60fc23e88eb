//! Idempotency-key deduplication.
//!
//! Tracks idempotency keys in a concurrent map and rejects events whose key
//! was already seen. A background task periodically drops the whole map - a
//! deliberately coarse retention policy: a key is remembered for at least one
//! sweep interval and at most two, which is what the ingest contract needs
//! (suppress client retries, not provide a durable barrier).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{Handler, Middleware};
use crate::event::Event;
use crate::sink::SinkError;

/// Suppresses events that repeat an idempotency key within the retention
/// window. Events with an empty key bypass deduplication entirely.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use telemetry_sink::Deduplicator;
///
/// let dedup = Deduplicator::new(Duration::from_secs(600));
/// assert_eq!(dedup.tracked(), 0);
/// ```
pub struct Deduplicator {
    seen: Arc<DashMap<String, ()>>,
    sweep_interval: Duration,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Deduplicator {
    /// Create a deduplicator that sweeps every `sweep_interval`. A zero
    /// interval disables the sweep; the map then grows without bound, which
    /// is only acceptable in tests.
    #[must_use]
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            sweep_interval,
            stop_tx: Mutex::new(None),
        }
    }

    /// Spawn the periodic sweep task. No-op when the interval is zero or the
    /// task is already running. Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.sweep_interval.is_zero() {
            return;
        }
        let mut guard = self.stop_tx.lock();
        if guard.is_some() {
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *guard = Some(tx);

        let seen = Arc::clone(&self.seen);
        let interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // arm: the first tick completes immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let swept = seen.len();
                        seen.clear();
                        crate::metrics::set_dedup_tracked(0);
                        if swept > 0 {
                            debug!(swept, "idempotency keys swept");
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            info!("dedup sweep task stopping");
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Stop the sweep task. Safe to call multiple times.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(true);
        }
    }

    /// Number of idempotency keys currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    /// Middleware enforcing the dedup contract on each event.
    #[must_use]
    pub fn middleware(&self) -> Middleware {
        let seen = Arc::clone(&self.seen);
        Box::new(move |next: Handler| -> Handler {
            let seen = Arc::clone(&seen);
            Arc::new(move |ev: Event| {
                if ev.idempotency_id.is_empty() {
                    return next(ev);
                }
                if seen.insert(ev.idempotency_id.clone(), ()).is_some() {
                    crate::metrics::record_dedup_dropped();
                    debug!(idempotency_id = %ev.idempotency_id, "duplicate event dropped");
                    return Err(SinkError::Duplicate);
                }
                crate::metrics::set_dedup_tracked(seen.len());
                next(ev)
            })
        })
    }
}

impl Drop for Deduplicator {
    fn drop(&mut self) {
        self.stop();
    }
}
