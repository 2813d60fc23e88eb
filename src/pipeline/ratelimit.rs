// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Byte-rate admission control.
//!
//! A token bucket sized in bytes: capacity `R`, refilled at `R` bytes per
//! second. Each event costs its serialized size, admitted whole or not at
//! all. Denied events fail with [`SinkError::RateLimited`] and are counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::{Handler, Middleware};
use crate::event::Event;
use crate::sink::SinkError;

/// Token-bucket rate limiter over event byte rate.
///
/// # Example
///
/// ```
/// use telemetry_sink::RateLimiter;
///
/// let limiter = RateLimiter::new(1024.0 * 1024.0); // 1 MiB/s
/// assert!(limiter.allow(512));
/// assert_eq!(limiter.dropped(), 0);
/// ```
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    bucket: Mutex<Bucket>,
    dropped: AtomicU64,
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter admitting `bytes_per_sec` bytes per second, with a
    /// burst capacity of the same size. A zero rate admits nothing: the
    /// bucket has no tokens and never refills.
    #[must_use]
    pub fn new(bytes_per_sec: f64) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                bucket: Mutex::new(Bucket {
                    capacity: bytes_per_sec,
                    tokens: bytes_per_sec,
                    refill_per_sec: bytes_per_sec,
                    last_refill: Instant::now(),
                }),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Request `bytes` tokens. All-or-nothing: either the whole event is
    /// admitted or the bucket is left untouched.
    pub fn allow(&self, bytes: usize) -> bool {
        self.inner.allow(bytes)
    }

    /// Events denied since construction.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Middleware applying admission control to each event.
    #[must_use]
    pub fn middleware(&self) -> Middleware {
        let inner = Arc::clone(&self.inner);
        Box::new(move |next: Handler| -> Handler {
            let inner = Arc::clone(&inner);
            Arc::new(move |ev: Event| {
                let cost = ev.encoded_size();
                if !inner.allow(cost) {
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_rate_limited();
                    debug!(sensor = %ev.sensor, cost, "event rate limited");
                    return Err(SinkError::RateLimited);
                }
                crate::metrics::record_rate_limit_admitted(cost);
                next(ev)
            })
        })
    }
}

impl LimiterInner {
    fn allow(&self, bytes: usize) -> bool {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * bucket.refill_per_sec).min(bucket.capacity);
        bucket.last_refill = now;

        let cost = bytes as f64;
        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            true
        } else {
            false
        }
    }
}
