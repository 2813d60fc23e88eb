// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sink orchestrator.
//!
//! The [`Sink`] ties the staging pipeline together: `append` runs each event
//! through the middleware chain into the ring buffer; a periodic flush loop
//! drains a snapshot of the buffer into the journal as a batch; and when the
//! buffer evicts an event on overflow, the displaced event is journaled
//! immediately and synchronously, so a burst can never silently drop data.
//!
//! ```text
//! append(ev) → [middleware chain] → ring.add
//!                                     └─ evicted? → journal.write (spill)
//! tick ───────────────────────────────→ flush() → journal.write_batch
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use telemetry_sink::{Event, Journal, JournalOptions, MemoryStorage, Sink};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let journal = Arc::new(Journal::open(storage, 0, JournalOptions::default()).unwrap());
//! let sink = Sink::builder(journal).buffer_size(64).build();
//! sink.append(Event::new("thermostat-3", 21)).unwrap();
//! sink.flush().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::event::Event;
use crate::journal::{JournalError, JournalWriter, Record};
use crate::pipeline::{compose, Handler, Middleware};
use crate::ring::RingBuffer;

/// Default staging buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Default interval between periodic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,
    #[error("duplicate event")]
    Duplicate,
    #[error("rate limited")]
    RateLimited,
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Builder for [`Sink`]. Middlewares run in registration order.
pub struct SinkBuilder {
    journal: Arc<dyn JournalWriter>,
    buffer_size: usize,
    flush_interval: Duration,
    middlewares: Vec<Middleware>,
}

impl SinkBuilder {
    /// Staging buffer capacity (default 128).
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Interval between periodic flushes (default 1 s).
    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Append a middleware to the chain.
    #[must_use]
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn build(self) -> Sink {
        let shared = Arc::new(SinkShared {
            journal: self.journal,
            buf: RingBuffer::new(self.buffer_size),
            closed: AtomicBool::new(false),
            flush_errors: AtomicU64::new(0),
            flush_interval: self.flush_interval,
        });
        let terminal: Handler = {
            let shared = Arc::clone(&shared);
            Arc::new(move |ev: Event| shared.append_to_buffer(ev))
        };
        let handler = compose(self.middlewares, terminal);
        Sink { shared, handler }
    }
}

/// Orchestrates append → chain → buffer and the periodic batch flush.
pub struct Sink {
    shared: Arc<SinkShared>,
    handler: Handler,
}

struct SinkShared {
    journal: Arc<dyn JournalWriter>,
    buf: RingBuffer<Event>,
    closed: AtomicBool,
    flush_errors: AtomicU64,
    flush_interval: Duration,
}

impl Sink {
    /// Start building a sink over the given journal.
    pub fn builder(journal: Arc<dyn JournalWriter>) -> SinkBuilder {
        SinkBuilder {
            journal,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            middlewares: Vec::new(),
        }
    }

    /// Run one event through the middleware chain into the staging buffer.
    ///
    /// Safe to call from many producer tasks concurrently. Fails with
    /// [`SinkError::Closed`] once shutdown has begun.
    pub fn append(&self, ev: Event) -> Result<(), SinkError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        (self.handler)(ev)
    }

    /// Drive the periodic flush loop until `shutdown` signals `true` (or its
    /// sender is dropped). On shutdown the sink is marked closed, one final
    /// flush runs, and its result is returned.
    ///
    /// A failed periodic flush terminates the loop and surfaces the error.
    /// No retry happens here; retries belong to the caller.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SinkError> {
        let mut ticker = tokio::time::interval(self.shared.flush_interval);
        ticker.tick().await; // arm: the first tick completes immediately
        info!(
            interval_ms = self.shared.flush_interval.as_millis() as u64,
            "sink flush loop running"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.shared.flush() {
                        warn!(error = %err, "periodic flush failed, stopping flush loop");
                        return Err(err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.shared.closed.store(true, Ordering::Release);
                        info!("shutdown requested, flushing remaining events");
                        let result = self.shared.flush();
                        if let Err(ref err) = result {
                            error!(error = %err, "final flush failed");
                        }
                        return result;
                    }
                }
            }
        }
    }

    /// Flush the current buffer snapshot to the journal immediately.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.shared.flush()
    }

    /// Mark the sink closed and run one final flush.
    pub fn close(&self) -> Result<(), SinkError> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.flush()
    }

    /// True once shutdown has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Events currently staged in the buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.buf.len()
    }

    /// Flushes that have failed since construction.
    #[must_use]
    pub fn flush_errors(&self) -> u64 {
        self.shared.flush_errors.load(Ordering::Relaxed)
    }
}

impl SinkShared {
    /// Terminal handler: stage the event, spilling any evicted one straight
    /// to the journal so overflow never loses data.
    fn append_to_buffer(&self, ev: Event) -> Result<(), SinkError> {
        crate::metrics::record_event_received();
        let evicted = self.buf.add(ev);
        crate::metrics::record_event_buffered();
        crate::metrics::set_buffer_len(self.buf.len());
        if let Some(evicted) = evicted {
            let value = evicted.encode()?;
            let seq = self.journal.write(&evicted.journal_key(), &value)?;
            crate::metrics::record_overflow_spill();
            debug!(seq, sensor = %evicted.sensor, "buffer full, spilled evicted event to journal");
        }
        Ok(())
    }

    /// Write a snapshot of the buffer to the journal as one batch.
    ///
    /// The buffer is not drained: the next tick re-flushes the same events
    /// (under fresh sequence numbers) together with anything newer. The
    /// journal is at-least-once; consumers dedup on replay.
    fn flush(&self) -> Result<(), SinkError> {
        let events = self.buf.snapshot();
        let mut batch = Vec::with_capacity(events.len());
        for ev in &events {
            match ev.encode() {
                Ok(value) => batch.push(Record {
                    key: ev.journal_key(),
                    value,
                }),
                Err(err) => {
                    self.note_flush_error();
                    return Err(err.into());
                }
            }
        }

        crate::metrics::record_flush();
        match self.journal.write_batch(&batch) {
            Ok(seqs) => {
                crate::metrics::record_flush_batch_size(seqs.len());
                if !seqs.is_empty() {
                    debug!(events = seqs.len(), "flushed buffered events");
                }
                Ok(())
            }
            Err(err) => {
                self.note_flush_error();
                Err(err.into())
            }
        }
    }

    fn note_flush_error(&self) {
        self.flush_errors.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_flush_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Journal fake that records every call.
    #[derive(Default)]
    struct RecordingJournal {
        writes: Mutex<Vec<Record>>,
        batches: Mutex<Vec<Vec<Record>>>,
        seq: AtomicU64,
    }

    impl RecordingJournal {
        fn next_seq(&self) -> u64 {
            self.seq.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    impl JournalWriter for RecordingJournal {
        fn write(&self, key: &[u8], value: &[u8]) -> Result<u64, JournalError> {
            self.writes.lock().push(Record::new(key, value));
            Ok(self.next_seq())
        }

        fn write_batch(&self, records: &[Record]) -> Result<Vec<u64>, JournalError> {
            self.batches.lock().push(records.to_vec());
            Ok(records.iter().map(|_| self.next_seq()).collect())
        }
    }

    fn event(sensor: &str, value: i64) -> Event {
        Event::new(sensor, value).at(1_700_000_000_000)
    }

    #[test]
    fn test_append_stages_without_journal_write() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Sink::builder(Arc::clone(&journal) as Arc<dyn JournalWriter>).build();
        sink.append(event("a", 1)).unwrap();
        assert_eq!(sink.buffered(), 1);
        assert!(journal.writes.lock().is_empty());
    }

    #[test]
    fn test_overflow_spills_exactly_the_evicted_event() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Sink::builder(Arc::clone(&journal) as Arc<dyn JournalWriter>)
            .buffer_size(2)
            .build();

        let first = event("one", 1);
        let expected_value = first.encode().unwrap();
        sink.append(first).unwrap();
        sink.append(event("two", 2)).unwrap();
        sink.append(event("three", 3)).unwrap();

        let writes = journal.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].key, event("one", 1).journal_key());
        assert_eq!(writes[0].value, expected_value);
    }

    #[test]
    fn test_append_after_close_fails() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Sink::builder(journal as Arc<dyn JournalWriter>).build();
        sink.close().unwrap();
        assert!(matches!(sink.append(event("a", 1)), Err(SinkError::Closed)));
    }

    #[test]
    fn test_flush_batches_newest_first_without_draining() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Sink::builder(Arc::clone(&journal) as Arc<dyn JournalWriter>)
            .buffer_size(8)
            .build();
        sink.append(event("a", 1)).unwrap();
        sink.append(event("b", 2)).unwrap();

        sink.flush().unwrap();
        sink.flush().unwrap();

        let batches = journal.batches.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].key, event("b", 2).journal_key());
        assert_eq!(batches[0][1].key, event("a", 1).journal_key());
        // Not drained: the second flush re-sends the same snapshot.
        assert_eq!(batches[1], batches[0]);
        assert_eq!(sink.buffered(), 2);
    }

    #[test]
    fn test_close_flushes_buffer() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Sink::builder(Arc::clone(&journal) as Arc<dyn JournalWriter>).build();
        sink.append(event("a", 1)).unwrap();
        sink.close().unwrap();
        assert_eq!(journal.batches.lock().len(), 1);
        assert!(sink.is_closed());
    }

    struct FailingJournal;

    impl JournalWriter for FailingJournal {
        fn write(&self, _key: &[u8], _value: &[u8]) -> Result<u64, JournalError> {
            Err(JournalError::Closed)
        }

        fn write_batch(&self, _records: &[Record]) -> Result<Vec<u64>, JournalError> {
            Err(JournalError::Closed)
        }
    }

    #[test]
    fn test_flush_failure_is_counted_and_surfaced() {
        let sink = Sink::builder(Arc::new(FailingJournal) as Arc<dyn JournalWriter>).build();
        sink.append(event("a", 1)).unwrap();
        assert!(sink.flush().is_err());
        assert_eq!(sink.flush_errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_surfaces_tick_flush_failure() {
        let sink = Arc::new(
            Sink::builder(Arc::new(FailingJournal) as Arc<dyn JournalWriter>)
                .flush_interval(Duration::from_millis(100))
                .build(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.run(shutdown_rx).await })
        };
        // Let the run loop arm its interval before the clock moves.
        tokio::task::yield_now().await;

        sink.append(event("a", 1)).unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;

        // The first failed tick terminates the loop with the flush error;
        // no shutdown signal was ever sent.
        let result = runner.await.unwrap();
        assert!(matches!(result, Err(SinkError::Journal(_))));
        assert_eq!(sink.flush_errors(), 1);
        drop(shutdown_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_on_tick_and_shutdown() {
        let journal = Arc::new(RecordingJournal::default());
        let sink = Arc::new(
            Sink::builder(Arc::clone(&journal) as Arc<dyn JournalWriter>)
                .flush_interval(Duration::from_millis(100))
                .build(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.run(shutdown_rx).await })
        };
        // Let the run loop arm its interval before the clock moves.
        tokio::task::yield_now().await;

        sink.append(event("a", 1)).unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert!(!journal.batches.lock().is_empty());

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.append(event("b", 2)), Err(SinkError::Closed)));
    }
}
