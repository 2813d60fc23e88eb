//! # Telemetry Sink
//!
//! An event-ingest sink for IoT telemetry: small, high-rate events are
//! filtered, deduplicated, buffered in memory, and durably persisted to a
//! segmented append-only journal that can be replayed after restart.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Ingest Layer                          │
//! │  • Accepts Events via Sink::append                          │
//! │  • Safe under many concurrent producers                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Middleware Chain                         │
//! │  • Deduplicator: idempotency-key suppression                │
//! │  • RateLimiter: token-bucket byte-rate admission            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Staging Ring Buffer                         │
//! │  • Bounded, most-recent-wins                                │
//! │  • Eviction spills the displaced event straight to the      │
//! │    journal (overflow is never silent loss)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (periodic batch flush)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Segmented Journal                         │
//! │  • Append-only NNNNNN.wal segments with rotation            │
//! │  • CRC32-framed records, optional AES-256-GCM               │
//! │  • Monotonic sequences, ordered replay after restart        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use telemetry_sink::{
//!     Deduplicator, Event, FileStorage, Journal, JournalOptions, RateLimiter, Sink, SinkConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::tempdir()?;
//! let config = SinkConfig {
//! #   journal_dir: dir.path().display().to_string(),
//!     // journal_dir: "/var/lib/telemetry/journal".into(),
//!     ..Default::default()
//! };
//!
//! let storage = Arc::new(FileStorage::new(&config.journal_dir)?);
//! let journal = Arc::new(Journal::open(
//!     storage,
//!     config.max_segment_bytes,
//!     JournalOptions::default().with_optional_cipher(config.cipher()?),
//! )?);
//!
//! let dedup = Deduplicator::new(config.dedup_clean_interval());
//! let limiter = RateLimiter::new(config.rate_limit_bytes_per_sec);
//! let sink = Sink::builder(Arc::clone(&journal) as _)
//!     .buffer_size(config.buffer_size)
//!     .flush_interval(config.flush_interval())
//!     .middleware(dedup.middleware())
//!     .middleware(limiter.middleware())
//!     .build();
//!
//! sink.append(Event::new("thermostat-3", 21).with_idempotency_id("req-1"))?;
//! sink.close()?;
//! journal.sync()?;
//!
//! // After a restart, replay the log in order.
//! journal.replay(|entry| {
//!     let ev = Event::decode(&entry.value)?;
//!     println!("seq={} sensor={}", entry.seq, ev.sensor);
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`sink`]: the [`Sink`] orchestrator (append, run loop, flush)
//! - [`journal`]: segmented write-ahead journal with framing and encryption
//! - [`pipeline`]: middleware chain, [`Deduplicator`], [`RateLimiter`]
//! - [`ring`]: the bounded staging buffer
//! - [`config`]: [`SinkConfig`]
//! - [`metrics`]: `metrics`-crate instrumentation helpers

pub mod config;
pub mod event;
pub mod journal;
pub mod metrics;
pub mod pipeline;
pub mod ring;
pub mod sink;

pub use config::{ConfigError, SinkConfig};
pub use event::Event;
pub use journal::{
    BlobWriter, CryptoError, Entry, FileStorage, Journal, JournalError, JournalOptions,
    JournalWriter, MemoryStorage, Record, RecordCipher, SegmentStore,
};
pub use pipeline::dedup::Deduplicator;
pub use pipeline::ratelimit::RateLimiter;
pub use pipeline::{Handler, Middleware};
pub use ring::RingBuffer;
pub use sink::{Sink, SinkBuilder, SinkError};
