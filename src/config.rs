//! Configuration for the sink.
//!
//! # Example
//!
//! ```
//! use telemetry_sink::SinkConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SinkConfig::default();
//! assert_eq!(config.buffer_size, 128);
//!
//! // Full config
//! let config = SinkConfig {
//!     journal_dir: "/var/lib/telemetry/journal".into(),
//!     max_segment_bytes: 16 * 1024 * 1024, // 16 MiB
//!     buffer_size: 256,
//!     flush_interval_ms: 500,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::journal::{CryptoError, RecordCipher};

/// Configuration for the sink and its journal.
///
/// All fields have sensible defaults; only `journal_dir` usually needs to be
/// set for production use.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Directory holding the journal segments.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Segment rotation threshold in bytes (0 = 64 MiB default).
    #[serde(default)]
    pub max_segment_bytes: u64,

    /// Base64-encoded 32-byte key enabling record encryption.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Staging buffer capacity in events.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Interval between periodic flushes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Dedup sweep interval in seconds (0 disables the sweep).
    #[serde(default = "default_dedup_clean_interval_secs")]
    pub dedup_clean_interval_secs: u64,

    /// Ingest admission rate in bytes per second.
    #[serde(default = "default_rate_limit_bytes_per_sec")]
    pub rate_limit_bytes_per_sec: f64,
}

fn default_journal_dir() -> String {
    "./data/journal".to_string()
}
fn default_buffer_size() -> usize {
    128
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_dedup_clean_interval_secs() -> u64 {
    600 // 10 minutes
}
fn default_rate_limit_bytes_per_sec() -> f64 {
    1024.0 * 1024.0 // 1 MiB/s
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            journal_dir: default_journal_dir(),
            max_segment_bytes: 0,
            encryption_key: None,
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
            dedup_clean_interval_secs: default_dedup_clean_interval_secs(),
            rate_limit_bytes_per_sec: default_rate_limit_bytes_per_sec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("encryption_key is not valid base64: {0}")]
    KeyDecode(#[from] base64::DecodeError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl SinkConfig {
    /// Decode the configured encryption key into a cipher, if set.
    pub fn cipher(&self) -> Result<Option<RecordCipher>, ConfigError> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        use base64::Engine as _;
        let key = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        Ok(Some(RecordCipher::new(&key)?))
    }

    /// Flush cadence as a [`Duration`].
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Dedup sweep cadence as a [`Duration`] (zero = disabled).
    #[must_use]
    pub fn dedup_clean_interval(&self) -> Duration {
        Duration::from_secs(self.dedup_clean_interval_secs)
    }
}
