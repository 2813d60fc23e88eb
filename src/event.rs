//! Ingest event data structure.
//!
//! The [`Event`] is the unit that flows through the staging pipeline. The
//! journal never looks inside it: events are serialized to an opaque JSON
//! blob before they are written.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single telemetry reading from an edge sensor.
///
/// # Example
///
/// ```
/// use telemetry_sink::Event;
///
/// let ev = Event::new("thermostat-3", 21).with_idempotency_id("a1b2c3");
/// assert_eq!(ev.sensor, "thermostat-3");
/// assert!(ev.encoded_size() > 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Client-supplied idempotency key. Empty means "no dedup for this event".
    #[serde(default)]
    pub idempotency_id: String,
    /// Sensor name, e.g. `thermostat-3`.
    pub sensor: String,
    /// The reading itself.
    #[serde(rename = "val")]
    pub value: i64,
    /// Millisecond unix timestamp.
    pub ts: i64,

    /// Cached serialized size in bytes (lazily computed, not serialized)
    #[serde(skip)]
    cached_size: OnceLock<usize>,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(sensor: impl Into<String>, value: i64) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self {
            idempotency_id: String::new(),
            sensor: sensor.into(),
            value,
            ts,
            cached_size: OnceLock::new(),
        }
    }

    /// Attach a client idempotency key.
    #[must_use]
    pub fn with_idempotency_id(mut self, id: impl Into<String>) -> Self {
        self.idempotency_id = id.into();
        self
    }

    /// Override the timestamp (replays, tests).
    #[must_use]
    pub fn at(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }

    /// Serialize into the opaque blob the journal stores.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize an event from a journal value blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialized size in bytes, used for byte-rate admission control.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        *self.cached_size.get_or_init(|| {
            serde_json::to_vec(self).map(|b| b.len()).unwrap_or_else(|_| {
                // JSON encoding of this shape cannot fail; keep a rough
                // estimate anyway so admission control stays monotonic.
                self.idempotency_id.len() + self.sensor.len() + 48
            })
        })
    }

    /// Human-readable journal key: `sensor_<name>{ts=<millis>}`.
    ///
    /// Keys are a label, not a unique identifier.
    #[must_use]
    pub fn journal_key(&self) -> Vec<u8> {
        format!("sensor_{}{{ts={}}}", self.sensor, self.ts).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_stamps_timestamp() {
        let ev = Event::new("temp-1", 42);
        assert_eq!(ev.sensor, "temp-1");
        assert_eq!(ev.value, 42);
        assert!(ev.ts > 0);
        assert!(ev.idempotency_id.is_empty());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let ev = Event::new("humidity-7", -3)
            .with_idempotency_id("req-9f")
            .at(1_700_000_000_000);
        let bytes = ev.encode().unwrap();
        let back = Event::decode(&bytes).unwrap();
        assert_eq!(back.idempotency_id, "req-9f");
        assert_eq!(back.sensor, "humidity-7");
        assert_eq!(back.value, -3);
        assert_eq!(back.ts, 1_700_000_000_000);
    }

    #[test]
    fn test_encoded_size_matches_blob() {
        let ev = Event::new("s", 1).at(1234);
        assert_eq!(ev.encoded_size(), ev.encode().unwrap().len());
        // Cached: second call returns the same value.
        assert_eq!(ev.encoded_size(), ev.encode().unwrap().len());
    }

    #[test]
    fn test_journal_key_format() {
        let ev = Event::new("thermostat-3", 21).at(1736000000123);
        assert_eq!(
            ev.journal_key(),
            b"sensor_thermostat-3{ts=1736000000123}".to_vec()
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Event::decode(b"not json").is_err());
    }
}
