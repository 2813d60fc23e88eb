//! Segmented append-only journal.
//!
//! The journal persists records into numbered segment files
//! (`000001.wal`, `000002.wal`, ...) behind a [`SegmentStore`]. Exactly one
//! segment is active for append at a time; once a successor is created the
//! old segment is sealed and never written again. Every record carries a
//! checksum and a sequence number that is strictly increasing and contiguous
//! for the life of the log, surviving restarts.
//!
//! # Durability
//!
//! `write` and `write_batch` return once the in-process writer has accepted
//! the bytes. Durability is only guaranteed after [`Journal::sync`] (or a
//! rotation, which syncs the outgoing segment before sealing it). The
//! journal never retries or truncates on its own; errors surface to the
//! caller.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use telemetry_sink::{Journal, JournalOptions, MemoryStorage};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let journal = Journal::open(storage, 0, JournalOptions::default()).unwrap();
//! let seq = journal.write(b"sensor_a{ts=1}", b"payload").unwrap();
//! assert_eq!(seq, 1);
//! journal.sync().unwrap();
//! ```

mod crypto;
mod frame;
mod fs;
mod storage;

pub use crypto::{CryptoError, RecordCipher, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use frame::{Entry, Record};
pub use fs::FileStorage;
pub use storage::{BlobWriter, MemoryStorage, SegmentReader, SegmentStore};

use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

/// Default segment rotation threshold: 64 MiB.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("record failed checksum verification")]
    BadChecksum,
    #[error("record body truncated")]
    TruncatedRecord,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal is closed")]
    Closed,
}

/// Construction options for [`Journal::open`].
#[derive(Default)]
pub struct JournalOptions {
    cipher: Option<RecordCipher>,
}

impl JournalOptions {
    /// Encrypt record payloads with the given cipher.
    #[must_use]
    pub fn with_cipher(mut self, cipher: RecordCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Encrypt record payloads when a cipher is configured.
    #[must_use]
    pub fn with_optional_cipher(mut self, cipher: Option<RecordCipher>) -> Self {
        self.cipher = cipher;
        self
    }
}

/// The write contract the sink consumes.
///
/// Kept as a trait so tests can substitute a recording fake for the real
/// segmented journal.
pub trait JournalWriter: Send + Sync {
    /// Append one record, returning its assigned sequence number.
    fn write(&self, key: &[u8], value: &[u8]) -> Result<u64, JournalError>;

    /// Append a batch under one lock, returning sequence numbers in input
    /// order. The batch may span a segment rotation.
    fn write_batch(&self, records: &[Record]) -> Result<Vec<u64>, JournalError>;
}

/// Segmented write-ahead journal. See the module docs for the contract.
pub struct Journal {
    storage: Arc<dyn SegmentStore>,
    cipher: Option<RecordCipher>,
    max_segment_bytes: u64,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("max_segment_bytes", &self.max_segment_bytes)
            .finish_non_exhaustive()
    }
}

struct Inner {
    writer: Option<BufWriter<Box<dyn BlobWriter>>>,
    segment: u64,
    seq: u64,
    size: u64,
}

impl Journal {
    /// Open the journal, creating `000001.wal` if the store is empty, or
    /// scanning the newest segment to recover the sequence counter.
    ///
    /// `max_segment_bytes == 0` selects the 64 MiB default. A checksum
    /// failure in the active segment aborts the open: the journal does not
    /// silently truncate, the caller decides what to do with a corrupt log.
    pub fn open(
        storage: Arc<dyn SegmentStore>,
        max_segment_bytes: u64,
        options: JournalOptions,
    ) -> Result<Self, JournalError> {
        let max_segment_bytes = if max_segment_bytes == 0 {
            DEFAULT_MAX_SEGMENT_BYTES
        } else {
            max_segment_bytes
        };
        let journal = Self {
            storage,
            cipher: options.cipher,
            max_segment_bytes,
            inner: RwLock::new(Inner {
                writer: None,
                segment: 0,
                seq: 0,
                size: 0,
            }),
        };
        journal.open_latest()?;
        Ok(journal)
    }

    fn open_latest(&self) -> Result<(), JournalError> {
        let names = self.storage.list()?;
        let mut inner = self.inner.write();

        let Some(latest) = names.iter().filter_map(|n| parse_segment_number(n)).max() else {
            self.roll_segment(&mut inner)?;
            info!(segment = %segment_name(inner.segment), "journal initialized empty");
            return Ok(());
        };

        // Only the newest segment is scanned: sealed segments were verified
        // at write time and hold sequences below the active maximum.
        inner.segment = latest;
        let name = segment_name(latest);
        inner.seq = self.scan(&name)?;

        let (writer, size) = self.storage.open_append(&name)?;
        inner.writer = Some(BufWriter::new(writer));
        inner.size = size;
        info!(
            segment = %name,
            size,
            last_seq = inner.seq,
            "journal opened at latest segment"
        );
        Ok(())
    }

    /// Scan one segment and return the highest sequence number seen.
    fn scan(&self, name: &str) -> Result<u64, JournalError> {
        let mut reader = BufReader::new(self.storage.open(name)?);
        let mut max_seq = 0;
        while let Some(entry) = frame::read_record(&mut reader, self.cipher.as_ref())? {
            max_seq = max_seq.max(entry.seq);
        }
        Ok(max_seq)
    }

    /// Seal the active segment (flush, sync, close) and start its successor.
    fn roll_segment(&self, inner: &mut Inner) -> Result<(), JournalError> {
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_mut().sync()?;
        }
        inner.segment += 1;
        let name = segment_name(inner.segment);
        let writer = self.storage.create(&name)?;
        debug!(segment = %name, "rotated to new segment");
        inner.writer = Some(BufWriter::new(writer));
        inner.size = 0;
        Ok(())
    }

    fn append_record(
        &self,
        inner: &mut Inner,
        key: &[u8],
        value: &[u8],
    ) -> Result<u64, JournalError> {
        if inner.writer.is_none() {
            return Err(JournalError::Closed);
        }
        inner.seq += 1;

        // The threshold is checked before the write, so one oversized record
        // may exceed it; records are never split across segments.
        if inner.size >= self.max_segment_bytes {
            self.roll_segment(inner)?;
        }

        let record = frame::encode_record(inner.seq, key, value, self.cipher.as_ref())?;
        let Some(writer) = inner.writer.as_mut() else {
            return Err(JournalError::Closed);
        };
        writer.write_all(&record)?;
        inner.size += record.len() as u64;
        Ok(inner.seq)
    }

    /// Flush buffered bytes and sync the active segment to durable storage.
    ///
    /// Sealed segments were synced when they were sealed.
    pub fn sync(&self) -> Result<(), JournalError> {
        let mut inner = self.inner.write();
        let writer = inner.writer.as_mut().ok_or(JournalError::Closed)?;
        writer.flush()?;
        writer.get_mut().sync()?;
        Ok(())
    }

    /// Flush, sync, and release the active writer. Idempotent; writes after
    /// close fail with [`JournalError::Closed`].
    pub fn close(&self) -> Result<(), JournalError> {
        let mut inner = self.inner.write();
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_mut().sync()?;
        }
        Ok(())
    }

    /// Deliver every persisted record, in sequence order, to `visit`.
    ///
    /// Holds the shared lock, so replays can run side by side while writers
    /// wait. A failed checksum aborts with [`JournalError::BadChecksum`]; an
    /// error from `visit` aborts with that error. Records already delivered
    /// are not retracted.
    pub fn replay<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(Entry) -> Result<(), E>,
        E: From<JournalError>,
    {
        let _guard = self.inner.read();
        let mut names = self
            .storage
            .list()
            .map_err(|e| E::from(JournalError::Io(e)))?;
        names.sort();
        for name in &names {
            // A segment that cannot be opened is a hole in the log; surface
            // it instead of replaying around it.
            let reader = self
                .storage
                .open(name)
                .map_err(|e| E::from(JournalError::Io(e)))?;
            let mut reader = BufReader::new(reader);
            while let Some(entry) =
                frame::read_record(&mut reader, self.cipher.as_ref()).map_err(E::from)?
            {
                visit(entry)?;
            }
        }
        Ok(())
    }

    /// Sequence number of the most recent write (0 before any write).
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.inner.read().seq
    }

    /// Append one record, returning its assigned sequence number.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<u64, JournalError> {
        let mut inner = self.inner.write();
        self.append_record(&mut inner, key, value)
    }

    /// Append a batch under one lock, returning sequence numbers in input
    /// order. The batch may span a segment rotation.
    pub fn write_batch(&self, records: &[Record]) -> Result<Vec<u64>, JournalError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.write();
        let mut seqs = Vec::with_capacity(records.len());
        for record in records {
            // A mid-batch failure aborts here. Entries already appended stay
            // in the log; the error tells the caller durability is partial.
            seqs.push(self.append_record(&mut inner, &record.key, &record.value)?);
        }
        Ok(seqs)
    }
}

impl JournalWriter for Journal {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<u64, JournalError> {
        Journal::write(self, key, value)
    }

    fn write_batch(&self, records: &[Record]) -> Result<Vec<u64>, JournalError> {
        Journal::write_batch(self, records)
    }
}

fn segment_name(n: u64) -> String {
    format!("{n:06}.wal")
}

fn parse_segment_number(name: &str) -> Option<u64> {
    name.strip_suffix(".wal")?.parse().ok()
}
