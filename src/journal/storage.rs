//! Storage abstraction for journal segments.
//!
//! The journal depends only on [`SegmentStore`]: named append-only blobs
//! with exclusive create, snapshot reads, append with size reporting, and
//! listing. [`MemoryStorage`] mirrors the file-backed implementation so the
//! journal can be exercised without touching disk.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Write handle for one segment.
///
/// `sync` flushes this handle's bytes down to durable storage. Durability is
/// a property of the handle that buffered the writes, which is why it lives
/// here and not on the store.
pub trait BlobWriter: Write + Send + Sync + std::fmt::Debug {
    fn sync(&mut self) -> io::Result<()>;
}

/// Snapshot reader returned by [`SegmentStore::open`].
pub trait SegmentReader: Read + Send + std::fmt::Debug {}

impl<T: Read + Send + std::fmt::Debug> SegmentReader for T {}

/// Named append-only blob storage.
///
/// `open` must return a reader over a stable snapshot of the bytes present
/// at call time, even if the blob is appended to concurrently.
pub trait SegmentStore: Send + Sync {
    /// Exclusive create: fails if the name already exists.
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>>;

    /// Snapshot read of the named blob.
    fn open(&self, name: &str) -> io::Result<Box<dyn SegmentReader>>;

    /// Open an existing blob for append, reporting its current size.
    fn open_append(&self, name: &str) -> io::Result<(Box<dyn BlobWriter>, u64)>;

    /// All segment names (`*.wal`), in no particular order.
    fn list(&self) -> io::Result<Vec<String>>;
}

const SEGMENT_SUFFIX: &str = ".wal";

pub(super) fn is_segment_name(name: &str) -> bool {
    name.ends_with(SEGMENT_SUFFIX)
}

/// In-memory [`SegmentStore`] for tests and embedded use.
///
/// Cloning is cheap and shares the underlying blobs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct MemWriter {
    name: String,
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut blobs = self.blobs.lock();
        let blob = blobs
            .get_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.name.clone()))?;
        blob.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemWriter {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SegmentStore for MemoryStorage {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        let mut blobs = self.blobs.lock();
        if blobs.contains_key(name) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, name.to_string()));
        }
        blobs.insert(name.to_string(), Vec::new());
        Ok(Box::new(MemWriter {
            name: name.to_string(),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn SegmentReader>> {
        let blobs = self.blobs.lock();
        let bytes = blobs
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_append(&self, name: &str) -> io::Result<(Box<dyn BlobWriter>, u64)> {
        let blobs = self.blobs.lock();
        let size = blobs
            .get(name)
            .map(|b| b.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        drop(blobs);
        Ok((
            Box::new(MemWriter {
                name: name.to_string(),
                blobs: Arc::clone(&self.blobs),
            }),
            size,
        ))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self
            .blobs
            .lock()
            .keys()
            .filter(|name| is_segment_name(name))
            .cloned()
            .collect())
    }
}
