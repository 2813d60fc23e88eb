//! File-backed segment storage.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use super::storage::{is_segment_name, BlobWriter, SegmentReader, SegmentStore};

/// [`SegmentStore`] over a single directory of `NNNNNN.wal` files.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the journal directory.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[derive(Debug)]
struct FileWriter {
    file: File,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FileWriter {
    fn sync(&mut self) -> io::Result<()> {
        // Sync the handle that actually buffered the writes; segment length
        // is all that matters here, so data-only sync is enough.
        self.file.sync_data()
    }
}

impl SegmentStore for FileStorage {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))?;
        Ok(Box::new(FileWriter { file }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn SegmentReader>> {
        let file = File::open(self.path(name))?;
        // Cap the reader at the length observed now so concurrent appends do
        // not leak a half-written record into this snapshot.
        let len = file.metadata()?.len();
        Ok(Box::new(file.take(len)))
    }

    fn open_append(&self, name: &str) -> io::Result<(Box<dyn BlobWriter>, u64)> {
        let file = OpenOptions::new().append(true).open(self.path(name))?;
        let size = file.metadata()?.len();
        Ok((Box::new(FileWriter { file }), size))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if let Some(name) = dir_entry.file_name().to_str() {
                if is_segment_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}
