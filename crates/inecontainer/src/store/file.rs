//! File-backed store.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::area::FileIndex;
use crate::segment::Segment;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// A `std::fs::File`-backed store.
///
/// Every call seeks explicitly before reading or writing, so a `FileStore`
/// has no notion of a "current position" between calls; callers address
/// every operation by an absolute [`FileIndex`].
#[derive(Debug)]
pub struct FileStore {
    file: File,
    size: u64,
}

impl FileStore {
    /// Open `path` for read/write, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())
            .map_err(|error| io_status(&error, "open"))?;
        let size = file
            .metadata()
            .map_err(|error| io_status(&error, "stat"))?
            .len();
        Ok(Self { file, size })
    }

    /// Open an existing file for read/write, failing if it does not exist.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(|error| io_status(&error, "open"))?;
        let size = file
            .metadata()
            .map_err(|error| io_status(&error, "stat"))?
            .len();
        Ok(Self { file, size })
    }
}

impl BackingStore for FileStore {
    fn read(&mut self, index: FileIndex, segments: &[Segment]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(index.get()))
            .map_err(|error| io_status(&error, "seek"))?;
        for segment in segments {
            if segment.length() == 0 {
                continue;
            }
            // SAFETY: every Segment passed to a BackingStore::read call is
            // built from a live, writable buffer at least `length` bytes
            // long that outlives the call.
            let buffer = unsafe {
                std::slice::from_raw_parts_mut(segment.base() as *mut u8, segment.length())
            };
            self.file
                .read_exact(buffer)
                .map_err(|error| io_status(&error, "read"))?;
        }
        Ok(())
    }

    fn write(&mut self, index: FileIndex, segments: &[Segment]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(index.get()))
            .map_err(|error| io_status(&error, "seek"))?;
        let mut end = index.get();
        for segment in segments {
            if segment.length() == 0 {
                continue;
            }
            // SAFETY: every Segment passed to a BackingStore::write call is
            // built from a live, readable buffer at least `length` bytes
            // long that outlives the call.
            let buffer = unsafe { segment.as_slice::<'_>() };
            self.file
                .write_all(buffer)
                .map_err(|error| io_status(&error, "write"))?;
            end += segment.length() as u64;
        }
        if end > self.size {
            self.size = end;
        }
        Ok(())
    }

    fn size(&self) -> FileIndex {
        FileIndex(self.size)
    }

    fn truncate(&mut self, size: FileIndex) -> Result<()> {
        self.file
            .set_len(size.get())
            .map_err(|error| io_status(&error, "truncate"))?;
        self.size = size.get();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|error| io_status(&error, "flush"))
    }
}

fn io_status(error: &io::Error, operation: &str) -> Status {
    tracing::error!(operation, %error, "backing file operation failed");
    Status::failure(
        StatusClass::FilesystemError,
        error.raw_os_error().unwrap_or(-1),
        format!("{operation} failed: {error}"),
    )
}
