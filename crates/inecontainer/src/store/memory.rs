//! In-memory backing store, used throughout this crate's test suite.

use crate::area::FileIndex;
use crate::segment::Segment;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// A `Vec<u8>`-backed store. Mirrors the source library's
/// `MemoryContainer`: useful for tests and for short-lived containers
/// that never touch the filesystem.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    buffer: Vec<u8>,
}

impl MemoryStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    /// Borrow the store's raw contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

impl BackingStore for MemoryStore {
    fn read(&mut self, index: FileIndex, segments: &[Segment]) -> Result<()> {
        let mut offset = index.get() as usize;
        for segment in segments {
            let length = segment.length();
            if length == 0 {
                continue;
            }
            let end = offset
                .checked_add(length)
                .ok_or_else(|| short_read(offset, length, self.buffer.len()))?;
            if end > self.buffer.len() {
                return Err(short_read(offset, length, self.buffer.len()));
            }
            // SAFETY: segment.base() was built from a live, writable buffer
            // of at least `length` bytes by the caller (BackingStore::read's
            // contract); we only ever reach this code through that path.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.buffer[offset..end].as_ptr(),
                    segment.base() as *mut u8,
                    length,
                );
            }
            offset = end;
        }
        Ok(())
    }

    fn write(&mut self, index: FileIndex, segments: &[Segment]) -> Result<()> {
        let mut offset = index.get() as usize;
        let total: usize = segments.iter().map(Segment::length).sum();
        if offset + total > self.buffer.len() {
            self.buffer.resize(offset + total, 0);
        }
        for segment in segments {
            let length = segment.length();
            if length == 0 {
                continue;
            }
            // SAFETY: segment.base() was built from a live buffer of at
            // least `length` readable bytes by the caller.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    segment.base(),
                    self.buffer[offset..offset + length].as_mut_ptr(),
                    length,
                );
            }
            offset += length;
        }
        Ok(())
    }

    fn size(&self) -> FileIndex {
        FileIndex(self.buffer.len() as u64)
    }

    fn truncate(&mut self, size: FileIndex) -> Result<()> {
        self.buffer.resize(size.get() as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn short_read(offset: usize, length: usize, store_len: usize) -> Status {
    tracing::warn!(
        offset,
        length,
        store_len,
        "short read past end of memory store"
    );
    Status::failure(
        StatusClass::FilesystemError,
        1,
        format!(
            "short read: offset {offset} + length {length} exceeds store size {store_len}"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut store = MemoryStore::new();
        let data = [1u8, 2, 3, 4, 5];
        store.write_bytes(FileIndex(0), &data).unwrap();
        assert_eq!(store.size(), FileIndex(5));

        let mut buffer = [0u8; 5];
        store.read_bytes(FileIndex(0), &mut buffer).unwrap();
        assert_eq!(buffer, data);
    }

    #[test]
    fn write_extends_store() {
        let mut store = MemoryStore::new();
        store.write_bytes(FileIndex(10), &[9u8; 4]).unwrap();
        assert_eq!(store.size(), FileIndex(14));
        assert_eq!(&store.as_slice()[10..14], &[9u8; 4]);
    }

    #[test]
    fn read_past_end_fails() {
        let mut store = MemoryStore::new();
        store.write_bytes(FileIndex(0), &[1u8; 4]).unwrap();

        let mut buffer = [0u8; 8];
        let status = store.read_bytes(FileIndex(0), &mut buffer).unwrap_err();
        assert!(status.failure_bit());
        assert_eq!(status.status_class(), StatusClass::FilesystemError);
    }

    #[test]
    fn scatter_gather_write_and_read() {
        let mut store = MemoryStore::new();
        let a = [1u8, 2];
        let b = [3u8, 4, 5];
        let segments = [Segment::from_slice(&a), Segment::from_slice(&b)];
        store.write(FileIndex(0), &segments).unwrap();

        let mut out_a = [0u8; 2];
        let mut out_b = [0u8; 3];
        let read_segments = [
            Segment::from_slice_mut(&mut out_a),
            Segment::from_slice_mut(&mut out_b),
        ];
        store.read(FileIndex(0), &read_segments).unwrap();
        assert_eq!(out_a, a);
        assert_eq!(out_b, b);
    }

    #[test]
    fn truncate_shrinks_and_grows() {
        let mut store = MemoryStore::new();
        store.write_bytes(FileIndex(0), &[1u8; 10]).unwrap();
        store.truncate(FileIndex(4)).unwrap();
        assert_eq!(store.size(), FileIndex(4));

        store.truncate(FileIndex(8)).unwrap();
        assert_eq!(store.size(), FileIndex(8));
        assert_eq!(&store.as_slice()[4..8], &[0u8; 4]);
    }
}
