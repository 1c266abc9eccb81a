//! Low-level chunk handle exposing the common-header operations
//! directly, with an arbitrary-sized additional header region that the
//! caller fills itself. Typed variants like [`crate::chunk::FileHeaderChunk`]
//! are convenience wrappers built on the same primitives this type uses;
//! `RawChunk` stays around for callers (and tests) that need the bare
//! common-header/CRC contract without a variant's own field layout.

use crate::area::FileIndex;
use crate::chunk::header::{
    chunk_size_for_class, fitting_size_class, ChunkType, COMMON_HEADER_SIZE_BYTES,
};
use crate::chunk::io;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// A chunk addressed purely by its common header fields and a raw
/// additional-header byte range.
///
/// `additional_header_size_bytes` is the caller's *requested* logical
/// size, tracked separately from the buffer's physical size (the chunk
/// size class rounds the request up to the next power of two, same as
/// the source library's `Chunk` constructor). `additional_header()` and
/// `additional_header_mut()` expose exactly that many bytes, not the
/// full padded region.
#[derive(Debug)]
pub struct RawChunk {
    starting_index: FileIndex,
    buffer: Vec<u8>,
    size_class: u8,
    chunk_type: ChunkType,
    number_valid_bytes: u32,
    flags: u8,
    additional_header_size_bytes: usize,
    /// False only for the generic "unknown type" fallback, where no
    /// caller-supplied size exists; `load` then reports the chunk's full
    /// physical capacity as the additional-header size instead.
    size_is_explicit: bool,
}

impl RawChunk {
    /// Build a writable chunk at `starting_index` with room for
    /// `additional_header_size_bytes` bytes beyond the common header.
    pub fn new(starting_index: FileIndex, additional_header_size_bytes: usize) -> Result<Self> {
        let size_class =
            fitting_size_class(COMMON_HEADER_SIZE_BYTES + additional_header_size_bytes)?;
        let chunk_size = chunk_size_for_class(size_class);
        Ok(Self {
            starting_index,
            buffer: vec![0u8; chunk_size],
            size_class,
            chunk_type: ChunkType::Unknown(0),
            number_valid_bytes: 0,
            flags: 0,
            additional_header_size_bytes,
            size_is_explicit: true,
        })
    }

    /// Build an empty handle ready to `load` a chunk whose logical
    /// additional-header size the caller already knows, mirroring the
    /// source library's load-time constructor (`test_chunk.cpp` builds
    /// both the saving and loading `ChunkWrapper` with the same
    /// `additionalHeaderSizeBytes`).
    pub fn for_load(starting_index: FileIndex, additional_header_size_bytes: usize) -> Result<Self> {
        Self::new(starting_index, additional_header_size_bytes)
    }

    /// Build an empty handle for [`crate::chunk::read_chunk_at`]'s
    /// unknown-type fallback, where no logical additional-header size is
    /// known ahead of time. After `load`, `additional_header_size_bytes`
    /// reports the chunk's full physical capacity beyond the common
    /// header, since there is no narrower boundary to report.
    pub(crate) fn for_load_unknown(starting_index: FileIndex) -> Self {
        Self {
            starting_index,
            buffer: vec![0u8; COMMON_HEADER_SIZE_BYTES],
            size_class: 0,
            chunk_type: ChunkType::Unknown(0),
            number_valid_bytes: 0,
            flags: 0,
            additional_header_size_bytes: 0,
            size_is_explicit: false,
        }
    }

    /// This chunk's starting index.
    pub fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    /// Replace the starting index.
    pub fn set_starting_index(&mut self, index: FileIndex) {
        self.starting_index = index;
    }

    /// This chunk's type tag.
    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    /// Replace the type tag. CRC becomes stale until the next `save`.
    pub fn set_type(&mut self, chunk_type: ChunkType) {
        self.chunk_type = chunk_type;
    }

    /// The requested additional-header region, not the full padded
    /// buffer beyond the common header.
    pub fn additional_header(&self) -> &[u8] {
        let end = COMMON_HEADER_SIZE_BYTES + self.additional_header_size_bytes;
        &self.buffer[COMMON_HEADER_SIZE_BYTES..end]
    }

    /// A mutable view of the requested additional-header region.
    pub fn additional_header_mut(&mut self) -> &mut [u8] {
        let end = COMMON_HEADER_SIZE_BYTES + self.additional_header_size_bytes;
        &mut self.buffer[COMMON_HEADER_SIZE_BYTES..end]
    }

    /// The requested size of the additional-header region in bytes, as
    /// given to [`RawChunk::new`]/[`RawChunk::for_load`] — distinct from
    /// the physical chunk size, which is rounded up to a size class.
    pub fn additional_header_size_bytes(&self) -> usize {
        self.additional_header_size_bytes
    }

    /// The recorded valid-byte count.
    pub fn number_valid_bytes(&self) -> u32 {
        self.number_valid_bytes
    }

    /// Change the recorded valid-byte count, reallocating to the
    /// smallest fitting size class when `can_change_chunk_size` is true.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] when `can_change_chunk_size`
    /// is false and `n` does not fit the current size class.
    pub fn set_number_valid_bytes(&mut self, n: u32, can_change_chunk_size: bool) -> Result<u32> {
        let required = COMMON_HEADER_SIZE_BYTES + n as usize;
        if can_change_chunk_size {
            let new_class = fitting_size_class(required)?;
            if new_class != self.size_class {
                let new_size = chunk_size_for_class(new_class);
                let mut new_buffer = vec![0u8; new_size];
                let copy_len = self.buffer.len().min(new_size);
                new_buffer[..copy_len].copy_from_slice(&self.buffer[..copy_len]);
                self.buffer = new_buffer;
                self.size_class = new_class;
            }
        } else if required > self.buffer.len() {
            return Err(Status::failure(
                StatusClass::FormatError,
                50,
                format!(
                    "{n} valid bytes does not fit the chunk's current {}-byte size class",
                    self.buffer.len()
                ),
            ));
        }
        self.number_valid_bytes = n;
        Ok(self.number_valid_bytes)
    }

    /// This chunk's current physical size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    /// This chunk's size class.
    pub fn size_class(&self) -> u8 {
        self.size_class
    }

    /// Compute the CRC, write the full chunk through `store`.
    pub fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        io::finalize_and_write(
            store,
            self.starting_index,
            &mut self.buffer,
            self.chunk_type,
            self.size_class,
            self.number_valid_bytes,
            self.flags,
        )
    }

    /// Read the chunk from `store`. When `include_common_header` is
    /// false the caller has already placed the common header bytes into
    /// this chunk's buffer (e.g. via [`crate::chunk::read_chunk_at`]).
    pub fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()> {
        if include_common_header {
            let header = io::read_header_and_resize(store, self.starting_index, &mut self.buffer)?;
            self.size_class = header.size_class;
        }
        io::read_remainder(store, self.starting_index, &mut self.buffer)?;
        let header = io::parse_and_check_crc(&self.buffer, self.starting_index)?;
        self.chunk_type = header.chunk_type;
        self.size_class = header.size_class;
        self.number_valid_bytes = header.number_valid_bytes;
        self.flags = header.flags;
        if !self.size_is_explicit {
            self.additional_header_size_bytes = self.buffer.len() - COMMON_HEADER_SIZE_BYTES;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn chunk_round_trip_with_arbitrary_additional_header() {
        let mut store = MemoryStore::new();
        let mut chunk = RawChunk::new(FileIndex(0), 124).unwrap();
        chunk.set_type(ChunkType::StreamStart);
        chunk.set_number_valid_bytes(124, false).unwrap();
        let bytes: Vec<u8> = (0u8..124).collect();
        for i in 0..chunk.additional_header_size_bytes() {
            chunk.additional_header_mut()[i] = bytes[i];
        }
        chunk.save(&mut store).unwrap();

        let mut reloaded = RawChunk::for_load(FileIndex(0), 124).unwrap();
        reloaded.load(&mut store, true).unwrap();

        assert_eq!(reloaded.chunk_type(), ChunkType::StreamStart);
        assert_eq!(reloaded.number_valid_bytes(), 124);
        assert_eq!(reloaded.additional_header_size_bytes(), 124);
        for i in 0..chunk.additional_header_size_bytes() {
            assert_eq!(reloaded.additional_header()[i], chunk.additional_header()[i]);
        }
    }

    #[test]
    fn unknown_type_byte_survives_common_header_construction() {
        let mut store = MemoryStore::new();
        let mut chunk = RawChunk::new(FileIndex(0), 0).unwrap();
        chunk.set_type(ChunkType::Unknown(0xEE));
        chunk.save(&mut store).unwrap();

        let mut reloaded = RawChunk::for_load_unknown(FileIndex(0));
        reloaded.load(&mut store, true).unwrap();
        assert_eq!(reloaded.chunk_type(), ChunkType::Unknown(0xEE));
        assert_eq!(reloaded.additional_header_size_bytes(), 0);
    }
}
