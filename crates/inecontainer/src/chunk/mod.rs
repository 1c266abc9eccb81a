//! The chunk binary format: a common header shared by every variant,
//! per-variant additional headers, and the concrete variants themselves.

mod file_header;
mod fill;
mod header;
mod io;
mod raw;
mod stream_data;
mod stream_start;

pub use file_header::FileHeaderChunk;
pub use fill::{FillChunk, MAXIMUM_FILL_SPACE_BYTES};
pub use header::{
    chunk_size_for_class, fitting_size_class, size_class_for, ChunkType, CommonHeader,
    COMMON_HEADER_SIZE_BYTES, MAXIMUM_CHUNK_SIZE_BYTES, MAXIMUM_SIZE_CLASS,
    MINIMUM_CHUNK_SIZE_BYTES, MINIMUM_SIZE_CLASS,
};
pub use raw::RawChunk;
pub use stream_data::StreamDataChunk;
pub use stream_start::StreamStartChunk;

use crate::area::FileIndex;
use crate::status::Result;
use crate::store::BackingStore;

/// Operations common to every chunk variant.
///
/// Mirrors the source library's `Chunk` base class: a chunk owns its
/// payload buffer exclusively and reaches the backing store only through
/// the reference passed into `save`/`load`, never by holding one itself.
pub trait Chunk {
    /// This chunk's type tag.
    fn chunk_type(&self) -> ChunkType;

    /// The byte offset in the backing store this chunk is bound to.
    fn starting_index(&self) -> FileIndex;

    /// Rebind this chunk to a different offset, without touching its
    /// in-memory contents.
    fn set_starting_index(&mut self, index: FileIndex);

    /// The count of meaningful bytes in the chunk's payload region.
    fn number_valid_bytes(&self) -> u32;

    /// This chunk's current physical size in bytes; always a power of
    /// two in `[32, 65536]`.
    fn chunk_size(&self) -> usize;

    /// This chunk's size class, `log2(chunk_size) - 5`.
    fn size_class(&self) -> u8;

    /// Compute the CRC and write the whole chunk through `store` at
    /// [`Chunk::starting_index`].
    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()>;

    /// Read the chunk from `store`. When `include_common_header` is
    /// false, the caller has already placed the 32-byte common header
    /// into this chunk's buffer — used by [`read_chunk_at`], which reads
    /// the header once to dispatch to the right variant and hands it
    /// off rather than reading it twice.
    fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()>;
}

/// Read the common header at `index`, construct the matching variant,
/// and finish loading it.
///
/// Per the format's requirement that common-header parsing never fails
/// on an unrecognized type byte, an unknown tag yields a [`RawChunk`]
/// whose `chunk_type()` reports [`ChunkType::Unknown`] rather than an
/// error; only a CRC mismatch fails at this stage.
pub fn read_chunk_at(store: &mut dyn BackingStore, index: FileIndex) -> Result<Box<dyn Chunk>> {
    let mut header_bytes = [0u8; COMMON_HEADER_SIZE_BYTES];
    store.read_bytes(index, &mut header_bytes)?;
    let header = CommonHeader::parse(&header_bytes);

    let mut chunk: Box<dyn Chunk> = match header.chunk_type {
        ChunkType::FileHeader => Box::new(FileHeaderChunk::for_load(index, header.size_class)),
        ChunkType::StreamStart => Box::new(StreamStartChunk::for_load(index, header.size_class)),
        ChunkType::StreamData => Box::new(StreamDataChunk::for_load(index, header.size_class)),
        ChunkType::Fill => Box::new(FillChunk::for_load(index, header.size_class)),
        ChunkType::Unknown(_) => {
            let mut raw = RawChunk::for_load_unknown(index);
            raw.load(store, true)?;
            return Ok(Box::new(raw));
        }
    };
    chunk.load(store, false)?;
    Ok(chunk)
}

impl Chunk for RawChunk {
    fn chunk_type(&self) -> ChunkType {
        RawChunk::chunk_type(self)
    }

    fn starting_index(&self) -> FileIndex {
        RawChunk::starting_index(self)
    }

    fn set_starting_index(&mut self, index: FileIndex) {
        RawChunk::set_starting_index(self, index)
    }

    fn number_valid_bytes(&self) -> u32 {
        RawChunk::number_valid_bytes(self)
    }

    fn chunk_size(&self) -> usize {
        RawChunk::chunk_size(self)
    }

    fn size_class(&self) -> u8 {
        RawChunk::size_class(self)
    }

    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        RawChunk::save(self, store)
    }

    fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()> {
        RawChunk::load(self, store, include_common_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn read_chunk_at_dispatches_by_type() {
        let mut store = MemoryStore::new();
        let mut header = FileHeaderChunk::new(FileIndex(0), 1, 0, "id").unwrap();
        header.save(&mut store).unwrap();

        let mut fill = FillChunk::new(FileIndex(header.chunk_size() as u64), 64);
        fill.set_starting_index(FileIndex(header.chunk_size() as u64));
        fill.save(&mut store).unwrap();

        let loaded_header = read_chunk_at(&mut store, FileIndex(0)).unwrap();
        assert_eq!(loaded_header.chunk_type(), ChunkType::FileHeader);

        let loaded_fill = read_chunk_at(&mut store, FileIndex(header.chunk_size() as u64)).unwrap();
        assert_eq!(loaded_fill.chunk_type(), ChunkType::Fill);
    }

    #[test]
    fn read_chunk_at_unknown_type_does_not_fail() {
        let mut store = MemoryStore::new();
        let mut raw = RawChunk::new(FileIndex(0), 0).unwrap();
        raw.set_type(ChunkType::Unknown(0x55));
        raw.save(&mut store).unwrap();

        let loaded = read_chunk_at(&mut store, FileIndex(0)).unwrap();
        assert_eq!(loaded.chunk_type(), ChunkType::Unknown(0x55));
    }
}
