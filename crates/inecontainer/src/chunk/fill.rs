//! Fill chunks: zero-payload chunks that cover free regions so the
//! backing store stays fully chunked.

use crate::area::FileIndex;
use crate::chunk::header::{chunk_size_for_class, size_class_for, ChunkType, MINIMUM_CHUNK_SIZE_BYTES};
use crate::chunk::io;
use crate::chunk::Chunk;
use crate::status::Result;
use crate::store::BackingStore;

/// Largest single fill chunk this crate will emit; a free run larger
/// than this is covered by a sequence of fill chunks.
pub const MAXIMUM_FILL_SPACE_BYTES: usize = 4096;

/// A chunk whose sole purpose is covering free space.
#[derive(Debug)]
pub struct FillChunk {
    starting_index: FileIndex,
    buffer: Vec<u8>,
    size_class: u8,
}

impl FillChunk {
    /// Build a fill chunk sized by the best-fit rule for `available`
    /// bytes of free space.
    pub fn new(starting_index: FileIndex, available: u64) -> Self {
        let fill_space_bytes = best_fit_size(available);
        let size_class = size_class_for(fill_space_bytes);
        Self {
            starting_index,
            buffer: vec![0u8; fill_space_bytes],
            size_class,
        }
    }

    pub(crate) fn for_load(starting_index: FileIndex, size_class: u8) -> Self {
        let chunk_size = chunk_size_for_class(size_class);
        Self {
            starting_index,
            buffer: vec![0u8; chunk_size],
            size_class,
        }
    }

    /// The chunk's current physical size in bytes.
    pub fn fill_space_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Recompute the fill chunk's size for a new `available` figure,
    /// using the same best-fit rule as [`FillChunk::new`].
    pub fn set_best_fit_size(&mut self, available: u64) {
        let fill_space_bytes = best_fit_size(available);
        self.buffer = vec![0u8; fill_space_bytes];
        self.size_class = size_class_for(fill_space_bytes);
    }
}

/// `clamp(roundDownToPow2(available), 32, 4096)`, with `available == 0`
/// rounding up to the minimum chunk size.
fn best_fit_size(available: u64) -> usize {
    if available == 0 {
        return MINIMUM_CHUNK_SIZE_BYTES;
    }
    let rounded_down = 1u64 << (63 - available.leading_zeros());
    rounded_down.clamp(
        MINIMUM_CHUNK_SIZE_BYTES as u64,
        MAXIMUM_FILL_SPACE_BYTES as u64,
    ) as usize
}

impl Chunk for FillChunk {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::Fill
    }

    fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    fn set_starting_index(&mut self, index: FileIndex) {
        self.starting_index = index;
    }

    fn number_valid_bytes(&self) -> u32 {
        0
    }

    fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    fn size_class(&self) -> u8 {
        self.size_class
    }

    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        io::finalize_and_write(
            store,
            self.starting_index,
            &mut self.buffer,
            ChunkType::Fill,
            self.size_class,
            0,
            0,
        )
    }

    fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()> {
        if include_common_header {
            let header = io::read_header_and_resize(store, self.starting_index, &mut self.buffer)?;
            self.size_class = header.size_class;
        }
        io::read_remainder(store, self.starting_index, &mut self.buffer)?;
        let header = io::parse_checked(&self.buffer, self.starting_index, ChunkType::Fill)?;
        self.size_class = header.size_class;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn best_fit_matches_boundary_scenario() {
        for k in 0u32..6 {
            let base = 1u64 << (k + 5);

            let below = FillChunk::new(FileIndex(0), base - 1);
            let expected_below = if k == 0 { 32 } else { 1usize << (k + 4) };
            assert_eq!(below.fill_space_bytes(), expected_below);

            let at = FillChunk::new(FileIndex(0), base);
            assert_eq!(at.fill_space_bytes(), base as usize);

            let above = FillChunk::new(FileIndex(0), base + 1);
            assert_eq!(above.fill_space_bytes(), base as usize);
        }

        assert_eq!(FillChunk::new(FileIndex(0), 8191).fill_space_bytes(), 4096);
        assert_eq!(FillChunk::new(FileIndex(0), 8192).fill_space_bytes(), 4096);
        assert_eq!(FillChunk::new(FileIndex(0), 16384).fill_space_bytes(), 4096);
    }

    #[test]
    fn zero_available_rounds_up_to_minimum() {
        assert_eq!(FillChunk::new(FileIndex(0), 0).fill_space_bytes(), 32);
    }

    #[test]
    fn set_best_fit_size_recomputes() {
        let mut chunk = FillChunk::new(FileIndex(0), 32);
        assert_eq!(chunk.fill_space_bytes(), 32);
        chunk.set_best_fit_size(2000);
        assert_eq!(chunk.fill_space_bytes(), 1024);
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = MemoryStore::new();
        let mut chunk = FillChunk::new(FileIndex(0), 200);
        chunk.save(&mut store).unwrap();

        let mut reloaded = FillChunk::for_load(FileIndex(0), 0);
        reloaded.load(&mut store, true).unwrap();
        assert_eq!(reloaded.fill_space_bytes(), chunk.fill_space_bytes());
        assert_eq!(reloaded.chunk_type(), ChunkType::Fill);
    }
}
