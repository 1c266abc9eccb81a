//! Marks the beginning of a virtual file within the container.

use crate::area::FileIndex;
use crate::chunk::header::{
    chunk_size_for_class, fitting_size_class, ChunkType, FLAG_IS_LAST, COMMON_HEADER_SIZE_BYTES,
};
use crate::chunk::io;
use crate::chunk::Chunk;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

const STREAM_ID_OFFSET: usize = COMMON_HEADER_SIZE_BYTES;
const FILENAME_LEN_OFFSET: usize = STREAM_ID_OFFSET + 4;
const FILENAME_OFFSET: usize = FILENAME_LEN_OFFSET + 2;

/// Marks the start of a virtual file / stream. `isLast` is true iff this
/// chunk is also the stream's only (and therefore last) chunk.
#[derive(Debug)]
pub struct StreamStartChunk {
    starting_index: FileIndex,
    buffer: Vec<u8>,
    size_class: u8,
    is_last: bool,
}

impl StreamStartChunk {
    /// Build a new stream-start chunk.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if `virtual_filename` is
    /// too long to length-prefix with a `u16`.
    pub fn new(
        starting_index: FileIndex,
        stream_identifier: u32,
        virtual_filename: &str,
    ) -> Result<Self> {
        let filename_bytes = virtual_filename.as_bytes();
        if filename_bytes.len() > u16::MAX as usize {
            return Err(Status::failure(
                StatusClass::FormatError,
                30,
                format!("virtual filename of {} bytes exceeds the 65535-byte limit", filename_bytes.len()),
            ));
        }
        let additional_header_size = 4 + 2 + filename_bytes.len();
        let size_class = fitting_size_class(COMMON_HEADER_SIZE_BYTES + additional_header_size)?;
        let chunk_size = chunk_size_for_class(size_class);
        let mut buffer = vec![0u8; chunk_size];
        buffer[STREAM_ID_OFFSET..STREAM_ID_OFFSET + 4]
            .copy_from_slice(&stream_identifier.to_le_bytes());
        buffer[FILENAME_LEN_OFFSET..FILENAME_LEN_OFFSET + 2]
            .copy_from_slice(&(filename_bytes.len() as u16).to_le_bytes());
        buffer[FILENAME_OFFSET..FILENAME_OFFSET + filename_bytes.len()]
            .copy_from_slice(filename_bytes);
        Ok(Self {
            starting_index,
            buffer,
            size_class,
            is_last: false,
        })
    }

    pub(crate) fn for_load(starting_index: FileIndex, size_class: u8) -> Self {
        let chunk_size = chunk_size_for_class(size_class);
        Self {
            starting_index,
            buffer: vec![0u8; chunk_size],
            size_class,
            is_last: false,
        }
    }

    /// The stream identifier assigned by the container shell.
    pub fn stream_identifier(&self) -> u32 {
        u32::from_le_bytes([
            self.buffer[STREAM_ID_OFFSET],
            self.buffer[STREAM_ID_OFFSET + 1],
            self.buffer[STREAM_ID_OFFSET + 2],
            self.buffer[STREAM_ID_OFFSET + 3],
        ])
    }

    /// Replace the stream identifier. Takes effect in memory immediately;
    /// `save()` persists it.
    pub fn set_stream_identifier(&mut self, stream_identifier: u32) {
        self.buffer[STREAM_ID_OFFSET..STREAM_ID_OFFSET + 4]
            .copy_from_slice(&stream_identifier.to_le_bytes());
    }

    /// The virtual file's name.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if the stored bytes are
    /// not valid UTF-8.
    pub fn virtual_filename(&self) -> Result<String> {
        let len = u16::from_le_bytes([
            self.buffer[FILENAME_LEN_OFFSET],
            self.buffer[FILENAME_LEN_OFFSET + 1],
        ]) as usize;
        let bytes = &self.buffer[FILENAME_OFFSET..FILENAME_OFFSET + len];
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Status::failure(
                StatusClass::FormatError,
                31,
                "virtual filename is not valid utf-8",
            )
        })
    }

    /// Replace the virtual filename.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if the new name is longer
    /// than the bytes reserved for it by the chunk's current size class.
    pub fn set_virtual_filename(&mut self, virtual_filename: &str) -> Result<()> {
        let filename_bytes = virtual_filename.as_bytes();
        let old_len = u16::from_le_bytes([
            self.buffer[FILENAME_LEN_OFFSET],
            self.buffer[FILENAME_LEN_OFFSET + 1],
        ]) as usize;
        if filename_bytes.len() > old_len && FILENAME_OFFSET + filename_bytes.len() > self.buffer.len() {
            return Err(Status::failure(
                StatusClass::FormatError,
                32,
                "new virtual filename does not fit the chunk's current size class",
            ));
        }
        self.buffer[FILENAME_LEN_OFFSET..FILENAME_LEN_OFFSET + 2]
            .copy_from_slice(&(filename_bytes.len() as u16).to_le_bytes());
        self.buffer[FILENAME_OFFSET..FILENAME_OFFSET + filename_bytes.len()]
            .copy_from_slice(filename_bytes);
        for byte in &mut self.buffer[FILENAME_OFFSET + filename_bytes.len()..FILENAME_OFFSET + old_len.max(filename_bytes.len())] {
            *byte = 0;
        }
        Ok(())
    }

    /// True iff this chunk is also the last chunk of its stream.
    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Set or clear the last-chunk flag.
    pub fn set_last(&mut self, is_last: bool) {
        self.is_last = is_last;
    }

    fn flags(&self) -> u8 {
        if self.is_last {
            FLAG_IS_LAST
        } else {
            0
        }
    }
}

impl Chunk for StreamStartChunk {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::StreamStart
    }

    fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    fn set_starting_index(&mut self, index: FileIndex) {
        self.starting_index = index;
    }

    fn number_valid_bytes(&self) -> u32 {
        let filename_len = u16::from_le_bytes([
            self.buffer[FILENAME_LEN_OFFSET],
            self.buffer[FILENAME_LEN_OFFSET + 1],
        ]) as usize;
        (4 + 2 + filename_len) as u32
    }

    fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    fn size_class(&self) -> u8 {
        self.size_class
    }

    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        let valid_bytes = self.number_valid_bytes();
        let flags = self.flags();
        io::finalize_and_write(
            store,
            self.starting_index,
            &mut self.buffer,
            ChunkType::StreamStart,
            self.size_class,
            valid_bytes,
            flags,
        )
    }

    fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()> {
        if include_common_header {
            let header = io::read_header_and_resize(store, self.starting_index, &mut self.buffer)?;
            self.size_class = header.size_class;
        }
        io::read_remainder(store, self.starting_index, &mut self.buffer)?;
        let header = io::parse_checked(&self.buffer, self.starting_index, ChunkType::StreamStart)?;
        self.size_class = header.size_class;
        self.is_last = header.flags & FLAG_IS_LAST != 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn save_then_load_round_trips() {
        let mut store = MemoryStore::new();
        let mut chunk = StreamStartChunk::new(FileIndex(0), 1, "test_file.dat").unwrap();
        assert!(!chunk.is_last());
        chunk.save(&mut store).unwrap();

        let mut reloaded = StreamStartChunk::new(FileIndex(0), 2, "bad.dat").unwrap();
        reloaded.load(&mut store, true).unwrap();

        assert_eq!(reloaded.stream_identifier(), 1);
        assert!(!reloaded.is_last());
        assert_eq!(reloaded.virtual_filename().unwrap(), "test_file.dat");
    }

    #[test]
    fn is_last_flag_round_trips() {
        let mut store = MemoryStore::new();
        let mut chunk = StreamStartChunk::new(FileIndex(0), 7, "solo.dat").unwrap();
        chunk.set_last(true);
        chunk.save(&mut store).unwrap();

        let mut reloaded = StreamStartChunk::for_load(FileIndex(0), 0);
        reloaded.load(&mut store, true).unwrap();
        assert!(reloaded.is_last());
    }
}
