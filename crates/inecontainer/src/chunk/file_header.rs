//! The container's first chunk: version and identifier.

use crate::area::FileIndex;
use crate::chunk::header::{
    chunk_size_for_class, fitting_size_class, ChunkType, COMMON_HEADER_SIZE_BYTES,
};
use crate::chunk::io;
use crate::chunk::Chunk;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

const MAJOR_OFFSET: usize = COMMON_HEADER_SIZE_BYTES;
const MINOR_OFFSET: usize = MAJOR_OFFSET + 2;
const IDENTIFIER_LEN_OFFSET: usize = MINOR_OFFSET + 2;
const IDENTIFIER_OFFSET: usize = IDENTIFIER_LEN_OFFSET + 2;

/// First chunk (index 0) of every container: carries the format's major
/// and minor version plus a caller-chosen identifier string.
#[derive(Debug)]
pub struct FileHeaderChunk {
    starting_index: FileIndex,
    buffer: Vec<u8>,
    size_class: u8,
}

impl FileHeaderChunk {
    /// Build a new file header chunk at `starting_index` (conventionally
    /// zero) for the given version and identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if `identifier` is too
    /// long to length-prefix with a `u16`.
    pub fn new(
        starting_index: FileIndex,
        major_version: u16,
        minor_version: u16,
        identifier: &str,
    ) -> Result<Self> {
        let identifier_bytes = identifier.as_bytes();
        if identifier_bytes.len() > u16::MAX as usize {
            return Err(Status::failure(
                StatusClass::FormatError,
                20,
                format!("identifier of {} bytes exceeds the 65535-byte limit", identifier_bytes.len()),
            ));
        }
        let additional_header_size = 4 + 2 + identifier_bytes.len();
        let size_class = fitting_size_class(COMMON_HEADER_SIZE_BYTES + additional_header_size)?;
        let chunk_size = chunk_size_for_class(size_class);
        let mut buffer = vec![0u8; chunk_size];
        buffer[MAJOR_OFFSET..MAJOR_OFFSET + 2].copy_from_slice(&major_version.to_le_bytes());
        buffer[MINOR_OFFSET..MINOR_OFFSET + 2].copy_from_slice(&minor_version.to_le_bytes());
        buffer[IDENTIFIER_LEN_OFFSET..IDENTIFIER_LEN_OFFSET + 2]
            .copy_from_slice(&(identifier_bytes.len() as u16).to_le_bytes());
        buffer[IDENTIFIER_OFFSET..IDENTIFIER_OFFSET + identifier_bytes.len()]
            .copy_from_slice(identifier_bytes);
        Ok(Self {
            starting_index,
            buffer,
            size_class,
        })
    }

    pub(crate) fn for_load(starting_index: FileIndex, size_class: u8) -> Self {
        let chunk_size = chunk_size_for_class(size_class);
        Self {
            starting_index,
            buffer: vec![0u8; chunk_size],
            size_class,
        }
    }

    /// The container format's major version.
    pub fn major_version(&self) -> u16 {
        u16::from_le_bytes([self.buffer[MAJOR_OFFSET], self.buffer[MAJOR_OFFSET + 1]])
    }

    /// The container format's minor version.
    pub fn minor_version(&self) -> u16 {
        u16::from_le_bytes([self.buffer[MINOR_OFFSET], self.buffer[MINOR_OFFSET + 1]])
    }

    /// The caller-chosen container identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if the stored bytes are
    /// not valid UTF-8.
    pub fn identifier(&self) -> Result<String> {
        let len = u16::from_le_bytes([
            self.buffer[IDENTIFIER_LEN_OFFSET],
            self.buffer[IDENTIFIER_LEN_OFFSET + 1],
        ]) as usize;
        let bytes = &self.buffer[IDENTIFIER_OFFSET..IDENTIFIER_OFFSET + len];
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Status::failure(
                StatusClass::FormatError,
                21,
                "container identifier is not valid utf-8",
            )
        })
    }
}

impl Chunk for FileHeaderChunk {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::FileHeader
    }

    fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    fn set_starting_index(&mut self, index: FileIndex) {
        self.starting_index = index;
    }

    fn number_valid_bytes(&self) -> u32 {
        let identifier_len = u16::from_le_bytes([
            self.buffer[IDENTIFIER_LEN_OFFSET],
            self.buffer[IDENTIFIER_LEN_OFFSET + 1],
        ]) as usize;
        (4 + 2 + identifier_len) as u32
    }

    fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    fn size_class(&self) -> u8 {
        self.size_class
    }

    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        let valid_bytes = self.number_valid_bytes();
        io::finalize_and_write(
            store,
            self.starting_index,
            &mut self.buffer,
            ChunkType::FileHeader,
            self.size_class,
            valid_bytes,
            0,
        )
    }

    fn load(&mut self, store: &mut dyn BackingStore, include_common_header: bool) -> Result<()> {
        if include_common_header {
            let header = io::read_header_and_resize(store, self.starting_index, &mut self.buffer)?;
            self.size_class = header.size_class;
        }
        io::read_remainder(store, self.starting_index, &mut self.buffer)?;
        let header = io::parse_checked(&self.buffer, self.starting_index, ChunkType::FileHeader)?;
        self.size_class = header.size_class;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const IDENTIFIER: &str = "Inesonic, LLC.\nAleph";

    #[test]
    fn save_then_load_round_trips_identity() {
        let mut store = MemoryStore::new();
        let mut chunk = FileHeaderChunk::new(FileIndex(0), 1, 0, IDENTIFIER).unwrap();
        assert_eq!(chunk.major_version(), 1);
        assert_eq!(chunk.minor_version(), 0);
        assert_eq!(chunk.identifier().unwrap(), IDENTIFIER);

        chunk.save(&mut store).unwrap();

        let mut reloaded = FileHeaderChunk::for_load(FileIndex(0), 0);
        reloaded.load(&mut store, true).unwrap();
        assert_eq!(reloaded.major_version(), 1);
        assert_eq!(reloaded.minor_version(), 0);
        assert_eq!(reloaded.identifier().unwrap(), IDENTIFIER);
    }

    #[test]
    fn type_mismatch_on_load_fails() {
        let mut store = MemoryStore::new();
        let mut fill = crate::chunk::FillChunk::new(FileIndex(0), 32);
        fill.save(&mut store).unwrap();

        let mut header = FileHeaderChunk::for_load(FileIndex(0), 0);
        let status = header.load(&mut store, true).unwrap_err();
        assert_eq!(status.status_class(), StatusClass::FormatError);
    }
}
