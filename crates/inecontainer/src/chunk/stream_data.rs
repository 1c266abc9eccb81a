//! Payload-carrying chunk belonging to a virtual file's byte stream.

use crate::area::FileIndex;
use crate::chunk::header::{
    chunk_size_for_class, fitting_size_class, ChunkType, FLAG_IS_LAST, COMMON_HEADER_SIZE_BYTES,
};
use crate::chunk::io;
use crate::chunk::Chunk;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

const STREAM_ID_OFFSET: usize = COMMON_HEADER_SIZE_BYTES;
const SEQUENCE_OFFSET: usize = STREAM_ID_OFFSET + 4;
const CONTINUATION_OFFSET: usize = SEQUENCE_OFFSET + 4;
const ADDITIONAL_HEADER_SIZE_BYTES: usize = 4 + 4 + 1;
const PAYLOAD_OFFSET: usize = COMMON_HEADER_SIZE_BYTES + ADDITIONAL_HEADER_SIZE_BYTES;

/// One chunk's worth of a virtual file's bytes.
#[derive(Debug)]
pub struct StreamDataChunk {
    starting_index: FileIndex,
    buffer: Vec<u8>,
    size_class: u8,
    number_valid_bytes: u32,
    is_last: bool,
}

impl StreamDataChunk {
    /// Build a new, empty stream-data chunk with room for `payload_capacity`
    /// bytes, sized to the smallest fitting size class.
    pub fn new(
        starting_index: FileIndex,
        stream_identifier: u32,
        sequence_number: u32,
        payload_capacity: usize,
    ) -> Result<Self> {
        let size_class =
            fitting_size_class(PAYLOAD_OFFSET + payload_capacity)?;
        let chunk_size = chunk_size_for_class(size_class);
        let mut buffer = vec![0u8; chunk_size];
        buffer[STREAM_ID_OFFSET..STREAM_ID_OFFSET + 4]
            .copy_from_slice(&stream_identifier.to_le_bytes());
        buffer[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]
            .copy_from_slice(&sequence_number.to_le_bytes());
        buffer[CONTINUATION_OFFSET] = 0;
        Ok(Self {
            starting_index,
            buffer,
            size_class,
            number_valid_bytes: 0,
            is_last: false,
        })
    }

    pub(crate) fn for_load(starting_index: FileIndex, size_class: u8) -> Self {
        let chunk_size = chunk_size_for_class(size_class);
        Self {
            starting_index,
            buffer: vec![0u8; chunk_size],
            size_class,
            number_valid_bytes: 0,
            is_last: false,
        }
    }

    /// The stream this chunk belongs to.
    pub fn stream_identifier(&self) -> u32 {
        u32::from_le_bytes([
            self.buffer[STREAM_ID_OFFSET],
            self.buffer[STREAM_ID_OFFSET + 1],
            self.buffer[STREAM_ID_OFFSET + 2],
            self.buffer[STREAM_ID_OFFSET + 3],
        ])
    }

    /// Replace the stream identifier.
    pub fn set_stream_identifier(&mut self, stream_identifier: u32) {
        self.buffer[STREAM_ID_OFFSET..STREAM_ID_OFFSET + 4]
            .copy_from_slice(&stream_identifier.to_le_bytes());
    }

    /// This chunk's position within its stream's chunk sequence.
    pub fn sequence_number(&self) -> u32 {
        u32::from_le_bytes([
            self.buffer[SEQUENCE_OFFSET],
            self.buffer[SEQUENCE_OFFSET + 1],
            self.buffer[SEQUENCE_OFFSET + 2],
            self.buffer[SEQUENCE_OFFSET + 3],
        ])
    }

    /// Replace the sequence number.
    pub fn set_sequence_number(&mut self, sequence_number: u32) {
        self.buffer[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]
            .copy_from_slice(&sequence_number.to_le_bytes());
    }

    /// True iff another `StreamDataChunk` continues this one (reserved
    /// for multi-chunk payload assembly above this layer).
    pub fn is_continuation(&self) -> bool {
        self.buffer[CONTINUATION_OFFSET] != 0
    }

    /// Set or clear the continuation bit.
    pub fn set_continuation(&mut self, is_continuation: bool) {
        self.buffer[CONTINUATION_OFFSET] = u8::from(is_continuation);
    }

    /// True iff this is the last chunk of its stream.
    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Set or clear the last-chunk flag.
    pub fn set_last(&mut self, is_last: bool) {
        self.is_last = is_last;
    }

    /// The chunk's valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[PAYLOAD_OFFSET..PAYLOAD_OFFSET + self.number_valid_bytes as usize]
    }

    /// Replace the payload, growing the chunk's size class if it does
    /// not already fit. Equivalent to writing the bytes then calling
    /// [`StreamDataChunk::set_number_valid_bytes`].
    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        self.set_number_valid_bytes(data.len() as u32, true)?;
        self.buffer[PAYLOAD_OFFSET..PAYLOAD_OFFSET + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flags(&self) -> u8 {
        if self.is_last {
            FLAG_IS_LAST
        } else {
            0
        }
    }
}

impl Chunk for StreamDataChunk {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::StreamData
    }

    fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    fn set_starting_index(&mut self, index: FileIndex) {
        self.starting_index = index;
    }

    fn number_valid_bytes(&self) -> u32 {
        self.number_valid_bytes
    }

    fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    fn size_class(&self) -> u8 {
        self.size_class
    }

    fn save(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        let valid_bytes = self.number_valid_bytes;
        let flags = self.flags();
        io::finalize_and_write(
            store,
            self.starting_index,
            &mut self.buffer,
            ChunkType::StreamData,
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
        let header = io::parse_checked(&self.buffer, self.starting_index, ChunkType::StreamData)?;
        self.size_class = header.size_class;
        self.number_valid_bytes = header.number_valid_bytes;
        self.is_last = header.flags & FLAG_IS_LAST != 0;
        Ok(())
    }
}

impl StreamDataChunk {
    /// Change the count of meaningful payload bytes.
    ///
    /// When `can_change_chunk_size` is true and `n` no longer fits the
    /// current size class (in either direction — this format allows a
    /// chunk to shrink back down, not only grow), the chunk reallocates
    /// to the smallest class that fits.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] when `can_change_chunk_size`
    /// is false and `n` does not fit the current size class.
    pub fn set_number_valid_bytes(&mut self, n: u32, can_change_chunk_size: bool) -> Result<u32> {
        let required = PAYLOAD_OFFSET + n as usize;
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
                40,
                format!(
                    "{n} valid bytes does not fit the chunk's current {}-byte size class",
                    self.buffer.len()
                ),
            ));
        }
        self.number_valid_bytes = n;
        Ok(self.number_valid_bytes)
    }
}
