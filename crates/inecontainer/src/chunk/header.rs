//! Common header layout shared by every chunk variant.

use crate::status::{Result, Status, StatusClass};

/// Size in bytes of the common header every chunk carries.
pub const MINIMUM_CHUNK_SIZE_BYTES: usize = 32;

/// Size in bytes of the common header proper (type, size class, valid
/// bytes, flags, reserved byte, CRC, and zero padding out to 32 bytes).
pub const COMMON_HEADER_SIZE_BYTES: usize = 32;

/// Largest chunk size this format supports, `2^(11+5)`.
pub const MAXIMUM_CHUNK_SIZE_BYTES: usize = 1 << (11 + 5);

/// Smallest size class, corresponding to a 32-byte chunk.
pub const MINIMUM_SIZE_CLASS: u8 = 0;

/// Largest size class, corresponding to a 65,536-byte chunk.
pub const MAXIMUM_SIZE_CLASS: u8 = 11;

const TYPE_OFFSET: usize = 0;
const SIZE_CLASS_OFFSET: usize = 1;
const VALID_BYTES_OFFSET: usize = 2;
const FLAGS_OFFSET: usize = 6;
const CRC_OFFSET: usize = 8;

/// Bit 0 of the flags byte: true iff this chunk is the last of its stream.
pub const FLAG_IS_LAST: u8 = 0x01;

/// A chunk's type tag, occupying byte 0 of the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// The container's first chunk; carries version and identifier.
    FileHeader,
    /// Marks the start of a virtual file / stream.
    StreamStart,
    /// Carries stream payload bytes.
    StreamData,
    /// Covers a free region so the backing store stays fully chunked.
    Fill,
    /// A type byte this crate does not recognize.
    Unknown(u8),
}

impl ChunkType {
    /// The on-disk tag for this type.
    pub fn tag(self) -> u8 {
        match self {
            ChunkType::FileHeader => 0x01,
            ChunkType::StreamStart => 0x02,
            ChunkType::StreamData => 0x03,
            ChunkType::Fill => 0x7F,
            ChunkType::Unknown(tag) => tag,
        }
    }

    /// Decode a tag byte. Never fails: an unrecognized tag becomes
    /// `ChunkType::Unknown`, per the format's requirement that unknown
    /// type bytes never abort common-header parsing.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x01 => ChunkType::FileHeader,
            0x02 => ChunkType::StreamStart,
            0x03 => ChunkType::StreamData,
            0x7F => ChunkType::Fill,
            other => ChunkType::Unknown(other),
        }
    }
}

/// Round `chunk_size` down to the size class it belongs to.
pub fn size_class_for(chunk_size: usize) -> u8 {
    (chunk_size.trailing_zeros() as u8).saturating_sub(5)
}

/// The chunk size, in bytes, for a given size class.
pub fn chunk_size_for_class(size_class: u8) -> usize {
    1usize << (size_class as u32 + 5)
}

/// Round `required_bytes` up to the smallest size class whose chunk size
/// is at least that large, clamped to the minimum chunk size.
///
/// # Errors
///
/// Fails with [`StatusClass::FormatError`] if `required_bytes` exceeds
/// [`MAXIMUM_CHUNK_SIZE_BYTES`].
pub fn fitting_size_class(required_bytes: usize) -> Result<u8> {
    let required_bytes = required_bytes.max(MINIMUM_CHUNK_SIZE_BYTES);
    for class in MINIMUM_SIZE_CLASS..=MAXIMUM_SIZE_CLASS {
        if chunk_size_for_class(class) >= required_bytes {
            return Ok(class);
        }
    }
    Err(Status::failure(
        StatusClass::FormatError,
        1,
        format!("no size class fits {required_bytes} bytes"),
    ))
}

/// Parsed view of a chunk's 32-byte common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    /// The chunk's type tag.
    pub chunk_type: ChunkType,
    /// log2(chunk size) - 5.
    pub size_class: u8,
    /// Meaningful byte count in the payload region.
    pub number_valid_bytes: u32,
    /// Type-specific flag byte.
    pub flags: u8,
    /// CRC-32 recorded in the header.
    pub crc: u32,
}

impl CommonHeader {
    /// Parse the first 32 bytes of a chunk buffer.
    ///
    /// Never fails on an unrecognized type byte: the caller gets back a
    /// header whose `chunk_type` is `ChunkType::Unknown`.
    pub fn parse(bytes: &[u8; COMMON_HEADER_SIZE_BYTES]) -> Self {
        let chunk_type = ChunkType::from_tag(bytes[TYPE_OFFSET]);
        let size_class = bytes[SIZE_CLASS_OFFSET];
        let number_valid_bytes = u32::from_le_bytes([
            bytes[VALID_BYTES_OFFSET],
            bytes[VALID_BYTES_OFFSET + 1],
            bytes[VALID_BYTES_OFFSET + 2],
            bytes[VALID_BYTES_OFFSET + 3],
        ]);
        let flags = bytes[FLAGS_OFFSET];
        let crc = u32::from_le_bytes([
            bytes[CRC_OFFSET],
            bytes[CRC_OFFSET + 1],
            bytes[CRC_OFFSET + 2],
            bytes[CRC_OFFSET + 3],
        ]);
        Self {
            chunk_type,
            size_class,
            number_valid_bytes,
            flags,
            crc,
        }
    }

    /// Encode this header into the first 32 bytes of `buffer`.
    pub fn write_into(&self, buffer: &mut [u8]) {
        buffer[TYPE_OFFSET] = self.chunk_type.tag();
        buffer[SIZE_CLASS_OFFSET] = self.size_class;
        buffer[VALID_BYTES_OFFSET..VALID_BYTES_OFFSET + 4]
            .copy_from_slice(&self.number_valid_bytes.to_le_bytes());
        buffer[FLAGS_OFFSET] = self.flags;
        buffer[FLAGS_OFFSET + 1] = 0;
        buffer[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&self.crc.to_le_bytes());
        for byte in &mut buffer[CRC_OFFSET + 4..COMMON_HEADER_SIZE_BYTES] {
            *byte = 0;
        }
    }
}

/// Compute the CRC-32 over a full chunk buffer with the CRC field
/// zeroed, per the open-question resolution that zero-filled reserved
/// bytes of the common header participate in the CRC.
pub fn compute_crc(buffer: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buffer[0..CRC_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buffer[CRC_OFFSET + 4..]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_class_round_trips() {
        for class in MINIMUM_SIZE_CLASS..=MAXIMUM_SIZE_CLASS {
            let size = chunk_size_for_class(class);
            assert_eq!(size_class_for(size), class);
            assert!(size >= MINIMUM_CHUNK_SIZE_BYTES);
            assert!(size <= MAXIMUM_CHUNK_SIZE_BYTES);
        }
    }

    #[test]
    fn fitting_size_class_rounds_up() {
        assert_eq!(fitting_size_class(0).unwrap(), 0);
        assert_eq!(fitting_size_class(32).unwrap(), 0);
        assert_eq!(fitting_size_class(33).unwrap(), 1);
        assert_eq!(fitting_size_class(65536).unwrap(), 11);
    }

    #[test]
    fn fitting_size_class_rejects_oversized_request() {
        assert!(fitting_size_class(65537).is_err());
    }

    #[test]
    fn unknown_type_tag_decodes_without_error() {
        let header = ChunkType::from_tag(0xAB);
        assert_eq!(header, ChunkType::Unknown(0xAB));
        assert_eq!(header.tag(), 0xAB);
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = CommonHeader {
            chunk_type: ChunkType::StreamStart,
            size_class: 3,
            number_valid_bytes: 17,
            flags: FLAG_IS_LAST,
            crc: 0xDEADBEEF,
        };
        let mut buffer = [0u8; COMMON_HEADER_SIZE_BYTES];
        header.write_into(&mut buffer);
        let parsed = CommonHeader::parse(&buffer);
        assert_eq!(parsed, header);
    }
}
