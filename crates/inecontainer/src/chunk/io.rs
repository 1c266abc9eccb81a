//! Byte-level plumbing shared by every chunk variant's `save`/`load`.

use crate::area::FileIndex;
use crate::chunk::header::{
    chunk_size_for_class, compute_crc, ChunkType, CommonHeader, COMMON_HEADER_SIZE_BYTES,
};
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// Read the 32-byte common header at `index`, resize `buffer` to the
/// chunk's full size per the header's size class, and copy the header
/// bytes into place. Returns the parsed header.
pub(crate) fn read_header_and_resize(
    store: &mut dyn BackingStore,
    index: FileIndex,
    buffer: &mut Vec<u8>,
) -> Result<CommonHeader> {
    let mut header_bytes = [0u8; COMMON_HEADER_SIZE_BYTES];
    store.read_bytes(index, &mut header_bytes)?;
    let header = CommonHeader::parse(&header_bytes);
    let chunk_size = chunk_size_for_class(header.size_class);
    if buffer.len() != chunk_size {
        buffer.resize(chunk_size, 0);
    }
    buffer[0..COMMON_HEADER_SIZE_BYTES].copy_from_slice(&header_bytes);
    Ok(header)
}

/// Read everything past the common header into `buffer[32..]`.
pub(crate) fn read_remainder(
    store: &mut dyn BackingStore,
    index: FileIndex,
    buffer: &mut [u8],
) -> Result<()> {
    if buffer.len() > COMMON_HEADER_SIZE_BYTES {
        store.read_bytes(index + COMMON_HEADER_SIZE_BYTES as u64, &mut buffer[COMMON_HEADER_SIZE_BYTES..])?;
    }
    Ok(())
}

/// Parse the header out of a fully-populated buffer and check its CRC.
/// Does not check the chunk type; callers that expect a specific variant
/// compare `header.chunk_type` themselves so they can report a
/// variant-specific message.
pub(crate) fn parse_and_check_crc(buffer: &[u8], index: FileIndex) -> Result<CommonHeader> {
    let mut header_bytes = [0u8; COMMON_HEADER_SIZE_BYTES];
    header_bytes.copy_from_slice(&buffer[0..COMMON_HEADER_SIZE_BYTES]);
    let header = CommonHeader::parse(&header_bytes);
    let computed = compute_crc(buffer);
    if computed != header.crc {
        return Err(Status::failure(
            StatusClass::CrcError,
            10,
            format!(
                "chunk at index {} failed crc check: stored {:#010x}, computed {:#010x}",
                index.get(),
                header.crc,
                computed
            ),
        ));
    }
    Ok(header)
}

/// Parse and CRC-check a buffer, additionally requiring the chunk type to
/// match `expected`.
pub(crate) fn parse_checked(
    buffer: &[u8],
    index: FileIndex,
    expected: ChunkType,
) -> Result<CommonHeader> {
    let header = parse_and_check_crc(buffer, index)?;
    if header.chunk_type != expected {
        return Err(Status::failure(
            StatusClass::FormatError,
            11,
            format!(
                "chunk at index {} has type {:?}, expected {:?}",
                index.get(),
                header.chunk_type,
                expected
            ),
        ));
    }
    Ok(header)
}

/// Write `common_header` into `buffer`, compute the CRC, patch it in, and
/// write the whole buffer to `store` at `index`.
pub(crate) fn finalize_and_write(
    store: &mut dyn BackingStore,
    index: FileIndex,
    buffer: &mut [u8],
    chunk_type: ChunkType,
    size_class: u8,
    number_valid_bytes: u32,
    flags: u8,
) -> Result<()> {
    let header = CommonHeader {
        chunk_type,
        size_class,
        number_valid_bytes,
        flags,
        crc: 0,
    };
    header.write_into(buffer);
    let crc = compute_crc(buffer);
    buffer[8..12].copy_from_slice(&crc.to_le_bytes());
    store.write_bytes(index, buffer)
}
