//! The container shell: the thin integration point that opens a backing
//! store, owns the free-space map and stream registry, and adapts
//! virtual-file calls onto the chunk layer.
//!
//! Out of scope per this crate's purpose: directory listings, partial
//! (seek-based) reads, and any compression/encryption hook — those live
//! above this layer. This shell exists only so the chunk and free-space
//! components are exercised end-to-end.

use std::collections::HashMap;

use crate::area::FileIndex;
use crate::chunk::{
    chunk_size_for_class, fitting_size_class, read_chunk_at, Chunk, ChunkType, FileHeaderChunk,
    StreamDataChunk, StreamStartChunk,
};
use crate::free_space::{FreeSpaceData, FreeSpaceMap};
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// The major version this crate writes and requires on open.
pub const CONTAINER_MAJOR_VERSION: u16 = 1;
/// The minor version this crate writes.
pub const CONTAINER_MINOR_VERSION: u16 = 0;

/// Tunable limits threaded through [`Container::open`]. A plain value
/// struct — there is no file or environment-variable source for a
/// library with no CLI surface, but the constants still deserve a name
/// and a single place to override them (e.g. a smaller fill-chunk cap
/// for a memory-constrained embedding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLimits {
    /// Longest identifier string this container will accept, in bytes.
    pub max_identifier_bytes: usize,
    /// Longest virtual filename this container will accept, in bytes.
    pub max_virtual_filename_bytes: usize,
    /// Largest single fill chunk the free-space manager will emit.
    pub fill_chunk_cap_bytes: usize,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_identifier_bytes: u16::MAX as usize,
            max_virtual_filename_bytes: u16::MAX as usize,
            fill_chunk_cap_bytes: crate::chunk::MAXIMUM_FILL_SPACE_BYTES,
        }
    }
}

#[derive(Debug)]
struct StreamEntry {
    start_index: FileIndex,
    data_chunk_indices: Vec<FileIndex>,
    ended: bool,
}

/// An open container: a backing store plus the free-space map and
/// stream registry built from (or written to) it.
#[derive(Debug)]
pub struct Container<S: BackingStore> {
    store: S,
    free_space: FreeSpaceMap,
    streams: HashMap<u32, StreamEntry>,
    next_stream_id: u32,
    major_version: u16,
    minor_version: u16,
    identifier: String,
    limits: ContainerLimits,
}

impl<S: BackingStore> Container<S> {
    /// Open `store` as a container.
    ///
    /// An empty store is initialized with a fresh [`FileHeaderChunk`]
    /// carrying `identifier`. A non-empty store is expected to already
    /// carry one at index 0; `identifier` is ignored in that case and
    /// the stored value is used instead, and the free-space map is
    /// rebuilt by walking every chunk from there to the end of the
    /// store, classifying each as reserved or, for a run of
    /// [`ChunkType::Fill`] chunks, available. The stream registry itself
    /// (which stream identifiers are open, their chunk order) is not
    /// recovered this way — that directory is out of scope for this
    /// shell (see module docs); a reopened container can still
    /// `begin_stream`/`write_stream`/`end_stream` new streams, which
    /// allocate out of the reconstructed free-space map same as a
    /// freshly created container.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::VersionError`] if an existing
    /// container's major version does not match
    /// [`CONTAINER_MAJOR_VERSION`].
    pub fn open(store: S, identifier: &str) -> Result<Self> {
        Self::open_with_limits(store, identifier, ContainerLimits::default())
    }

    /// Like [`Container::open`], with explicit [`ContainerLimits`].
    pub fn open_with_limits(
        mut store: S,
        identifier: &str,
        limits: ContainerLimits,
    ) -> Result<Self> {
        if identifier.len() > limits.max_identifier_bytes {
            return Err(Status::failure(
                StatusClass::FormatError,
                70,
                format!(
                    "identifier of {} bytes exceeds the configured limit of {} bytes",
                    identifier.len(),
                    limits.max_identifier_bytes
                ),
            ));
        }

        let (major_version, minor_version, resolved_identifier, free_space) = if store.size().get()
            == 0
        {
            tracing::debug!(identifier, "initializing new container");
            let mut header = FileHeaderChunk::new(
                FileIndex(0),
                CONTAINER_MAJOR_VERSION,
                CONTAINER_MINOR_VERSION,
                identifier,
            )?;
            header.save(&mut store)?;
            (
                CONTAINER_MAJOR_VERSION,
                CONTAINER_MINOR_VERSION,
                identifier.to_string(),
                FreeSpaceMap::new(),
            )
        } else {
            let mut header = FileHeaderChunk::for_load(FileIndex(0), 0);
            header.load(&mut store, true)?;
            if header.major_version() != CONTAINER_MAJOR_VERSION {
                return Err(Status::failure(
                    StatusClass::VersionError,
                    71,
                    format!(
                        "container major version {} does not match this crate's version {}",
                        header.major_version(),
                        CONTAINER_MAJOR_VERSION
                    ),
                ));
            }
            tracing::debug!(major = header.major_version(), minor = header.minor_version(), "opened existing container");
            let free_space = rebuild_free_space(&mut store, FileIndex(header.chunk_size() as u64))?;
            (
                header.major_version(),
                header.minor_version(),
                header.identifier()?,
                free_space,
            )
        };

        Ok(Self {
            store,
            free_space,
            streams: HashMap::new(),
            next_stream_id: 1,
            major_version,
            minor_version,
            identifier: resolved_identifier,
            limits,
        })
    }

    /// The container's identifier, as given at creation time.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The format major version this container was written with.
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// The format minor version this container was written with.
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    /// A borrow of the underlying backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn allocate(&mut self, required_bytes: usize) -> Result<FileIndex> {
        let class = fitting_size_class(required_bytes)?;
        let size = chunk_size_for_class(class) as u64;
        match self.free_space.reserve(size) {
            Ok(handle) => Ok(handle.starting_index()),
            Err(_) => {
                let start = self.store.size();
                let new_size = FileIndex(start.get() + size);
                self.store.truncate(new_size)?;
                self.free_space
                    .insert_raw(start, FreeSpaceData::new(new_size, true, false));
                Ok(start)
            }
        }
    }

    /// Begin a new virtual file named `name`, returning the stream
    /// identifier later calls address it by.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::FormatError`] if `name` is too long.
    pub fn begin_stream(&mut self, name: &str) -> Result<u32> {
        if name.len() > self.limits.max_virtual_filename_bytes {
            return Err(Status::failure(
                StatusClass::FormatError,
                72,
                format!(
                    "virtual filename of {} bytes exceeds the configured limit of {} bytes",
                    name.len(),
                    self.limits.max_virtual_filename_bytes
                ),
            ));
        }
        let stream_identifier = self.next_stream_id;
        self.next_stream_id += 1;

        let mut chunk = StreamStartChunk::new(FileIndex(0), stream_identifier, name)?;
        let index = self.allocate(chunk.chunk_size())?;
        chunk.set_starting_index(index);
        chunk.save(&mut self.store)?;

        tracing::debug!(stream_identifier, name, "began stream");
        self.streams.insert(
            stream_identifier,
            StreamEntry {
                start_index: index,
                data_chunk_indices: Vec::new(),
                ended: false,
            },
        );
        Ok(stream_identifier)
    }

    /// Append `bytes` as one more chunk of the named stream's data.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::StateError`] if `stream_identifier` is
    /// unknown or the stream has already been ended.
    pub fn write_stream(&mut self, stream_identifier: u32, bytes: &[u8]) -> Result<()> {
        let sequence_number = {
            let entry = self.stream_entry(stream_identifier)?;
            if entry.ended {
                return Err(Status::failure(
                    StatusClass::StateError,
                    73,
                    format!("stream {stream_identifier} has already been ended"),
                ));
            }
            entry.data_chunk_indices.len() as u32
        };

        let mut chunk =
            StreamDataChunk::new(FileIndex(0), stream_identifier, sequence_number, bytes.len())?;
        chunk.set_payload(bytes)?;
        let index = self.allocate(chunk.chunk_size())?;
        chunk.set_starting_index(index);
        chunk.save(&mut self.store)?;

        let entry = self.streams.get_mut(&stream_identifier).expect("checked above");
        entry.data_chunk_indices.push(index);
        Ok(())
    }

    /// Mark the named stream complete, flagging its final chunk `isLast`.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::StateError`] if `stream_identifier` is
    /// unknown or already ended.
    pub fn end_stream(&mut self, stream_identifier: u32) -> Result<()> {
        let (last_data_index, start_index) = {
            let entry = self.stream_entry(stream_identifier)?;
            if entry.ended {
                return Err(Status::failure(
                    StatusClass::StateError,
                    74,
                    format!("stream {stream_identifier} has already been ended"),
                ));
            }
            (entry.data_chunk_indices.last().copied(), entry.start_index)
        };

        if let Some(index) = last_data_index {
            let mut chunk = StreamDataChunk::for_load(index, 0);
            chunk.load(&mut self.store, true)?;
            chunk.set_last(true);
            chunk.save(&mut self.store)?;
        } else {
            let mut chunk = StreamStartChunk::for_load(start_index, 0);
            chunk.load(&mut self.store, true)?;
            chunk.set_last(true);
            chunk.save(&mut self.store)?;
        }

        self.streams.get_mut(&stream_identifier).expect("checked above").ended = true;
        tracing::debug!(stream_identifier, "ended stream");
        Ok(())
    }

    /// Read back the named stream's complete byte contents, in the
    /// order they were written.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::StateError`] if `stream_identifier` is
    /// unknown.
    pub fn read_stream(&mut self, stream_identifier: u32) -> Result<Vec<u8>> {
        let indices = self.stream_entry(stream_identifier)?.data_chunk_indices.clone();
        let mut out = Vec::new();
        for index in indices {
            let mut chunk = StreamDataChunk::for_load(index, 0);
            chunk.load(&mut self.store, true)?;
            out.extend_from_slice(chunk.payload());
        }
        Ok(out)
    }

    fn stream_entry(&self, stream_identifier: u32) -> Result<&StreamEntry> {
        self.streams.get(&stream_identifier).ok_or_else(|| {
            Status::failure(
                StatusClass::StateError,
                75,
                format!("stream identifier {stream_identifier} is not open"),
            )
        })
    }
}

/// Walk every chunk from `start` (just past the file header) to the end
/// of `store`, classifying each run as reserved or, for contiguous
/// [`ChunkType::Fill`] chunks, available, and return the reconstructed
/// map.
fn rebuild_free_space<S: BackingStore>(store: &mut S, start: FileIndex) -> Result<FreeSpaceMap> {
    let mut map = FreeSpaceMap::new();
    let total = store.size();
    let mut cursor = start;
    let mut free_run_start: Option<FileIndex> = None;

    while cursor.get() < total.get() {
        let chunk = read_chunk_at(store, cursor)?;
        let end = FileIndex(cursor.get() + chunk.chunk_size() as u64);

        if chunk.chunk_type() == ChunkType::Fill {
            free_run_start.get_or_insert(cursor);
        } else {
            if let Some(run_start) = free_run_start.take() {
                map.insert_raw(run_start, FreeSpaceData::new(cursor, false, false));
            }
            map.insert_raw(cursor, FreeSpaceData::new(end, true, false));
        }
        cursor = end;
    }
    if let Some(run_start) = free_run_start {
        map.insert_raw(run_start, FreeSpaceData::new(total, false, false));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn open_on_empty_store_writes_file_header() {
        let container = Container::open(MemoryStore::new(), "Inesonic, LLC./nAleph").unwrap();
        assert_eq!(container.identifier(), "Inesonic, LLC./nAleph");
        assert_eq!(container.major_version(), CONTAINER_MAJOR_VERSION);
        assert_eq!(container.minor_version(), CONTAINER_MINOR_VERSION);
    }

    #[test]
    fn reopen_recovers_identifier_and_version() {
        let store = MemoryStore::new();
        let container = Container::open(store, "round-trip-id").unwrap();
        let store = container.store;

        let reopened = Container::open(store, "ignored").unwrap();
        assert_eq!(reopened.identifier(), "round-trip-id");
    }

    #[test]
    fn reopen_reconstructs_free_space_from_chunk_walk() {
        let mut store = MemoryStore::new();
        let mut header = FileHeaderChunk::new(
            FileIndex(0),
            CONTAINER_MAJOR_VERSION,
            CONTAINER_MINOR_VERSION,
            "id",
        )
        .unwrap();
        header.save(&mut store).unwrap();
        let after_header = header.chunk_size() as u64;

        let mut start = StreamStartChunk::new(FileIndex(after_header), 1, "f.dat").unwrap();
        start.set_last(true);
        start.save(&mut store).unwrap();
        let after_start = after_header + start.chunk_size() as u64;

        let mut fill = crate::chunk::FillChunk::new(FileIndex(after_start), 64);
        fill.save(&mut store).unwrap();
        let fill_size = fill.chunk_size() as u64;

        let container = Container::open(store, "ignored").unwrap();

        let reserved = container
            .free_space
            .handle_at(FileIndex(after_header))
            .unwrap();
        assert!(container.free_space.is_reserved(&reserved).unwrap());
        assert_eq!(reserved.area_size(), start.chunk_size() as u64);

        let available = container
            .free_space
            .handle_at(FileIndex(after_start))
            .unwrap();
        assert!(!container.free_space.is_reserved(&available).unwrap());
        assert_eq!(available.area_size(), fill_size);
    }

    #[test]
    fn write_then_read_single_chunk_stream() {
        let mut container = Container::open(MemoryStore::new(), "id").unwrap();
        let stream = container.begin_stream("test_file.dat").unwrap();
        container.write_stream(stream, b"hello world").unwrap();
        container.end_stream(stream).unwrap();

        let data = container.read_stream(stream).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn write_then_read_multi_chunk_stream_preserves_order() {
        let mut container = Container::open(MemoryStore::new(), "id").unwrap();
        let stream = container.begin_stream("multi.dat").unwrap();
        container.write_stream(stream, b"first-").unwrap();
        container.write_stream(stream, b"second-").unwrap();
        container.write_stream(stream, b"third").unwrap();
        container.end_stream(stream).unwrap();

        let data = container.read_stream(stream).unwrap();
        assert_eq!(data, b"first-second-third");
    }

    #[test]
    fn write_after_end_fails() {
        let mut container = Container::open(MemoryStore::new(), "id").unwrap();
        let stream = container.begin_stream("s.dat").unwrap();
        container.end_stream(stream).unwrap();

        let status = container.write_stream(stream, b"too late").unwrap_err();
        assert_eq!(status.status_class(), StatusClass::StateError);
    }

    #[test]
    fn unknown_stream_identifier_fails() {
        let mut container = Container::open(MemoryStore::new(), "id").unwrap();
        let status = container.read_stream(999).unwrap_err();
        assert_eq!(status.status_class(), StatusClass::StateError);
    }
}
