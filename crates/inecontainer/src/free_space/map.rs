//! Ordered map of non-overlapping chunk-aligned runs, tagged reserved or
//! available, with coalescing on release and best-fit reservation.

use std::collections::BTreeMap;

use crate::area::{ContainerArea, FileIndex, Side};
use crate::chunk::FillChunk;
use crate::free_space::data::FreeSpaceData;
use crate::status::{Result, Status, StatusClass};
use crate::store::BackingStore;

/// A borrowed-style reference to one entry of a [`FreeSpaceMap`].
///
/// The source library stores an iterator into the underlying map inside
/// this handle; a raw iterator does not survive Rust's aliasing rules
/// across the mutations (`release`, `expand`, `reduce`) that invalidate
/// it. This re-architects the handle as a stable key (the entry's
/// `startingIndex`) plus a cached `(startingIndex, areaSize)` view —
/// `None` stands in for the source's end iterator. Assignment still
/// copies both the key and the cached area, matching the source's
/// iterator-assignment semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    key: Option<FileIndex>,
    area: ContainerArea,
}

impl FreeSpace {
    /// A handle standing in for the source's end iterator, carrying only
    /// a cached area and no backing map entry.
    pub fn end(area: ContainerArea) -> Self {
        Self { key: None, area }
    }

    /// The handle's cached starting index.
    pub fn starting_index(&self) -> FileIndex {
        self.area.starting_index()
    }

    /// The handle's cached area size.
    pub fn area_size(&self) -> u64 {
        self.area.area_size()
    }

    /// True iff this handle does not track a live map entry (the
    /// source's `iterator == end()`).
    pub fn is_end(&self) -> bool {
        self.key.is_none()
    }

    fn key(&self) -> Result<FileIndex> {
        self.key.ok_or_else(|| {
            Status::failure(
                StatusClass::StateError,
                60,
                "free-space handle does not reference a live map entry",
            )
        })
    }
}

/// The free-space manager: an ordered `startingIndex -> FreeSpaceData`
/// map plus the allocator operations exposed to the container shell.
#[derive(Debug, Default)]
pub struct FreeSpaceMap {
    entries: BTreeMap<FileIndex, FreeSpaceData>,
}

impl FreeSpaceMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw entry, for tests and for seeding the map from a
    /// freshly opened container. Callers are responsible for maintaining
    /// the pairwise-disjoint invariant.
    pub fn insert_raw(&mut self, starting_index: FileIndex, data: FreeSpaceData) {
        self.entries.insert(starting_index, data);
    }

    /// Number of tracked runs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff the map tracks no runs at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a handle tracking the entry at `starting_index`, if one
    /// exists.
    pub fn handle_at(&self, starting_index: FileIndex) -> Option<FreeSpace> {
        self.entries.get(&starting_index).map(|data| FreeSpace {
            key: Some(starting_index),
            area: ContainerArea::new(starting_index, data.ending_index().get() - starting_index.get()),
        })
    }

    /// True iff the run tracked by `handle` is currently reserved.
    pub fn is_reserved(&self, handle: &FreeSpace) -> Result<bool> {
        let key = handle.key()?;
        let data = self
            .entries
            .get(&key)
            .ok_or_else(|| stale_handle(key))?;
        Ok(data.is_reserved())
    }

    /// Reserve a run of at least `size` bytes using a first-fit policy
    /// over the lowest-starting-index available run large enough to
    /// satisfy the request, splitting off any excess as a new available
    /// entry.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::AllocationError`] if no tracked run is
    /// large enough; the caller (container shell) is expected to extend
    /// the backing store and retry.
    pub fn reserve(&mut self, size: u64) -> Result<FreeSpace> {
        let candidate = self
            .entries
            .iter()
            .filter(|(_, data)| data.is_available())
            .find(|(start, data)| data.ending_index().get() - start.get() >= size)
            .map(|(&start, _)| start);

        let start = candidate.ok_or_else(|| {
            Status::failure(
                StatusClass::AllocationError,
                61,
                format!("no free run of at least {size} bytes is available"),
            )
        })?;

        let data = *self.entries.get(&start).expect("candidate key just found");
        let full_size = data.ending_index().get() - start.get();
        let reserved_end = FileIndex(start.get() + size);

        if full_size > size {
            self.entries
                .insert(start, FreeSpaceData::new(reserved_end, true, false));
            self.entries.insert(
                reserved_end,
                FreeSpaceData::new(data.ending_index(), false, data.file_update_needed()),
            );
        } else {
            self.entries
                .insert(start, FreeSpaceData::new(data.ending_index(), true, false));
        }

        Ok(FreeSpace {
            key: Some(start),
            area: ContainerArea::new(start, size),
        })
    }

    /// Release a reserved run back to available, coalescing with
    /// contiguous available neighbors and marking the merged entry dirty
    /// so [`FreeSpaceMap::flush_dirty`] re-covers it with fill chunks.
    pub fn release(&mut self, handle: &FreeSpace) -> Result<FreeSpace> {
        let key = handle.key()?;
        let data = *self.entries.get(&key).ok_or_else(|| stale_handle(key))?;
        if data.is_available() {
            return Err(Status::failure(
                StatusClass::StateError,
                62,
                format!("run at index {} is already available", key.get()),
            ));
        }

        let mut new_start = key;
        let mut new_end = data.ending_index();

        if let Some((&prev_start, &prev_data)) = self.entries.range(..key).next_back() {
            if prev_data.is_available() && prev_data.ending_index() == key {
                new_start = prev_start;
                self.entries.remove(&prev_start);
            }
        }
        if let Some((&next_start, &next_data)) = self.entries.range(data.ending_index()..).next() {
            if next_start == data.ending_index() && next_data.is_available() {
                new_end = next_data.ending_index();
                self.entries.remove(&next_start);
            }
        }
        self.entries.remove(&key);
        self.entries
            .insert(new_start, FreeSpaceData::new(new_end, false, true));

        Ok(FreeSpace {
            key: Some(new_start),
            area: ContainerArea::new(new_start, new_end.get() - new_start.get()),
        })
    }

    /// Grow the run tracked by `handle` by `amount` bytes, taking the
    /// space from the adjacent available neighbor on `side`.
    ///
    /// # Errors
    ///
    /// Fails with [`StatusClass::AllocationError`] if there is no
    /// adjacent available neighbor with at least `amount` bytes.
    pub fn expand(&mut self, handle: &FreeSpace, amount: u64, side: Side) -> Result<FreeSpace> {
        let key = handle.key()?;
        let data = *self.entries.get(&key).ok_or_else(|| stale_handle(key))?;

        match side {
            Side::FromBack => {
                let neighbor_start = data.ending_index();
                let neighbor = *self
                    .entries
                    .get(&neighbor_start)
                    .filter(|n| n.is_available())
                    .ok_or_else(|| no_room(amount))?;
                let neighbor_size = neighbor.ending_index().get() - neighbor_start.get();
                if neighbor_size < amount {
                    return Err(no_room(amount));
                }
                let taken_end = FileIndex(neighbor_start.get() + amount);
                if taken_end == neighbor.ending_index() {
                    self.entries.remove(&neighbor_start);
                } else {
                    self.entries.remove(&neighbor_start);
                    self.entries.insert(
                        taken_end,
                        FreeSpaceData::new(neighbor.ending_index(), false, neighbor.file_update_needed()),
                    );
                }
                let new_end = FileIndex(data.ending_index().get() + amount);
                self.entries
                    .insert(key, FreeSpaceData::new(new_end, data.is_reserved(), true));
                Ok(FreeSpace {
                    key: Some(key),
                    area: ContainerArea::new(key, new_end.get() - key.get()),
                })
            }
            Side::FromFront => {
                let neighbor = self
                    .entries
                    .range(..key)
                    .next_back()
                    .filter(|(_, n)| n.is_available())
                    .map(|(&start, &n)| (start, n));
                let (neighbor_start, neighbor) = neighbor.ok_or_else(|| no_room(amount))?;
                let neighbor_size = neighbor.ending_index().get() - neighbor_start.get();
                if neighbor_size < amount {
                    return Err(no_room(amount));
                }
                let new_start = FileIndex(key.get() - amount);
                if neighbor_start == new_start {
                    self.entries.remove(&neighbor_start);
                } else {
                    self.entries.insert(
                        neighbor_start,
                        FreeSpaceData::new(new_start, false, neighbor.file_update_needed()),
                    );
                }
                self.entries.remove(&key);
                self.entries
                    .insert(new_start, FreeSpaceData::new(data.ending_index(), data.is_reserved(), true));
                Ok(FreeSpace {
                    key: Some(new_start),
                    area: ContainerArea::new(new_start, data.ending_index().get() - new_start.get()),
                })
            }
        }
    }

    /// Shrink the run tracked by `handle` by `amount` bytes, returning
    /// the freed slice to the map as (or merging it into) an available
    /// neighbor.
    ///
    /// # Panics
    ///
    /// Panics if `amount` exceeds the handle's current area size, same
    /// as [`ContainerArea::reduce_by`].
    pub fn reduce(&mut self, handle: &FreeSpace, amount: u64, side: Side) -> Result<FreeSpace> {
        let key = handle.key()?;
        let data = *self.entries.get(&key).ok_or_else(|| stale_handle(key))?;
        let full_size = data.ending_index().get() - key.get();
        assert!(
            amount <= full_size,
            "cannot reduce run of size {full_size} by {amount}"
        );

        match side {
            Side::FromBack => {
                let new_end = FileIndex(data.ending_index().get() - amount);
                let freed_start = new_end;
                if let Some(next) = self.entries.get(&data.ending_index()).copied() {
                    if next.is_available() {
                        self.entries.remove(&data.ending_index());
                        self.entries
                            .insert(freed_start, FreeSpaceData::new(next.ending_index(), false, true));
                    } else {
                        self.entries
                            .insert(freed_start, FreeSpaceData::new(data.ending_index(), false, true));
                    }
                } else {
                    self.entries
                        .insert(freed_start, FreeSpaceData::new(data.ending_index(), false, true));
                }
                self.entries
                    .insert(key, FreeSpaceData::new(new_end, data.is_reserved(), data.file_update_needed()));
                Ok(FreeSpace {
                    key: Some(key),
                    area: ContainerArea::new(key, new_end.get() - key.get()),
                })
            }
            Side::FromFront => {
                let new_start = FileIndex(key.get() + amount);
                if let Some((&prev_start, &prev_data)) = self.entries.range(..key).next_back() {
                    if prev_data.is_available() && prev_data.ending_index() == key {
                        self.entries.remove(&prev_start);
                        self.entries
                            .insert(prev_start, FreeSpaceData::new(new_start, false, true));
                    } else {
                        self.entries
                            .insert(key, FreeSpaceData::new(new_start, false, true));
                    }
                } else {
                    self.entries
                        .insert(key, FreeSpaceData::new(new_start, false, true));
                }
                self.entries.remove(&key);
                self.entries.insert(
                    new_start,
                    FreeSpaceData::new(data.ending_index(), data.is_reserved(), data.file_update_needed()),
                );
                Ok(FreeSpace {
                    key: Some(new_start),
                    area: ContainerArea::new(new_start, data.ending_index().get() - new_start.get()),
                })
            }
        }
    }

    /// Cover every dirty available run with fill chunks written through
    /// `store`, clearing `fileUpdateNeeded` as each run is covered.
    pub fn flush_dirty(&mut self, store: &mut dyn BackingStore) -> Result<()> {
        let dirty: Vec<(FileIndex, FreeSpaceData)> = self
            .entries
            .iter()
            .filter(|(_, data)| data.is_available() && data.file_update_needed())
            .map(|(&start, &data)| (start, data))
            .collect();

        for (start, data) in dirty {
            let mut cursor = start.get();
            let end = data.ending_index().get();
            while cursor < end {
                let remaining = end - cursor;
                let mut fill = FillChunk::new(FileIndex(cursor), remaining);
                use crate::chunk::Chunk;
                fill.save(store)?;
                cursor += fill.fill_space_bytes() as u64;
            }
            let mut updated = data;
            updated.set_file_update_needed(false);
            self.entries.insert(start, updated);
        }
        Ok(())
    }
}

fn stale_handle(key: FileIndex) -> Status {
    Status::failure(
        StatusClass::StateError,
        63,
        format!("free-space handle at index {} no longer tracks a live entry", key.get()),
    )
}

fn no_room(amount: u64) -> Status {
    Status::failure(
        StatusClass::AllocationError,
        64,
        format!("no adjacent available run of at least {amount} bytes to expand into"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_assignment_copies_area_and_key() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(1), false, false));

        let h1_source = map.handle_at(FileIndex(0)).unwrap();
        let mut h1 = FreeSpace {
            key: h1_source.key,
            area: ContainerArea::new(FileIndex(1), 2),
        };
        let h2 = FreeSpace::end(ContainerArea::new(FileIndex(3), 4));

        h1 = h2;

        assert_eq!(h1.starting_index(), FileIndex(3));
        assert_eq!(h1.area_size(), 4);
        assert!(h1.is_end());
    }

    #[test]
    fn reserve_splits_larger_run() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(100), false, false));

        let handle = map.reserve(40).unwrap();
        assert_eq!(handle.starting_index(), FileIndex(0));
        assert_eq!(handle.area_size(), 40);
        assert!(map.is_reserved(&handle).unwrap());

        let remainder = map.handle_at(FileIndex(40)).unwrap();
        assert_eq!(remainder.area_size(), 60);
        assert!(!map.is_reserved(&remainder).unwrap());
    }

    #[test]
    fn reserve_exact_fit_does_not_split() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(40), false, false));
        map.reserve(40).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn reserve_fails_when_nothing_fits() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(10), false, false));
        let status = map.reserve(40).unwrap_err();
        assert_eq!(status.status_class(), StatusClass::AllocationError);
    }

    #[test]
    fn release_coalesces_both_neighbors() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(10), false, false));
        map.insert_raw(FileIndex(10), FreeSpaceData::new(FileIndex(20), true, false));
        map.insert_raw(FileIndex(20), FreeSpaceData::new(FileIndex(30), false, false));

        let handle = map.handle_at(FileIndex(10)).unwrap();
        let merged = map.release(&handle).unwrap();

        assert_eq!(merged.starting_index(), FileIndex(0));
        assert_eq!(merged.area_size(), 30);
        assert_eq!(map.len(), 1);
        assert!(!map.is_reserved(&merged).unwrap());
    }

    #[test]
    fn release_of_available_run_fails() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(10), false, false));
        let handle = map.handle_at(FileIndex(0)).unwrap();
        let status = map.release(&handle).unwrap_err();
        assert_eq!(status.status_class(), StatusClass::StateError);
    }

    #[test]
    fn expand_from_back_absorbs_neighbor() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(10), true, false));
        map.insert_raw(FileIndex(10), FreeSpaceData::new(FileIndex(30), false, false));

        let handle = map.handle_at(FileIndex(0)).unwrap();
        let grown = map.expand(&handle, 5, Side::FromBack).unwrap();

        assert_eq!(grown.area_size(), 15);
        let remainder = map.handle_at(FileIndex(15)).unwrap();
        assert_eq!(remainder.area_size(), 15);
    }

    #[test]
    fn reduce_from_back_frees_a_sliver() {
        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(10), true, false));

        let handle = map.handle_at(FileIndex(0)).unwrap();
        let shrunk = map.reduce(&handle, 4, Side::FromBack).unwrap();

        assert_eq!(shrunk.area_size(), 6);
        let freed = map.handle_at(FileIndex(6)).unwrap();
        assert_eq!(freed.area_size(), 4);
        assert!(!map.is_reserved(&freed).unwrap());
    }

    #[test]
    fn flush_dirty_covers_free_runs_with_fill_chunks() {
        use crate::store::MemoryStore;

        let mut map = FreeSpaceMap::new();
        map.insert_raw(FileIndex(0), FreeSpaceData::new(FileIndex(100), false, true));
        let mut store = MemoryStore::new();
        store.truncate(FileIndex(100)).unwrap();

        map.flush_dirty(&mut store).unwrap();

        let handle = map.handle_at(FileIndex(0)).unwrap();
        assert!(!handle.is_end());
        let data = *map.entries.get(&FileIndex(0)).unwrap();
        assert!(!data.file_update_needed());
    }
}
