//! Half-open `[starting_index, starting_index + area_size)` interval.

use std::ops::Add;

/// A byte offset into the backing store. All chunk boundaries are
/// multiples of [`crate::chunk::MINIMUM_CHUNK_SIZE_BYTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileIndex(pub u64);

impl FileIndex {
    /// Build a `FileIndex` from a raw byte offset.
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// The raw byte offset.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Add<u64> for FileIndex {
    type Output = FileIndex;

    fn add(self, rhs: u64) -> FileIndex {
        FileIndex(self.0 + rhs)
    }
}

impl From<u64> for FileIndex {
    fn from(value: u64) -> Self {
        FileIndex(value)
    }
}

/// Which end of a [`ContainerArea`] an expand/reduce operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The low-index end: expanding moves `starting_index` down, reducing
    /// moves it up.
    FromFront,
    /// The high-index end: expanding/reducing only changes `area_size`.
    FromBack,
}

/// A half-open interval `[starting_index, ending_index)` of chunk-aligned
/// space, where `ending_index = starting_index + area_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerArea {
    starting_index: FileIndex,
    area_size: u64,
}

impl ContainerArea {
    /// Build an area from a starting index and size.
    pub fn new(starting_index: FileIndex, area_size: u64) -> Self {
        Self {
            starting_index,
            area_size,
        }
    }

    /// The area's starting index.
    pub fn starting_index(&self) -> FileIndex {
        self.starting_index
    }

    /// The area's size in bytes.
    pub fn area_size(&self) -> u64 {
        self.area_size
    }

    /// The one-past-the-end index, `starting_index + area_size`.
    pub fn ending_index(&self) -> FileIndex {
        self.starting_index + self.area_size
    }

    /// Replace the starting index, leaving `area_size` fixed (so
    /// `ending_index` moves with it).
    pub fn set_starting_index(&mut self, starting_index: FileIndex) {
        self.starting_index = starting_index;
    }

    /// Replace the area size, leaving `starting_index` fixed.
    pub fn set_area_size(&mut self, area_size: u64) {
        self.area_size = area_size;
    }

    /// Set the ending index, leaving `starting_index` fixed and adjusting
    /// `area_size` to match.
    ///
    /// # Panics
    ///
    /// Panics if `ending_index < starting_index`.
    pub fn set_ending_index(&mut self, ending_index: FileIndex) {
        assert!(
            ending_index.get() >= self.starting_index.get(),
            "ending index {:?} precedes starting index {:?}",
            ending_index,
            self.starting_index
        );
        self.area_size = ending_index.get() - self.starting_index.get();
    }

    /// Grow the area by `amount` bytes on the given side.
    pub fn expand_by(&mut self, amount: u64, side: Side) {
        match side {
            Side::FromFront => {
                self.starting_index = FileIndex(self.starting_index.get() - amount);
                self.area_size += amount;
            }
            Side::FromBack => {
                self.area_size += amount;
            }
        }
    }

    /// Shrink the area by `amount` bytes on the given side.
    ///
    /// # Panics
    ///
    /// Panics if `amount` exceeds the current `area_size` — reducing
    /// beyond the area's size is a caller error per the area's invariant
    /// that `area_size >= 0`.
    pub fn reduce_by(&mut self, amount: u64, side: Side) {
        assert!(
            amount <= self.area_size,
            "cannot reduce area of size {} by {}",
            self.area_size,
            amount
        );
        match side {
            Side::FromFront => {
                self.starting_index = self.starting_index + amount;
                self.area_size -= amount;
            }
            Side::FromBack => {
                self.area_size -= amount;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zeroed() {
        let area = ContainerArea::default();
        assert_eq!(area.starting_index(), FileIndex(0));
        assert_eq!(area.area_size(), 0);
    }

    #[test]
    fn construction() {
        let area = ContainerArea::new(FileIndex(1), 2);
        assert_eq!(area.starting_index(), FileIndex(1));
        assert_eq!(area.area_size(), 2);
    }

    #[test]
    fn copy_preserves_fields() {
        let area = ContainerArea::new(FileIndex(1), 2);
        let copy = area;
        assert_eq!(copy.starting_index(), FileIndex(1));
        assert_eq!(copy.area_size(), 2);
    }

    #[test]
    fn accessors() {
        let mut area = ContainerArea::default();
        assert_eq!(area.ending_index(), FileIndex(0));

        area.set_starting_index(FileIndex(2));
        area.set_area_size(3);
        assert_eq!(area.starting_index(), FileIndex(2));
        assert_eq!(area.area_size(), 3);
        assert_eq!(area.ending_index(), FileIndex(5));

        area.set_ending_index(FileIndex(3));
        assert_eq!(area.starting_index(), FileIndex(2));
        assert_eq!(area.area_size(), 1);
        assert_eq!(area.ending_index(), FileIndex(3));
    }

    #[test]
    fn expand_and_reduce_round_trip() {
        let mut area = ContainerArea::new(FileIndex(10), 20);

        area.reduce_by(10, Side::FromFront);
        assert_eq!(area.starting_index(), FileIndex(20));
        assert_eq!(area.area_size(), 10);

        area.expand_by(10, Side::FromFront);
        assert_eq!(area.starting_index(), FileIndex(10));
        assert_eq!(area.area_size(), 20);

        area.expand_by(10, Side::FromBack);
        assert_eq!(area.starting_index(), FileIndex(10));
        assert_eq!(area.area_size(), 30);

        area.reduce_by(10, Side::FromBack);
        assert_eq!(area.starting_index(), FileIndex(10));
        assert_eq!(area.area_size(), 20);
    }

    #[test]
    fn assignment_replaces_value() {
        let source = ContainerArea::new(FileIndex(1), 2);
        let mut target = ContainerArea::default();
        target = source;
        assert_eq!(target.starting_index(), FileIndex(1));
        assert_eq!(target.area_size(), 2);
    }

    #[test]
    #[should_panic]
    fn reduce_beyond_size_panics() {
        let mut area = ContainerArea::new(FileIndex(0), 5);
        area.reduce_by(6, Side::FromBack);
    }
}
