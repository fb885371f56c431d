//! Extent table.
//!
//! The arena `[0, capacity)` is partitioned into extents kept in a `Vec`
//! sorted by offset. At every point between calls:
//! - extent sizes sum to `capacity` and each extent starts where the previous
//!   one ends (no gaps, no overlap),
//! - no extent is empty,
//! - no two neighbouring extents are both free.
//!
//! Adjacency is index adjacency: the neighbours of `extents[i]` are
//! `extents[i - 1]` and `extents[i + 1]`.

use super::error::InvariantViolation;

/// A contiguous byte range of the arena, addressed by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: usize,
    pub size: usize,
    pub free: bool,
}

impl Extent {
    /// One past the last offset covered by this extent.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Which neighbours a released extent was merged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coalesce {
    /// Index of the resulting free extent.
    pub index: usize,
    pub with_next: bool,
    pub with_prev: bool,
}

/// Offset-ordered partition of the arena.
#[derive(Debug, Clone)]
pub struct ExtentTable {
    extents: Vec<Extent>,
    capacity: usize,
}

impl ExtentTable {
    /// A table holding one free extent spanning `[0, capacity)`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            extents: vec![Extent {
                offset: 0,
                size: capacity,
                free: true,
            }],
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of extents; at least 1, since the table always covers the arena.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Extent> {
        self.extents.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    /// First-fit: index of the lowest-offset free extent of at least `size` bytes.
    #[must_use]
    pub fn find_fit(&self, size: usize) -> Option<usize> {
        self.extents.iter().position(|e| e.free && e.size >= size)
    }

    /// Index of the extent starting exactly at `offset`.
    #[must_use]
    pub fn position_of(&self, offset: usize) -> Option<usize> {
        self.extents.binary_search_by_key(&offset, |e| e.offset).ok()
    }

    /// Consumes the free extent at `index` for `used_size` bytes.
    ///
    /// The front `used_size` bytes become a used extent at the same offset; any
    /// remainder becomes a new free extent right after it. Returns the used
    /// extent and the remainder, if one was created.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range. In debug builds, also if the extent
    /// is not free, is smaller than `used_size`, or `used_size` is zero.
    pub fn split(&mut self, index: usize, used_size: usize) -> (Extent, Option<Extent>) {
        let extent = self.extents[index];
        debug_assert!(extent.free, "split of a used extent");
        debug_assert!(used_size > 0 && used_size <= extent.size);

        let used = Extent {
            offset: extent.offset,
            size: used_size,
            free: false,
        };
        self.extents[index] = used;

        if extent.size == used_size {
            return (used, None);
        }
        let remainder = Extent {
            offset: used.end(),
            size: extent.size - used_size,
            free: true,
        };
        self.extents.insert(index + 1, remainder);
        (used, Some(remainder))
    }

    /// Marks the used extent at `index` free and coalesces it.
    pub fn release(&mut self, index: usize) -> Coalesce {
        debug_assert!(!self.extents[index].free, "release of a free extent");
        self.extents[index].free = true;
        self.merge_adjacent(index)
    }

    /// Merges the free extent at `index` with a free successor, then with a
    /// free predecessor. Both checks always run.
    pub fn merge_adjacent(&mut self, index: usize) -> Coalesce {
        let mut out = Coalesce {
            index,
            ..Coalesce::default()
        };
        if !self.extents[index].free {
            return out;
        }

        if self.extents.get(index + 1).is_some_and(|next| next.free) {
            let next = self.extents.remove(index + 1);
            self.extents[index].size += next.size;
            out.with_next = true;
        }

        if index > 0 && self.extents[index - 1].free {
            let current = self.extents.remove(index);
            self.extents[index - 1].size += current.size;
            out.index = index - 1;
            out.with_prev = true;
        }
        out
    }

    /// Total bytes across free extents.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.extents.iter().filter(|e| e.free).map(|e| e.size).sum()
    }

    /// Size of the largest free extent (0 when the arena is full).
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.extents
            .iter()
            .filter(|e| e.free)
            .map(|e| e.size)
            .max()
            .unwrap_or(0)
    }

    /// Verifies the partition and no-free-adjacency invariants.
    pub fn check(&self) -> Result<(), InvariantViolation> {
        let mut expected = 0usize;
        for (index, extent) in self.extents.iter().enumerate() {
            if extent.size == 0 {
                return Err(InvariantViolation::EmptyExtent { index });
            }
            if extent.offset != expected {
                return Err(InvariantViolation::Gap {
                    index,
                    expected,
                    found: extent.offset,
                });
            }
            expected = extent.end();
        }
        if expected != self.capacity {
            return Err(InvariantViolation::SizeMismatch {
                total: expected,
                capacity: self.capacity,
            });
        }
        if let Some(index) = self
            .extents
            .windows(2)
            .position(|pair| pair[0].free && pair[1].free)
        {
            return Err(InvariantViolation::AdjacentFree { index });
        }
        Ok(())
    }
}
