//! Fixed-size backing region.
//!
//! One anonymous private mapping obtained up front and released on drop.
//! The arena never grows and is never partially returned to the OS.

use std::io;
use std::ptr::{self, NonNull};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("arena size must be non-zero")]
    ZeroSize,
    #[error("mmap of {size} bytes failed: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: io::Error,
    },
}

/// An `mmap`ed read/write region of `len` bytes.
#[derive(Debug)]
pub struct Arena {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is owned exclusively by this value and is only written
// through pointers handed out by `Heap`, which serialises its own accesses.
unsafe impl Send for Arena {}
// SAFETY: see above; `Arena` itself exposes no interior mutation.
unsafe impl Sync for Arena {}

impl Arena {
    /// Maps `len` zeroed bytes.
    pub fn map(len: usize) -> Result<Self, ArenaError> {
        if len == 0 {
            return Err(ArenaError::ZeroSize);
        }
        // SAFETY: anonymous private mapping at a kernel-chosen address; no fd
        // and no existing memory is affected.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(ArenaError::MapFailed {
                size: len,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(raw.cast::<u8>()).ok_or_else(|| ArenaError::MapFailed {
            size: len,
            source: io::Error::other("mmap returned null"),
        })?;
        Ok(Self { base, len })
    }

    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Address of the first byte.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Mapped length in bytes; never 0, since `map` rejects empty arenas.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn contains(&self, address: usize) -> bool {
        address
            .checked_sub(self.base_addr())
            .is_some_and(|offset| offset < self.len)
    }

    /// Pointer to the byte at `offset`, derived from the mapping's base.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= len`.
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset < self.len, "offset {offset} outside arena of {}", self.len);
        // SAFETY: `offset < len`, so the result stays inside the mapping and
        // cannot be null.
        unsafe { self.base.add(offset) }
    }

    /// Zeroes `len` bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// No other reference to the range may be live while this runs.
    ///
    /// # Panics
    ///
    /// Panics if the range does not lie inside the arena.
    pub unsafe fn zero(&self, offset: usize, len: usize) {
        let end = offset.saturating_add(len);
        assert!(end <= self.len, "zero range [{offset}, {end}) outside arena");
        if len == 0 {
            return;
        }
        // SAFETY: range checked above; exclusivity is the caller's contract.
        unsafe { self.base.add(offset).as_ptr().write_bytes(0, len) };
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe exactly the mapping created in `map`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}
