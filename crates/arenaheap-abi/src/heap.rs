//! Thread-safe heap over a mapped arena.
//!
//! `Heap` pairs an [`Arena`] with a `HeapState` whose base is the arena's real
//! address. A single `parking_lot::Mutex` guards the extent table, registry
//! and statistics together; it is held for the whole of each call, including
//! failure paths and the zero-fill in `calloc`, and released when the guard
//! drops.

use std::ptr::NonNull;

use arenaheap_core::{
    AllocatorLogRecord, CallSite, FreeError, HeapError, HeapState, InvariantViolation, LeakReport,
    Statistics,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::arena::{Arena, ArenaError};
use crate::config::HeapConfig;

#[derive(Debug, Error)]
pub enum HeapInitError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    State(#[from] HeapError),
}

/// Debugging heap over one fixed-size mapping.
#[derive(Debug)]
pub struct Heap {
    arena: Arena,
    state: Mutex<HeapState>,
}

impl Heap {
    /// Maps `arena_size` bytes and manages them with default options.
    pub fn new(arena_size: usize) -> Result<Self, HeapInitError> {
        Self::with_config(&HeapConfig {
            arena_size,
            ..HeapConfig::default()
        })
    }

    pub fn with_config(config: &HeapConfig) -> Result<Self, HeapInitError> {
        let arena = Arena::map(config.arena_size)?;
        let state =
            HeapState::with_options(arena.base_addr(), arena.len(), config.heap_options())?;
        Ok(Self {
            arena,
            state: Mutex::new(state),
        })
    }

    fn pointer_for(&self, address: usize) -> NonNull<u8> {
        self.arena.ptr_at(address - self.arena.base_addr())
    }

    /// Allocates `size` bytes; `None` when no free extent fits.
    pub fn malloc(&self, size: usize, call_site: CallSite) -> Option<NonNull<u8>> {
        let address = self.state.lock().malloc(size, call_site)?;
        Some(self.pointer_for(address))
    }

    /// Allocates `count * size` zeroed bytes; `None` on overflow or exhaustion.
    pub fn calloc(&self, count: usize, size: usize, call_site: CallSite) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();
        let address = state.calloc(count, size, call_site)?;
        let len = state.lookup(address).unwrap_or(0);
        let offset = address - self.arena.base_addr();
        // SAFETY: `[offset, offset + len)` is the extent just handed out and
        // the lock is still held, so no other call can reach it.
        unsafe { self.arena.zero(offset, len) };
        drop(state);
        Some(self.pointer_for(address))
    }

    /// Frees `ptr`. Null is a no-op; anything the heap does not own is a
    /// fatal-class [`FreeError`] and leaves the heap unchanged.
    pub fn free(&self, ptr: *mut u8, call_site: CallSite) -> Result<(), FreeError> {
        self.state.lock().free(ptr as usize, call_site)
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.state.lock().statistics()
    }

    #[must_use]
    pub fn leak_report(&self) -> LeakReport {
        self.state.lock().leak_report()
    }

    pub fn print_statistics(&self) {
        self.state.lock().print_statistics();
    }

    pub fn print_leak_report(&self) {
        self.state.lock().print_leak_report();
    }

    /// Requested size of the live block at `ptr`.
    #[must_use]
    pub fn lookup(&self, ptr: *const u8) -> Option<usize> {
        self.state.lock().lookup(ptr as usize)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.state.lock().check_invariants()
    }

    pub fn drain_lifecycle_logs(&self) -> Vec<AllocatorLogRecord> {
        self.state.lock().drain_lifecycle_logs()
    }

    /// Runs `f` with the state locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&HeapState) -> R) -> R {
        f(&self.state.lock())
    }

    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}
