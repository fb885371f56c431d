//! ABI layer for the debugging allocator (`arenaheap_malloc`, `arenaheap_free`,
//! `arenaheap_calloc` and the reporting entry points).
//!
//! Every entry point takes the caller's `(file, line)` so diagnostics can name
//! the call site. The process-wide heap is created on first use from
//! [`HeapConfig::from_env`]; if the arena cannot be mapped, allocation entry
//! points return null and reporting entry points print nothing.
//!
//! The process-wide heap lives in a static and is never dropped, so its arena
//! is not `munmap`ed explicitly; the kernel reclaims the mapping when the
//! process exits. An `atexit` hook cannot unmap it safely because other exit
//! handlers may still free into it. Heaps built with [`Heap::new`] unmap their
//! arena on drop.

use std::ffi::c_void;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use arenaheap_core::{FreeError, Statistics};

use crate::config::{HeapConfig, HeapMode};
use crate::heap::Heap;

struct GlobalHeap {
    heap: Heap,
    mode: HeapMode,
}

static GLOBAL: OnceLock<Option<GlobalHeap>> = OnceLock::new();
static IGNORED_INVALID_FREES: AtomicU64 = AtomicU64::new(0);

fn global() -> Option<&'static GlobalHeap> {
    GLOBAL
        .get_or_init(|| {
            let config = HeapConfig::from_env();
            match Heap::with_config(&config) {
                Ok(heap) => Some(GlobalHeap {
                    heap,
                    mode: config.mode,
                }),
                Err(err) => {
                    eprintln!("arenaheap: heap initialisation failed: {err}");
                    None
                }
            }
        })
        .as_ref()
}

/// What the boundary does with an invalid free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFreeAction {
    Terminate,
    Ignore,
}

impl InvalidFreeAction {
    #[must_use]
    pub const fn for_mode(mode: HeapMode) -> Self {
        if mode.terminates_on_invalid_free() {
            Self::Terminate
        } else {
            Self::Ignore
        }
    }
}

/// Writes the `MEMORY BUG` line for `err` and returns the action to take.
pub fn report_invalid_free<W: Write>(
    out: &mut W,
    err: &FreeError,
    mode: HeapMode,
) -> InvalidFreeAction {
    // Best effort: the process may be about to exit.
    let _ = writeln!(out, "MEMORY BUG: {err}");
    let action = InvalidFreeAction::for_mode(mode);
    if action == InvalidFreeAction::Ignore {
        IGNORED_INVALID_FREES.fetch_add(1, Ordering::Relaxed);
    }
    action
}

/// C view of [`Statistics`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaheapStatistics {
    pub nactive: u64,
    pub active_size: u64,
    pub ntotal: u64,
    pub total_size: u64,
    pub nfail: u64,
    pub fail_size: u64,
    pub heap_min: usize,
    pub heap_max: usize,
}

impl From<Statistics> for ArenaheapStatistics {
    fn from(stats: Statistics) -> Self {
        Self {
            nactive: stats.nactive,
            active_size: stats.active_size,
            ntotal: stats.ntotal,
            total_size: stats.total_size,
            nfail: stats.nfail,
            fail_size: stats.fail_size,
            heap_min: stats.heap_min,
            heap_max: stats.heap_max,
        }
    }
}

abi_fn! {
    /// Allocates `size` bytes; null when the arena has no fitting free extent.
    fn arenaheap_malloc(size: usize; site = site) -> *mut c_void {
        match global().and_then(|g| g.heap.malloc(size, site)) {
            Some(ptr) => ptr.as_ptr().cast(),
            None => std::ptr::null_mut(),
        }
    }
}

abi_fn! {
    /// Allocates `count * size` zeroed bytes; null on overflow or exhaustion.
    fn arenaheap_calloc(count: usize, size: usize; site = site) -> *mut c_void {
        match global().and_then(|g| g.heap.calloc(count, size, site)) {
            Some(ptr) => ptr.as_ptr().cast(),
            None => std::ptr::null_mut(),
        }
    }
}

abi_fn! {
    /// Frees `ptr`. Null is a no-op. Any other pointer the heap does not own is
    /// reported and, in strict mode, terminates the process with status 1.
    fn arenaheap_free(ptr: *mut c_void; site = site) {
        if ptr.is_null() {
            return;
        }
        let Some(global) = global() else {
            return;
        };
        if let Err(err) = global.heap.free(ptr.cast(), site) {
            let stderr = std::io::stderr();
            let action = report_invalid_free(&mut stderr.lock(), &err, global.mode);
            if action == InvalidFreeAction::Terminate {
                std::process::exit(1);
            }
        }
    }
}

abi_fn! {
    /// Snapshot of the process-wide statistics.
    fn arenaheap_get_statistics() -> ArenaheapStatistics {
        global()
            .map(|g| ArenaheapStatistics::from(g.heap.statistics()))
            .unwrap_or_else(|| Statistics::default().into())
    }
}

abi_fn! {
    /// Prints the two statistics lines to stdout.
    fn arenaheap_print_statistics() {
        match global() {
            Some(g) => g.heap.print_statistics(),
            None => print!("{}", Statistics::default()),
        }
    }
}

abi_fn! {
    /// Prints one `LEAK CHECK` line per live allocation to stdout.
    fn arenaheap_print_leak_report() {
        if let Some(g) = global() {
            g.heap.print_leak_report();
        }
    }
}

abi_fn! {
    /// Invalid frees reported and ignored in hardened mode.
    fn arenaheap_ignored_invalid_frees() -> u64 {
        IGNORED_INVALID_FREES.load(Ordering::Relaxed)
    }
}
