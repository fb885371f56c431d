// All extern "C" exports take raw pointers from C callers; their contracts are
// documented once at module level.
#![allow(clippy::missing_safety_doc)]
//! # arenaheap-abi
//!
//! Byte-owning layer over `arenaheap-core`.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> Heap (lock + arena bytes) -> HeapState -> return
//! ```
//!
//! - [`arena::Arena`]: one anonymous `mmap` region of fixed size, unmapped on drop.
//! - [`heap::Heap`]: the arena plus a `HeapState` behind a single mutex; every
//!   call holds the lock for its whole duration, and `calloc` zero-fills under it.
//! - [`config`]: arena size, invalid-free mode and log capacity from the environment.
//! - [`malloc_abi`]: `extern "C"` entry points over a process-wide heap.
//!
//! In **strict** mode an invalid free terminates the process after printing a
//! `MEMORY BUG` diagnostic. In **hardened** mode it is reported, counted and ignored.

#[macro_use]
mod macros;

pub mod arena;
pub mod config;
pub mod heap;
pub mod malloc_abi;
pub mod util;

pub use arena::{Arena, ArenaError};
pub use config::{DEFAULT_ARENA_SIZE, HeapConfig, HeapMode};
pub use heap::{Heap, HeapInitError};
