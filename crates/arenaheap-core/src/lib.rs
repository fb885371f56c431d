//! # arenaheap-core
//!
//! Safe Rust model of a debugging heap that manages one fixed-size arena.
//!
//! The arena is described by a logical address range `[base, base + capacity)`.
//! This crate owns the bookkeeping only:
//! - the extent table (an ordered, gap-free partition into free/used extents),
//! - the allocation registry (live address -> requested size + call site),
//! - the statistics tracker and leak report.
//!
//! Real bytes live in `arenaheap-abi`, which maps the arena and zero-fills
//! `calloc` results. No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod malloc;

pub use malloc::{
    AllocationRecord, AllocatorLogLevel, AllocatorLogRecord, CallSite, Extent, FreeError,
    HeapError, HeapOptions, HeapState, InvariantViolation, LeakEntry, LeakReport, Statistics,
};
