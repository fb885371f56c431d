//! Allocator error types.
//!
//! Allocation failure is not an error: `malloc`/`calloc` return `None` and
//! count the failure. Errors here are either construction problems or the
//! fatal class raised by `free` on an address the registry does not own.

use thiserror::Error;

use super::call_site::CallSite;

/// Invalid `HeapState` construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("arena capacity must be non-zero")]
    ZeroCapacity,
    #[error("arena base address must be non-null")]
    NullBase,
    #[error("arena [{base:#x}, +{capacity}) overflows the address space")]
    AddressSpaceOverflow { base: usize, capacity: usize },
}

/// Fatal-class result of freeing an address the heap does not own.
///
/// Every variant covers a programming error in the caller. The core reports
/// it and leaves the heap untouched; the boundary layer decides whether to
/// terminate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FreeError {
    #[error("invalid free of pointer {address:#x}, not in heap\n{call_site}")]
    OutsideHeap { address: usize, call_site: CallSite },
    #[error("invalid free of pointer {address:#x}, double free\n{call_site}")]
    DoubleFree { address: usize, call_site: CallSite },
    #[error(
        "invalid free of pointer {address:#x}, not allocated\n{call_site}: {address:#x} is {offset} bytes inside a {block_size} byte region allocated here ({allocated_at})"
    )]
    InteriorPointer {
        address: usize,
        block_start: usize,
        block_size: usize,
        offset: usize,
        allocated_at: CallSite,
        call_site: CallSite,
    },
    #[error("invalid free of pointer {address:#x}, not allocated\n{call_site}")]
    NotAllocated { address: usize, call_site: CallSite },
}

impl FreeError {
    /// The address passed to `free`.
    #[must_use]
    pub fn address(&self) -> usize {
        match self {
            Self::OutsideHeap { address, .. }
            | Self::DoubleFree { address, .. }
            | Self::InteriorPointer { address, .. }
            | Self::NotAllocated { address, .. } => *address,
        }
    }

    /// Where the offending `free` was called.
    #[must_use]
    pub fn call_site(&self) -> &CallSite {
        match self {
            Self::OutsideHeap { call_site, .. }
            | Self::DoubleFree { call_site, .. }
            | Self::InteriorPointer { call_site, .. }
            | Self::NotAllocated { call_site, .. } => call_site,
        }
    }

    #[must_use]
    pub fn is_double_free(&self) -> bool {
        matches!(self, Self::DoubleFree { .. })
    }

    /// Stable event label used in lifecycle records.
    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            Self::OutsideHeap { .. } | Self::NotAllocated { .. } => "invalid_free",
            Self::DoubleFree { .. } => "double_free_detected",
            Self::InteriorPointer { .. } => "interior_free",
        }
    }
}

/// A broken structural invariant found by `HeapState::check_invariants`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("extent sizes sum to {total}, arena capacity is {capacity}")]
    SizeMismatch { total: usize, capacity: usize },
    #[error("extent {index} starts at offset {found}, expected {expected}")]
    Gap {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("extent {index} has zero size")]
    EmptyExtent { index: usize },
    #[error("extents {index} and {} are both free", .index + 1)]
    AdjacentFree { index: usize },
    #[error("live record {address:#x} has no used extent at its offset")]
    OrphanRecord { address: usize },
    #[error("used extent at offset {offset} has no live record")]
    UnrecordedExtent { offset: usize },
    #[error("freed address {address:#x} lies inside a used extent")]
    StaleFreedAddress { address: usize },
    #[error("active_size is {active_size}, registry holds {registry_bytes} bytes")]
    ActiveSizeMismatch {
        active_size: u64,
        registry_bytes: u64,
    },
    #[error("nactive is {nactive}, registry holds {records} records")]
    ActiveCountMismatch { nactive: u64, records: usize },
}
