//! Memory allocation.
//!
//! First-fit allocation over a single arena:
//! - [`extent`]: the offset-ordered partition with split and coalesce
//! - [`registry`]: live allocations keyed by address
//! - [`stats`]: cumulative counters and the leak report
//! - [`allocator`]: `malloc`/`free`/`calloc` over the pieces above

pub mod allocator;
pub mod call_site;
pub mod error;
pub mod extent;
pub mod registry;
pub mod stats;

pub use allocator::{
    AllocatorLogLevel, AllocatorLogRecord, DEFAULT_BASE, DEFAULT_LOG_CAPACITY, HeapOptions,
    HeapState,
};
pub use call_site::CallSite;
pub use error::{FreeError, HeapError, InvariantViolation};
pub use extent::{Coalesce, Extent, ExtentTable};
pub use registry::{AllocationRecord, AllocationRegistry};
pub use stats::{LeakEntry, LeakReport, Statistics};
