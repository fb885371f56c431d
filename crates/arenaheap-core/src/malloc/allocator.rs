//! Core allocator state.
//!
//! `HeapState` is the allocator context: it ties the extent table, the
//! allocation registry and the statistics together so that every call
//! updates all three as a unit. It works on addresses in
//! `[base, base + capacity)` and never touches memory; the layer that owns
//! the bytes (see `arenaheap-abi`) wraps it in a lock and does the zeroing.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};

use super::call_site::CallSite;
use super::error::{FreeError, HeapError, InvariantViolation};
use super::extent::{Extent, ExtentTable};
use super::registry::{AllocationRecord, AllocationRegistry};
use super::stats::{LeakEntry, LeakReport, Statistics};

/// Logical base used by [`HeapState::new`]; keeps address 0 free to mean null.
pub const DEFAULT_BASE: usize = 0x1000;

/// Default size of the lifecycle log ring.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// Allocator lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl AllocatorLogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Structured allocator lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: AllocatorLogLevel,
    /// API symbol (`malloc`, `free`, `calloc`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `free`, `coalesce`, ...).
    pub event: &'static str,
    /// Address involved in the event.
    pub ptr: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Caller location, when one was supplied.
    pub call_site: Option<CallSite>,
    /// Snapshot: live allocation count.
    pub active_count: u64,
    /// Snapshot: live requested bytes.
    pub active_size: u64,
    /// Snapshot: number of extents in the table.
    pub extent_count: usize,
}

/// Tunables for a [`HeapState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapOptions {
    /// Lifecycle records kept before the oldest is dropped; 0 disables logging.
    pub log_capacity: usize,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Allocator context for one arena.
#[derive(Debug, Clone)]
pub struct HeapState {
    /// Address of arena offset 0.
    base: usize,
    /// Offset-ordered free/used partition of the arena.
    extents: ExtentTable,
    /// Live allocations by address.
    registry: AllocationRegistry,
    /// Cumulative counters.
    stats: Statistics,
    /// Monotonic lifecycle decision id.
    next_decision_id: u64,
    /// Bounded ring of lifecycle records.
    lifecycle_logs: VecDeque<AllocatorLogRecord>,
    log_capacity: usize,
}

impl HeapState {
    /// Heap over `[DEFAULT_BASE, DEFAULT_BASE + capacity)` with default options.
    pub fn new(capacity: usize) -> Result<Self, HeapError> {
        Self::with_options(DEFAULT_BASE, capacity, HeapOptions::default())
    }

    /// Heap over `[base, base + capacity)` with default options.
    pub fn with_base(base: usize, capacity: usize) -> Result<Self, HeapError> {
        Self::with_options(base, capacity, HeapOptions::default())
    }

    pub fn with_options(
        base: usize,
        capacity: usize,
        options: HeapOptions,
    ) -> Result<Self, HeapError> {
        if capacity == 0 {
            return Err(HeapError::ZeroCapacity);
        }
        if base == 0 {
            return Err(HeapError::NullBase);
        }
        if base.checked_add(capacity).is_none() {
            return Err(HeapError::AddressSpaceOverflow { base, capacity });
        }
        Ok(Self {
            base,
            extents: ExtentTable::new(capacity),
            registry: AllocationRegistry::new(),
            stats: Statistics::default(),
            next_decision_id: 1,
            lifecycle_logs: VecDeque::with_capacity(options.log_capacity.min(64)),
            log_capacity: options.log_capacity,
        })
    }

    fn next_log_decision_id(&mut self) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lifecycle(
        &mut self,
        level: AllocatorLogLevel,
        symbol: &'static str,
        event: &'static str,
        ptr: Option<usize>,
        size: Option<usize>,
        outcome: &'static str,
        details: fmt::Arguments<'_>,
        call_site: Option<&CallSite>,
    ) {
        if self.log_capacity == 0 {
            return;
        }
        let decision_id = self.next_log_decision_id();
        let trace_id = format!("core::malloc::{}::{:016x}", symbol, decision_id);
        if self.lifecycle_logs.len() == self.log_capacity {
            self.lifecycle_logs.pop_front();
        }
        self.lifecycle_logs.push_back(AllocatorLogRecord {
            decision_id,
            trace_id,
            level,
            symbol,
            event,
            ptr,
            size,
            outcome,
            details: details.to_string(),
            call_site: call_site.cloned(),
            active_count: self.stats.nactive,
            active_size: self.stats.active_size,
            extent_count: self.extents.len(),
        });
    }

    /// Allocates `size` bytes with first-fit.
    ///
    /// Returns the address of the first byte, or `None` (counted in `nfail`
    /// and `fail_size`) when no free extent is large enough. A zero-byte
    /// request reserves one byte so the address stays unique.
    pub fn malloc(&mut self, size: usize, call_site: CallSite) -> Option<usize> {
        let reserved = size.max(1);

        let Some(index) = self.extents.find_fit(reserved) else {
            self.stats.record_failure(size as u64);
            let largest = self.extents.largest_free();
            let free = self.extents.free_bytes();
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "malloc",
                "alloc_failed",
                None,
                Some(size),
                "oom",
                format_args!("largest_free={largest} free_bytes={free}"),
                Some(&call_site),
            );
            return None;
        };

        let (used, remainder) = self.extents.split(index, reserved);
        let address = self.base + used.offset;
        if let Some(rest) = remainder {
            self.record_lifecycle(
                AllocatorLogLevel::Debug,
                "malloc",
                "split",
                Some(address),
                Some(reserved),
                "split",
                format_args!("remainder_offset={} remainder_size={}", rest.offset, rest.size),
                None,
            );
        }

        self.stats.record_allocation(address, size, reserved);
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            "malloc",
            "alloc",
            Some(address),
            Some(size),
            "success",
            format_args!("path=first_fit extent_index={index}"),
            Some(&call_site),
        );
        self.registry.insert(AllocationRecord {
            address,
            size,
            call_site,
        });
        Some(address)
    }

    /// Frees a block previously returned by `malloc`/`calloc`.
    ///
    /// No-op if `address` is 0 (null equivalent). Any other address the
    /// registry does not hold is a fatal-class [`FreeError`]; the heap is
    /// left unchanged in that case, so a repeated free never decrements the
    /// counters twice.
    pub fn free(&mut self, address: usize, call_site: CallSite) -> Result<(), FreeError> {
        if address == 0 {
            self.record_lifecycle(
                AllocatorLogLevel::Trace,
                "free",
                "free_null",
                Some(address),
                None,
                "noop",
                format_args!("null_pointer"),
                Some(&call_site),
            );
            return Ok(());
        }

        let Some(record) = self.registry.remove(address) else {
            let err = self.classify_invalid_free(address, call_site);
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "free",
                err.event(),
                Some(address),
                None,
                "rejected",
                format_args!("{err}"),
                Some(err.call_site()),
            );
            return Err(err);
        };

        let offset = address - self.base;
        let index = self
            .extents
            .position_of(offset)
            .filter(|&i| self.extents.get(i).is_some_and(|e| !e.free));
        let Some(index) = index else {
            // Registry and extent table disagree; refuse rather than corrupt further.
            self.registry.insert(record);
            self.record_lifecycle(
                AllocatorLogLevel::Error,
                "free",
                "invariant_extent_missing",
                Some(address),
                None,
                "rejected",
                format_args!("offset={offset}"),
                Some(&call_site),
            );
            return Err(FreeError::NotAllocated { address, call_site });
        };

        match self.stats.active_size.checked_sub(record.size as u64) {
            Some(next) => self.stats.active_size = next,
            None => {
                self.stats.active_size = 0;
                self.record_lifecycle(
                    AllocatorLogLevel::Error,
                    "free",
                    "invariant_active_size_underflow",
                    Some(address),
                    Some(record.size),
                    "recovered",
                    format_args!("checked_sub_failed"),
                    None,
                );
            }
        }
        match self.stats.nactive.checked_sub(1) {
            Some(next) => self.stats.nactive = next,
            None => {
                self.stats.nactive = 0;
                self.record_lifecycle(
                    AllocatorLogLevel::Error,
                    "free",
                    "invariant_active_count_underflow",
                    Some(address),
                    Some(record.size),
                    "recovered",
                    format_args!("checked_sub_failed"),
                    None,
                );
            }
        }

        let coalesce = self.extents.release(index);
        if coalesce.with_next || coalesce.with_prev {
            let merged = self.extents.get(coalesce.index).copied();
            self.record_lifecycle(
                AllocatorLogLevel::Debug,
                "free",
                "coalesce",
                Some(address),
                merged.map(|e| e.size),
                "merged",
                format_args!("with_next={} with_prev={}", coalesce.with_next, coalesce.with_prev),
                None,
            );
        }
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            "free",
            "free",
            Some(address),
            Some(record.size),
            "success",
            format_args!("allocated_at={}", record.call_site),
            Some(&call_site),
        );
        Ok(())
    }

    fn classify_invalid_free(&self, address: usize, call_site: CallSite) -> FreeError {
        if address < self.base || address - self.base >= self.extents.capacity() {
            return FreeError::OutsideHeap { address, call_site };
        }
        if let Some(owner) = self.registry.containing(address) {
            return FreeError::InteriorPointer {
                address,
                block_start: owner.address,
                block_size: owner.size,
                offset: address - owner.address,
                allocated_at: owner.call_site.clone(),
                call_site,
            };
        }
        if self.registry.was_freed(address) {
            return FreeError::DoubleFree { address, call_site };
        }
        FreeError::NotAllocated { address, call_site }
    }

    /// Allocates room for `count` objects of `size` bytes each.
    ///
    /// Returns `None` on multiplication overflow (counted as a failure of the
    /// intended byte count, saturated to `u64::MAX`) or when `malloc` fails.
    ///
    /// This model owns no bytes; the caller that owns the arena must zero
    /// the returned range.
    pub fn calloc(&mut self, count: usize, size: usize, call_site: CallSite) -> Option<usize> {
        let Some(total) = count.checked_mul(size) else {
            let intended = (count as u128).saturating_mul(size as u128);
            self.stats
                .record_failure(u64::try_from(intended).unwrap_or(u64::MAX));
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "calloc",
                "calloc_overflow",
                None,
                None,
                "denied",
                format_args!("count={count} size={size}"),
                Some(&call_site),
            );
            return None;
        };
        self.malloc(total, call_site)
    }

    /// Snapshot of the statistics; nothing is reset.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    /// Live allocations in ascending address order.
    #[must_use]
    pub fn leak_report(&self) -> LeakReport {
        LeakReport::new(
            self.registry
                .iter()
                .map(|r| LeakEntry {
                    address: r.address,
                    size: r.size,
                    call_site: r.call_site.clone(),
                })
                .collect(),
        )
    }

    pub fn write_statistics<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.stats)
    }

    pub fn write_leak_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.leak_report())
    }

    /// Prints the statistics to stdout.
    pub fn print_statistics(&self) {
        let _ = self.write_statistics(&mut io::stdout().lock());
    }

    /// Prints one `LEAK CHECK` line per live allocation to stdout.
    pub fn print_leak_report(&self) {
        let _ = self.write_leak_report(&mut io::stdout().lock());
    }

    /// Requested size of the live block at `address`.
    #[must_use]
    pub fn lookup(&self, address: usize) -> Option<usize> {
        self.registry.get(address).map(|r| r.size)
    }

    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.extents.capacity()
    }

    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.extents.free_bytes()
    }

    #[must_use]
    pub fn largest_free_extent(&self) -> usize {
        self.extents.largest_free()
    }

    #[must_use]
    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    /// Freed addresses still remembered for double-free detection.
    #[must_use]
    pub fn freed_address_count(&self) -> usize {
        self.registry.freed_len()
    }

    /// Read-only view of the partition in offset order.
    pub fn extents(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    /// Checks the partition, the registry/extent agreement and the
    /// accounting identity.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.extents.check()?;

        for record in self.registry.iter() {
            let used = self
                .extents
                .position_of(record.address - self.base)
                .and_then(|i| self.extents.get(i))
                .is_some_and(|e| !e.free && e.size == record.size.max(1));
            if !used {
                return Err(InvariantViolation::OrphanRecord {
                    address: record.address,
                });
            }
        }
        if let Some(extent) = self
            .extents
            .iter()
            .find(|e| !e.free && self.registry.get(self.base + e.offset).is_none())
        {
            return Err(InvariantViolation::UnrecordedExtent {
                offset: extent.offset,
            });
        }

        if let Some(address) = self.registry.freed_addresses().find(|&address| {
            self.extents
                .iter()
                .any(|e| !e.free && (e.offset..e.end()).contains(&(address - self.base)))
        }) {
            return Err(InvariantViolation::StaleFreedAddress { address });
        }

        let registry_bytes = self.registry.live_bytes();
        if registry_bytes != self.stats.active_size {
            return Err(InvariantViolation::ActiveSizeMismatch {
                active_size: self.stats.active_size,
                registry_bytes,
            });
        }
        if self.registry.len() as u64 != self.stats.nactive {
            return Err(InvariantViolation::ActiveCountMismatch {
                nactive: self.stats.nactive,
                records: self.registry.len(),
            });
        }
        Ok(())
    }

    /// Lifecycle records currently held, oldest first.
    pub fn lifecycle_logs(&self) -> impl Iterator<Item = &AllocatorLogRecord> {
        self.lifecycle_logs.iter()
    }

    /// Drains allocator lifecycle log records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<AllocatorLogRecord> {
        self.lifecycle_logs.drain(..).collect()
    }
}
