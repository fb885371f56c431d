//! Allocation statistics and leak reporting.

use std::fmt;

use super::call_site::CallSite;

/// Snapshot of the allocator's cumulative counters.
///
/// `ntotal`/`total_size` never decrease. `heap_min`/`heap_max` span every
/// byte ever handed out and never shrink; before the first allocation the
/// span is empty (`heap_min == usize::MAX`, `heap_max == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Number of live allocations.
    pub nactive: u64,
    /// Number of successful allocations ever made.
    pub ntotal: u64,
    /// Number of failed allocation requests.
    pub nfail: u64,
    /// Bytes in live allocations.
    pub active_size: u64,
    /// Bytes ever allocated.
    pub total_size: u64,
    /// Bytes in failed allocation requests.
    pub fail_size: u64,
    /// Lowest address ever returned.
    pub heap_min: usize,
    /// Highest byte address ever returned.
    pub heap_max: usize,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            nactive: 0,
            ntotal: 0,
            nfail: 0,
            active_size: 0,
            total_size: 0,
            fail_size: 0,
            heap_min: usize::MAX,
            heap_max: 0,
        }
    }
}

impl Statistics {
    /// Inclusive `(min, max)` address span, or `None` before any allocation.
    #[must_use]
    pub fn heap_span(&self) -> Option<(usize, usize)> {
        (self.heap_min <= self.heap_max).then_some((self.heap_min, self.heap_max))
    }

    /// `reserved` is the extent length actually consumed (at least 1).
    pub(crate) fn record_allocation(&mut self, address: usize, size: usize, reserved: usize) {
        self.ntotal += 1;
        self.nactive += 1;
        self.active_size += size as u64;
        self.total_size = self.total_size.saturating_add(size as u64);
        self.heap_min = self.heap_min.min(address);
        self.heap_max = self.heap_max.max(address + reserved - 1);
    }

    pub(crate) fn record_failure(&mut self, bytes: u64) {
        self.nfail += 1;
        self.fail_size = self.fail_size.saturating_add(bytes);
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "alloc count: active {:>10}   total {:>10}   fail {:>10}",
            self.nactive, self.ntotal, self.nfail
        )?;
        writeln!(
            f,
            "alloc size:  active {:>10}   total {:>10}   fail {:>10}",
            self.active_size, self.total_size, self.fail_size
        )
    }
}

/// One live allocation at report time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakEntry {
    pub address: usize,
    pub size: usize,
    pub call_site: CallSite,
}

impl fmt::Display for LeakEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEAK CHECK: {}: allocated object {:#x} with size {}",
            self.call_site, self.address, self.size
        )
    }
}

/// Every allocation still live when the report was taken, in ascending
/// address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    entries: Vec<LeakEntry>,
}

impl LeakReport {
    pub(crate) fn new(entries: Vec<LeakEntry>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].address < w[1].address));
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[LeakEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of leaked sizes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size as u64).sum()
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl IntoIterator for LeakReport {
    type Item = LeakEntry;
    type IntoIter = std::vec::IntoIter<LeakEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
