//! Allocation registry.
//!
//! Maps each live address to its requested size and call site. Records are
//! kept in a `BTreeMap` so leak reports come out in ascending address order
//! and interior pointers can be matched to their owning block.

use std::collections::{BTreeMap, BTreeSet};

use super::call_site::CallSite;

/// A live allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Address returned to the caller.
    pub address: usize,
    /// Size requested by the caller (may be 0).
    pub size: usize,
    /// Where the allocation was requested.
    pub call_site: CallSite,
}

/// Live allocations keyed by address.
#[derive(Debug, Clone, Default)]
pub struct AllocationRegistry {
    live: BTreeMap<usize, AllocationRecord>,
    /// Freed addresses not covered by any allocation since; distinguishes a
    /// double free from a wild pointer. Every entry lies in free space.
    recently_freed: BTreeSet<usize>,
}

impl AllocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new allocation and forgets every freed address inside the
    /// bytes it reserves (`size`, at least 1).
    pub fn insert(&mut self, record: AllocationRecord) {
        let end = record.address.saturating_add(record.size.max(1));
        let mut covered = self.recently_freed.split_off(&record.address);
        let mut above = covered.split_off(&end);
        self.recently_freed.append(&mut above);
        self.live.insert(record.address, record);
    }

    /// Removes the record for `address`, remembering it as freed.
    pub fn remove(&mut self, address: usize) -> Option<AllocationRecord> {
        let record = self.live.remove(&address)?;
        self.recently_freed.insert(address);
        Some(record)
    }

    #[must_use]
    pub fn get(&self, address: usize) -> Option<&AllocationRecord> {
        self.live.get(&address)
    }

    /// The live block that contains `address` strictly after its first byte.
    #[must_use]
    pub fn containing(&self, address: usize) -> Option<&AllocationRecord> {
        let (_, record) = self.live.range(..address).next_back()?;
        (address - record.address < record.size).then_some(record)
    }

    /// Whether `address` was freed and has not been returned by an allocation since.
    #[must_use]
    pub fn was_freed(&self, address: usize) -> bool {
        self.recently_freed.contains(&address)
    }

    /// Freed addresses still remembered, ascending.
    pub fn freed_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.recently_freed.iter().copied()
    }

    #[must_use]
    pub fn freed_len(&self) -> usize {
        self.recently_freed.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live records in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.live.values()
    }

    /// Sum of requested sizes across live records.
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.live.values().map(|r| r.size as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: usize, size: usize) -> AllocationRecord {
        AllocationRecord {
            address,
            size,
            call_site: CallSite::new("registry.rs", address as u32),
        }
    }

    #[test]
    fn remove_marks_address_as_freed_until_reused() {
        let mut registry = AllocationRegistry::new();
        registry.insert(record(0x1000, 16));
        assert!(!registry.was_freed(0x1000));

        let removed = registry.remove(0x1000).unwrap();
        assert_eq!(removed.size, 16);
        assert!(registry.was_freed(0x1000));
        assert!(registry.remove(0x1000).is_none());

        registry.insert(record(0x1000, 8));
        assert!(!registry.was_freed(0x1000));
    }

    #[test]
    fn insert_forgets_freed_addresses_it_covers() {
        let mut registry = AllocationRegistry::new();
        for address in [0x1000, 0x1008, 0x1010, 0x1018] {
            registry.insert(record(address, 8));
        }
        for address in [0x1000, 0x1008, 0x1010, 0x1018] {
            registry.remove(address).unwrap();
        }
        assert_eq!(registry.freed_len(), 4);

        // A block starting elsewhere still overwrites the starts it spans.
        registry.insert(record(0x1004, 16));
        assert_eq!(registry.freed_addresses().collect::<Vec<_>>(), vec![0x1000, 0x1018]);
        assert!(!registry.was_freed(0x1008));

        // Zero-sized records reserve one byte.
        registry.insert(record(0x1018, 0));
        assert_eq!(registry.freed_addresses().collect::<Vec<_>>(), vec![0x1000]);
    }

    #[test]
    fn containing_matches_interior_addresses_only() {
        let mut registry = AllocationRegistry::new();
        registry.insert(record(0x1000, 16));
        registry.insert(record(0x1010, 0));

        assert!(registry.containing(0x1000).is_none());
        assert_eq!(registry.containing(0x1001).map(|r| r.address), Some(0x1000));
        assert_eq!(registry.containing(0x100f).map(|r| r.address), Some(0x1000));
        // Zero-sized records have no interior.
        assert!(registry.containing(0x1011).is_none());
        assert!(registry.containing(0x0fff).is_none());
    }

    #[test]
    fn iteration_is_address_ordered() {
        let mut registry = AllocationRegistry::new();
        for address in [0x3000, 0x1000, 0x2000] {
            registry.insert(record(address, 4));
        }
        let order: Vec<usize> = registry.iter().map(|r| r.address).collect();
        assert_eq!(order, vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(registry.live_bytes(), 12);
        assert_eq!(registry.len(), 3);
    }
}
