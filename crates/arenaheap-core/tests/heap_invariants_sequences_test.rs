use arenaheap_core::{CallSite, FreeError, HeapState, Statistics};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

fn site(step: usize) -> CallSite {
    CallSite::new("heap_invariants_sequences_test.rs", step as u32)
}

fn assert_monotone(prev: &Statistics, next: &Statistics, seed: u64, step: usize) {
    assert!(next.ntotal >= prev.ntotal, "seed={seed} step={step}: ntotal decreased");
    assert!(
        next.total_size >= prev.total_size,
        "seed={seed} step={step}: total_size decreased"
    );
    assert!(next.nfail >= prev.nfail, "seed={seed} step={step}: nfail decreased");
    if let Some((lo, hi)) = prev.heap_span() {
        let (nlo, nhi) = next.heap_span().expect("span never empties");
        assert!(nlo <= lo && nhi >= hi, "seed={seed} step={step}: heap span shrank");
    }
}

#[test]
fn deterministic_sequences_hold_partition_and_accounting_invariants() {
    // Invariant pressure on a small arena so exhaustion and coalescing both
    // happen often.
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 3_000;
    const SLOTS: usize = 48;
    const ARENA: usize = 16 * 1024;

    for seed in SEEDS {
        let mut heap = HeapState::new(ARENA).unwrap();
        let mut rng = XorShift64::new(seed);
        let mut slots: [Option<(usize, usize)>; SLOTS] = [None; SLOTS];

        for step in 0..STEPS {
            let before = heap.statistics();
            let op = rng.gen_range_usize(0, 99);
            let idx = rng.gen_range_usize(0, SLOTS - 1);

            match op {
                0..=44 => {
                    if slots[idx].is_some() {
                        continue;
                    }
                    let size = rng.gen_range_usize(0, 1024);
                    match heap.malloc(size, site(step)) {
                        Some(ptr) => {
                            slots[idx] = Some((ptr, size));
                            let after = heap.statistics();
                            assert_eq!(after.ntotal, before.ntotal + 1);
                            assert_eq!(after.total_size, before.total_size + size as u64);
                        }
                        None => {
                            let after = heap.statistics();
                            assert_eq!(after.nfail, before.nfail + 1);
                            assert_eq!(after.fail_size, before.fail_size + size as u64);
                            assert_eq!(after.ntotal, before.ntotal);
                            assert!(heap.largest_free_extent() < size.max(1));
                        }
                    }
                }
                45..=59 => {
                    if slots[idx].is_some() {
                        continue;
                    }
                    let count = rng.gen_range_usize(0, 32);
                    let size = rng.gen_range_usize(0, 32);
                    if let Some(ptr) = heap.calloc(count, size, site(step)) {
                        slots[idx] = Some((ptr, count * size));
                    }
                }
                _ => {
                    if let Some((ptr, size)) = slots[idx].take() {
                        assert_eq!(heap.lookup(ptr), Some(size), "seed={seed} step={step}");
                        heap.free(ptr, site(step)).unwrap();
                        // No free-free adjacency right after a free.
                        let extents: Vec<_> = heap.extents().copied().collect();
                        assert!(
                            extents.windows(2).all(|w| !(w[0].free && w[1].free)),
                            "seed={seed} step={step}: adjacent free extents"
                        );
                    }
                }
            }

            let after = heap.statistics();
            assert_monotone(&before, &after, seed, step);

            let total: usize = heap.extents().map(|e| e.size).sum();
            assert_eq!(total, ARENA, "seed={seed} step={step}: partition broken");

            let live: Vec<(usize, usize)> = slots.iter().flatten().copied().collect();
            let live_bytes: u64 = live.iter().map(|&(_, s)| s as u64).sum();
            assert_eq!(after.nactive, live.len() as u64);
            assert_eq!(after.active_size, live_bytes);

            if let Err(violation) = heap.check_invariants() {
                panic!("seed={seed} step={step}: {violation}");
            }
        }

        for (ptr, _) in slots.iter().flatten() {
            heap.free(*ptr, site(STEPS)).unwrap();
        }
        assert_eq!(heap.extent_count(), 1, "seed={seed}: arena must fully coalesce");
        assert_eq!(heap.free_bytes(), ARENA);
    }
}

#[test]
fn double_free_never_double_decrements() {
    let mut heap = HeapState::new(4096).unwrap();
    let keep = heap.malloc(10, site(1)).unwrap();
    let p = heap.malloc(20, site(2)).unwrap();
    heap.free(p, site(3)).unwrap();

    let before = heap.statistics();
    let err = heap.free(p, site(4)).unwrap_err();
    assert!(matches!(err, FreeError::DoubleFree { address, .. } if address == p));
    assert_eq!(heap.statistics(), before);
    assert_eq!(heap.statistics().nactive, 1);
    assert_eq!(heap.statistics().active_size, 10);
    assert_eq!(heap.lookup(keep), Some(10));
}

#[test]
fn overflowing_calloc_leaves_heap_span_unchanged() {
    let mut heap = HeapState::new(4096).unwrap();
    heap.malloc(16, site(1)).unwrap();
    let before = heap.statistics();

    assert!(heap.calloc(usize::MAX / 2 + 1, 2, site(2)).is_none());
    assert!(heap.calloc(2, usize::MAX, site(3)).is_none());

    let after = heap.statistics();
    assert_eq!(after.heap_min, before.heap_min);
    assert_eq!(after.heap_max, before.heap_max);
    assert_eq!(after.nfail, before.nfail + 2);
    assert_eq!(after.ntotal, before.ntotal);
    assert!(heap.check_invariants().is_ok());
}

#[test]
fn zero_sized_calloc_behaves_like_zero_malloc() {
    let mut heap = HeapState::new(4096).unwrap();
    let a = heap.calloc(0, 100, site(1)).unwrap();
    let b = heap.calloc(100, 0, site(2)).unwrap();
    assert_ne!(a, b);
    assert_eq!(heap.lookup(a), Some(0));
    assert_eq!(heap.statistics().active_size, 0);
    heap.free(a, site(3)).unwrap();
    heap.free(b, site(4)).unwrap();
    assert_eq!(heap.extent_count(), 1);
}

#[test]
fn fragmentation_blocks_large_request_until_coalesced() {
    let mut heap = HeapState::new(1000).unwrap();
    let blocks: Vec<usize> = (0..10).map(|i| heap.malloc(100, site(i)).unwrap()).collect();
    for ptr in blocks.iter().step_by(2) {
        heap.free(*ptr, site(20)).unwrap();
    }
    assert_eq!(heap.free_bytes(), 500);
    assert!(heap.malloc(200, site(30)).is_none());

    heap.free(blocks[1], site(31)).unwrap();
    assert_eq!(heap.largest_free_extent(), 300);
    assert_eq!(heap.malloc(200, site(32)), Some(blocks[0]));
    assert!(heap.check_invariants().is_ok());
}

#[test]
fn freed_address_tracking_stays_bounded_when_starts_shift() {
    const ROUNDS: usize = 20_000;
    let mut heap = HeapState::new(64 * 1024).unwrap();

    for round in 0..ROUNDS {
        let pad = 1 + (round * 37) % 100;
        let a = heap.malloc(pad, site(round)).unwrap();
        let b = heap.malloc(8, site(round)).unwrap();
        heap.free(b, site(round)).unwrap();
        heap.free(a, site(round)).unwrap();
        // Double frees stay detectable after both blocks coalesced.
        assert!(heap.free(b, site(round)).unwrap_err().is_double_free());
    }

    assert_eq!(heap.statistics().nactive, 0);
    // Only starts inside the first 108 bytes were ever freed.
    assert!(
        heap.freed_address_count() <= 108,
        "freed set grew to {}",
        heap.freed_address_count()
    );
    heap.check_invariants().unwrap();

    // One allocation spanning the churned bytes clears the lot.
    let all = heap.malloc(128, site(ROUNDS)).unwrap();
    assert_eq!(all, 0x1000);
    assert_eq!(heap.freed_address_count(), 0);
}
