//! Seeded allocation storm.
//!
//! Drives random malloc/calloc/free churn (plus occasional invalid frees)
//! against a `HeapState` and checks the heap's invariants after every step.
//! Identical configurations produce identical runs.

use arenaheap_core::{CallSite, HeapError, HeapState, InvariantViolation, Statistics};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StormError {
    #[error("heap: {0}")]
    Heap(#[from] HeapError),
    #[error("seed {seed} step {step}: {violation}")]
    Invariant {
        seed: u64,
        step: usize,
        violation: InvariantViolation,
    },
    #[error("seed {seed} step {step}: {message}")]
    Accounting {
        seed: u64,
        step: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StormConfig {
    pub seed: u64,
    pub steps: usize,
    pub arena_size: usize,
    /// Maximum simultaneously live blocks.
    pub slots: usize,
    /// Largest single request.
    pub max_size: usize,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_A11C,
            steps: 10_000,
            arena_size: 64 * 1024,
            slots: 64,
            max_size: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StormReport {
    pub seed: u64,
    pub steps: usize,
    pub allocations: u64,
    pub failures: u64,
    pub frees: u64,
    pub rejected_frees: u64,
    pub peak_extents: usize,
    pub final_active: u64,
    pub final_active_size: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub(crate) fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            (self.next_u64() % bound as u64) as usize
        }
    }
}

fn site(step: usize) -> CallSite {
    CallSite::owned("storm", u32::try_from(step).unwrap_or(u32::MAX))
}

fn check_step(
    config: &StormConfig,
    step: usize,
    heap: &HeapState,
    before: &Statistics,
    live: &[Option<(usize, usize)>],
) -> Result<(), StormError> {
    let accounting = |message: String| StormError::Accounting {
        seed: config.seed,
        step,
        message,
    };
    heap.check_invariants()
        .map_err(|violation| StormError::Invariant {
            seed: config.seed,
            step,
            violation,
        })?;

    let after = heap.statistics();
    if after.ntotal < before.ntotal || after.total_size < before.total_size {
        return Err(accounting("cumulative totals decreased".into()));
    }
    if let (Some((lo, hi)), Some((nlo, nhi))) = (before.heap_span(), after.heap_span()) {
        if nlo > lo || nhi < hi {
            return Err(accounting("heap span shrank".into()));
        }
    }
    let count = live.iter().flatten().count() as u64;
    let bytes: u64 = live.iter().flatten().map(|&(_, s)| s as u64).sum();
    if after.nactive != count || after.active_size != bytes {
        return Err(accounting(format!(
            "active {}/{} but harness holds {count}/{bytes}",
            after.nactive, after.active_size
        )));
    }
    Ok(())
}

/// Runs the storm and returns a summary, or the first broken invariant.
pub fn run_storm(config: &StormConfig) -> Result<StormReport, StormError> {
    let mut heap = HeapState::new(config.arena_size)?;
    let mut rng = XorShift64::new(config.seed);
    let mut live: Vec<Option<(usize, usize)>> = vec![None; config.slots.max(1)];
    let mut report = StormReport {
        seed: config.seed,
        steps: config.steps,
        allocations: 0,
        failures: 0,
        frees: 0,
        rejected_frees: 0,
        peak_extents: heap.extent_count(),
        final_active: 0,
        final_active_size: 0,
    };

    for step in 0..config.steps {
        let before = heap.statistics();
        let slot = rng.below(live.len());
        match (rng.below(100), live[slot]) {
            (0..=49, None) => {
                let size = rng.below(config.max_size + 1);
                match heap.malloc(size, site(step)) {
                    Some(address) => {
                        live[slot] = Some((address, size));
                        report.allocations += 1;
                    }
                    None => report.failures += 1,
                }
            }
            (50..=64, None) => {
                let count = rng.below(64);
                let size = rng.below(64);
                match heap.calloc(count, size, site(step)) {
                    Some(address) => {
                        live[slot] = Some((address, count * size));
                        report.allocations += 1;
                    }
                    None => report.failures += 1,
                }
            }
            (65..=69, Some((address, size))) if size > 1 => {
                // Interior pointer: must be rejected without side effects.
                let interior = address + 1 + rng.below(size - 1);
                if heap.free(interior, site(step)).is_ok() {
                    return Err(StormError::Accounting {
                        seed: config.seed,
                        step,
                        message: format!("interior free of {interior:#x} accepted"),
                    });
                }
                report.rejected_frees += 1;
            }
            (_, Some((address, _))) => {
                live[slot] = None;
                heap.free(address, site(step))
                    .map_err(|err| StormError::Accounting {
                        seed: config.seed,
                        step,
                        message: err.to_string(),
                    })?;
                report.frees += 1;
                if rng.below(20) == 0 {
                    // Double free: rejected, counters untouched.
                    if heap.free(address, site(step)).is_ok() {
                        return Err(StormError::Accounting {
                            seed: config.seed,
                            step,
                            message: format!("double free of {address:#x} accepted"),
                        });
                    }
                    report.rejected_frees += 1;
                }
            }
            (_, None) => {}
        }
        report.peak_extents = report.peak_extents.max(heap.extent_count());
        check_step(config, step, &heap, &before, &live)?;
    }

    let stats = heap.statistics();
    report.final_active = stats.nactive;
    report.final_active_size = stats.active_size;
    Ok(report)
}
