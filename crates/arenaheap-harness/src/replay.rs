//! Trace replay against a fresh `HeapState`.

use std::collections::HashMap;

use arenaheap_core::{FreeError, HeapOptions, HeapState};

use crate::trace::{Trace, TraceError, TraceOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Arena size when the trace does not name one.
    pub default_arena_size: usize,
    pub log_capacity: usize,
    /// Stop at the first invalid free, as the strict C boundary would.
    pub stop_on_invalid_free: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            default_arena_size: 1 << 20,
            log_capacity: 0,
            stop_on_invalid_free: false,
        }
    }
}

#[derive(Debug)]
pub struct ReplayOutcome {
    /// Heap after the last replayed op.
    pub heap: HeapState,
    /// `(op index, error)` for every rejected free.
    pub invalid_frees: Vec<(usize, FreeError)>,
    /// Ids whose allocation returned null.
    pub failed_ids: Vec<String>,
    /// Index of the op replay stopped at, if it did not run to the end.
    pub stopped_at: Option<usize>,
}

impl ReplayOutcome {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.invalid_frees.is_empty() && self.heap.statistics().nactive == 0
    }
}

#[derive(Default)]
struct Ids {
    // `None` records an allocation that failed; freeing it is `free(NULL)`.
    live: HashMap<String, Option<usize>>,
    retired: HashMap<String, usize>,
}

impl Ids {
    fn bind(&mut self, index: usize, id: &str, address: Option<usize>) -> Result<(), TraceError> {
        if self.live.contains_key(id) {
            return Err(TraceError::DuplicateId {
                index,
                id: id.to_string(),
            });
        }
        self.retired.remove(id);
        self.live.insert(id.to_string(), address);
        Ok(())
    }

    fn release(&mut self, index: usize, id: &str) -> Result<usize, TraceError> {
        if let Some(address) = self.live.remove(id) {
            let address = address.unwrap_or(0);
            if address != 0 {
                self.retired.insert(id.to_string(), address);
            }
            return Ok(address);
        }
        // A retired id replays as a double free of its old address.
        self.retired
            .get(id)
            .copied()
            .ok_or_else(|| TraceError::UnknownId {
                index,
                id: id.to_string(),
            })
    }
}

/// Replays `trace` op by op.
pub fn replay(trace: &Trace, options: &ReplayOptions) -> Result<ReplayOutcome, TraceError> {
    let capacity = trace.arena_size.unwrap_or(options.default_arena_size);
    let mut heap = HeapState::with_options(
        arenaheap_core::malloc::DEFAULT_BASE,
        capacity,
        HeapOptions {
            log_capacity: options.log_capacity,
        },
    )?;
    let mut ids = Ids::default();
    let mut invalid_frees = Vec::new();
    let mut failed_ids = Vec::new();
    let mut stopped_at = None;

    for (index, op) in trace.ops.iter().enumerate() {
        let site = op.site().call_site(index);
        let freed = match op {
            TraceOp::Malloc { id, size, .. } => {
                let address = heap.malloc(*size, site);
                if address.is_none() {
                    failed_ids.push(id.clone());
                }
                ids.bind(index, id, address)?;
                continue;
            }
            TraceOp::Calloc {
                id, count, size, ..
            } => {
                let address = heap.calloc(*count, *size, site);
                if address.is_none() {
                    failed_ids.push(id.clone());
                }
                ids.bind(index, id, address)?;
                continue;
            }
            TraceOp::Free { id, .. } => {
                let address = ids.release(index, id)?;
                heap.free(address, site)
            }
            TraceOp::FreeAddress { address, .. } => heap.free(*address, site),
        };
        if let Err(err) = freed {
            invalid_frees.push((index, err));
            if options.stop_on_invalid_free {
                stopped_at = Some(index);
                break;
            }
        }
    }

    Ok(ReplayOutcome {
        heap,
        invalid_frees,
        failed_ids,
        stopped_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(json: &str) -> Trace {
        Trace::from_json(json).unwrap()
    }

    #[test]
    fn balanced_trace_is_clean() {
        let t = trace(
            r#"{"ops": [
                {"op": "malloc", "id": "a", "size": 10},
                {"op": "calloc", "id": "b", "count": 3, "size": 5},
                {"op": "free", "id": "b"},
                {"op": "free", "id": "a"}
            ]}"#,
        );
        let outcome = replay(&t, &ReplayOptions::default()).unwrap();
        assert!(outcome.is_clean());
        let stats = outcome.heap.statistics();
        assert_eq!(stats.ntotal, 2);
        assert_eq!(stats.total_size, 25);
        assert_eq!(outcome.heap.extent_count(), 1);
    }

    #[test]
    fn freeing_a_retired_id_is_a_double_free() {
        let t = trace(
            r#"{"ops": [
                {"op": "malloc", "id": "a", "size": 10},
                {"op": "free", "id": "a"},
                {"op": "free", "id": "a", "file": "df.c", "line": 7}
            ]}"#,
        );
        let outcome = replay(&t, &ReplayOptions::default()).unwrap();
        assert_eq!(outcome.invalid_frees.len(), 1);
        let (index, err) = &outcome.invalid_frees[0];
        assert_eq!(*index, 2);
        assert!(err.is_double_free());
        assert_eq!(err.call_site().to_string(), "df.c:7");
    }

    #[test]
    fn strict_replay_stops_at_first_invalid_free() {
        let t = trace(
            r#"{"arena_size": 256, "ops": [
                {"op": "malloc", "id": "a", "size": 10},
                {"op": "free_address", "address": 4101},
                {"op": "free", "id": "a"}
            ]}"#,
        );
        let options = ReplayOptions {
            stop_on_invalid_free: true,
            ..ReplayOptions::default()
        };
        let outcome = replay(&t, &options).unwrap();
        assert_eq!(outcome.stopped_at, Some(1));
        assert!(matches!(
            outcome.invalid_frees[0].1,
            FreeError::InteriorPointer { offset: 5, .. }
        ));
        assert_eq!(outcome.heap.statistics().nactive, 1);
    }

    #[test]
    fn failed_allocation_frees_as_null() {
        let t = trace(
            r#"{"arena_size": 64, "ops": [
                {"op": "malloc", "id": "big", "size": 65},
                {"op": "free", "id": "big"}
            ]}"#,
        );
        let outcome = replay(&t, &ReplayOptions::default()).unwrap();
        assert_eq!(outcome.failed_ids, vec!["big".to_string()]);
        assert!(outcome.invalid_frees.is_empty());
        assert_eq!(outcome.heap.statistics().nfail, 1);
    }

    #[test]
    fn id_errors_abort_replay() {
        let unknown = trace(r#"{"ops": [{"op": "free", "id": "ghost"}]}"#);
        assert!(matches!(
            replay(&unknown, &ReplayOptions::default()),
            Err(TraceError::UnknownId { index: 0, .. })
        ));

        let duplicate = trace(
            r#"{"ops": [
                {"op": "malloc", "id": "a", "size": 1},
                {"op": "malloc", "id": "a", "size": 1}
            ]}"#,
        );
        assert!(matches!(
            replay(&duplicate, &ReplayOptions::default()),
            Err(TraceError::DuplicateId { index: 1, .. })
        ));
    }
}
