#![no_main]
use arenaheap_core::{CallSite, HeapState};
use libfuzzer_sys::fuzz_target;

const ARENA: usize = 16 * 1024;

fuzz_target!(|data: &[u8]| {
    // Each 4-byte chunk is one op: [kind, size lo, size hi, slot].
    if data.len() < 4 {
        return;
    }

    let Ok(mut heap) = HeapState::new(ARENA) else {
        return;
    };
    let mut live: Vec<(usize, usize)> = Vec::new();

    for (step, chunk) in data.chunks_exact(4).enumerate() {
        let site = CallSite::owned("fuzz_malloc", step as u32);
        let size = u16::from_le_bytes([chunk[1], chunk[2]]) as usize;
        let slot = chunk[3] as usize;

        match chunk[0] % 5 {
            0 => {
                if let Some(p) = heap.malloc(size, site) {
                    live.push((p, size));
                }
            }
            1 => {
                let count = (size >> 8).max(1);
                let each = size & 0xff;
                if let Some(p) = heap.calloc(count, each, site) {
                    live.push((p, count * each));
                }
            }
            2 => {
                if !live.is_empty() {
                    let (p, _) = live.swap_remove(slot % live.len());
                    heap.free(p, site).unwrap();
                    // Freeing again must be rejected.
                    assert!(heap.free(p, CallSite::owned("fuzz_malloc", 0)).is_err());
                }
            }
            3 => {
                // Arbitrary address: either a live block start or rejected.
                let address = heap.base() + size;
                let expected = live.iter().position(|&(p, _)| p == address);
                match (heap.free(address, site), expected) {
                    (Ok(()), Some(i)) => {
                        live.swap_remove(i);
                    }
                    (Err(_), None) => {}
                    (result, expected) => {
                        panic!("free({address:#x}) = {result:?} but live index {expected:?}")
                    }
                }
            }
            _ => {
                if let Some(&(p, size)) = live.get(slot % live.len().max(1)) {
                    assert_eq!(heap.lookup(p), Some(size));
                }
            }
        }

        if let Err(violation) = heap.check_invariants() {
            panic!("step {step}: {violation}");
        }
        let stats = heap.statistics();
        assert_eq!(stats.nactive, live.len() as u64);
        assert_eq!(
            stats.active_size,
            live.iter().map(|&(_, s)| s as u64).sum::<u64>()
        );
    }

    for (p, _) in live {
        heap.free(p, CallSite::unknown()).unwrap();
    }
    assert_eq!(heap.extent_count(), 1);
});
