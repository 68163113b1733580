//! Property test for spec.md §8 invariant 8 (L2P cache slot cap): a slot
//! never holds more than `slot_size` entries, and a resident entry is never
//! the one an eviction picks as its victim.

use ftl_l2p::{InsertOutcome, L2pCache};
use ftl_types::{Lpn, MapGranularity};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #[test]
    fn slot_cap_holds_and_resident_entries_survive_eviction(
        slot_size in 1u32..8,
        ops in prop::collection::vec((0u64..64, any::<bool>()), 1..40),
    ) {
        let mut cache = L2pCache::new(1, slot_size);
        let mut resident: HashSet<u64> = HashSet::new();

        for (lpn_val, is_resident) in ops {
            let lpn = Lpn(lpn_val);
            let outcome = cache.insert(lpn, MapGranularity::Page, is_resident);
            match outcome {
                InsertOutcome::Inserted => {
                    if is_resident {
                        resident.insert(lpn_val);
                    } else {
                        resident.remove(&lpn_val);
                    }
                }
                InsertOutcome::Evicted(evicted) => {
                    prop_assert!(!resident.contains(&evicted.0), "a resident entry was evicted");
                    if is_resident {
                        resident.insert(lpn_val);
                    } else {
                        resident.remove(&lpn_val);
                    }
                }
                InsertOutcome::Failed => {}
            }
            prop_assert!(cache.slot_len(Lpn(0)) <= slot_size as usize);
        }
    }
}
