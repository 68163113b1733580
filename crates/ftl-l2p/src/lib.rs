//! Multi-granularity logical-to-physical mapping and its slotted LRU cache
//! (spec.md §4.5). `map_read`'s NAND-issuing side (walking granularities
//! coarse→fine through the scheduler) lives in `ftl-core`, which owns both
//! the scheduler and this crate's [`MapTable`]/[`L2pCache`].

pub mod cache;
pub mod maptbl;

pub use cache::{InsertOutcome, L2pCache};
pub use maptbl::{start_lpn, MapTable, GRANULARITY_SCAN_ORDER};

use ftl_types::{Lpn, MapGranularity, Ppa};

/// Bundles the flat map and its cache for one namespace. A cache hit avoids
/// touching `MapTable` entirely (the mapping is already known); a miss falls
/// through to `MapTable` and the caller (`ftl-core`) is responsible for
/// issuing the NAND map-reads spec.md §4.5 describes before calling
/// [`L2pManager::install`].
pub struct L2pManager {
    pub maptbl: MapTable,
    pub cache: L2pCache,
}

impl L2pManager {
    pub fn new(total_lpns: u64, num_slots: u32, slot_size: u32) -> Self {
        L2pManager {
            maptbl: MapTable::new(total_lpns),
            cache: L2pCache::new(num_slots, slot_size),
        }
    }

    /// Cache hit path: returns the PPA straight from `maptbl` (the cache
    /// only ever records that *some* granularity is resolved for this LPN;
    /// the PPA itself always lives in `maptbl`) plus the resolved
    /// granularity, and records a hit.
    pub fn lookup(&mut self, lpn: Lpn) -> Option<(Ppa, MapGranularity)> {
        let (gran, _resident) = self.cache.lookup(lpn)?;
        ftl_proto::telemetry::L2P_CACHE_HITS.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Some((self.maptbl.get(lpn), gran))
    }

    /// Records a cache miss (spec.md: "Charge `l2p_misses` once per miss").
    pub fn record_miss(&self) {
        ftl_proto::telemetry::L2P_CACHE_MISSES.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Installs a resolved mapping after a NAND map-read resolved it:
    /// writes `ppa` into `maptbl` at `lpn` and inserts/updates the cache
    /// entry. `resident` should be set by the caller per spec.md §4.5 (true
    /// only for zoned+hybrid-map entries at non-page granularity).
    pub fn install(&mut self, lpn: Lpn, ppa: Ppa, granularity: MapGranularity, resident: bool) -> InsertOutcome {
        self.maptbl.set(lpn, ppa);
        self.cache.insert(lpn, granularity, resident)
    }

    pub fn set_map_gran(&mut self, lpn: Lpn, granularity: MapGranularity, resident: bool) {
        let mut ppa = self.maptbl.get(lpn);
        ppa = ppa.with_map_gran(granularity);
        self.maptbl.set(lpn, ppa);
        self.cache.set_map_gran(lpn, granularity, resident);
    }
}
