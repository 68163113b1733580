//! One tier's (pSLC or normal) line bookkeeping plus the write pointers and
//! credit budget that draw from it (spec.md §3, §4.4, §4.10).

use ftl_geometry::Geometry;
use ftl_gc::WriteCredits;
use ftl_lines::{LineManager, ReverseMap, WritePointer};
use ftl_types::Tier;

/// Everything one namespace needs to program, read, and reclaim one tier.
/// `user_wp` serves host-originated writes; `gc_wp` is a second cursor
/// reserved for GC/migration output so foreground relocation never contends
/// with the host write pointer for the same line (spec.md §4.10/§4.11 run
/// relocation output through their own allocator).
pub struct TierState {
    pub lines: LineManager,
    pub rmap: ReverseMap,
    pub user_wp: WritePointer,
    pub gc_wp: WritePointer,
    pub credits: WriteCredits,
}

impl TierState {
    pub fn new(geo: &Geometry, tier: Tier, num_lines: u32, initial_credits: i64) -> Self {
        let lines = LineManager::new(geo, tier, num_lines, false);
        let rmap = ReverseMap::new(lines.pgs_per_line() * num_lines as u64);
        TierState {
            lines,
            rmap,
            user_wp: WritePointer::new(tier),
            gc_wp: WritePointer::new(tier),
            credits: WriteCredits::new(initial_credits),
        }
    }
}
