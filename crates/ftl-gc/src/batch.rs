//! Oneshot-sized relocation write batching, shared by GC and migration
//! (spec.md §4.9 "`internal_write` shared by GC/migration"). Mirrors
//! `ftl-core::nand::nand_commit_write_batch`'s chunking: `ftl-gc` cannot
//! depend on `ftl-core` (the dependency runs the other way), so the
//! algorithm is duplicated here rather than imported.

use ftl_geometry::Geometry;
use ftl_timing::{scheduler::NandCmd, Scheduler};
use ftl_types::{CellType, CmdKind, IoType, NandType, Ppa, Tier};

fn nand_type_for(geo: &Geometry, tier: Tier) -> NandType {
    match tier {
        Tier::Pslc => NandType::Slc,
        Tier::Normal => geo.cell_mode(),
    }
}

/// Issues NAND program commands for `pages`, chunked into
/// `pgs_per_oneshot`-sized groups, the way a real relocation write amortizes
/// across a oneshot unit instead of programming one page at a time. Each
/// `(ppa, ready_at)` pair is the destination page and the earliest time its
/// source data is actually available (the max completion of the reads that
/// produced it); a chunk's program command cannot start before every page
/// feeding it is ready. Returns the max completion across every chunk
/// issued, or `0` if `pages` is empty (callers fold this into their own
/// running `max_completion` baseline).
pub(crate) fn commit_relocation_batch(
    geo: &Geometry,
    sched: &mut Scheduler,
    tier: Tier,
    io_type: IoType,
    pages: &[(Ppa, u64)],
) -> u64 {
    if pages.is_empty() {
        return 0;
    }
    let pgs_per_oneshot = match tier {
        Tier::Pslc => geo.pslc_pgs_per_oneshot,
        Tier::Normal => geo.pgs_per_oneshot,
    }
    .max(1);
    let nand_type = nand_type_for(geo, tier);

    let mut max_completion = 0u64;
    let mut chunk_head: Option<Ppa> = None;
    let mut chunk_len: u64 = 0;
    let mut chunk_ready: u64 = 0;
    for (i, &(ppa, ready)) in pages.iter().enumerate() {
        if chunk_head.is_none() {
            chunk_head = Some(ppa);
        }
        chunk_len += 1;
        chunk_ready = chunk_ready.max(ready);
        let is_last = i + 1 == pages.len();
        if chunk_len >= pgs_per_oneshot || is_last {
            let xfer = chunk_len.min(pgs_per_oneshot) * geo.cfg().pg_size;
            let cmd = NandCmd::new(
                CmdKind::Write,
                io_type,
                chunk_head.expect("chunk always starts with a head ppa"),
                nand_type,
                CellType::Lsb,
                xfer,
                chunk_ready,
            );
            let ctime = sched.advance(geo, cmd);
            max_completion = max_completion.max(ctime);
            chunk_head = None;
            chunk_len = 0;
            chunk_ready = 0;
        }
    }
    max_completion
}
