//! Intra-tier garbage collection: victim selection, valid-page relocation,
//! and line erasure (spec.md §4.10).

use ftl_geometry::Geometry;
use ftl_l2p::MapTable;
use ftl_lines::{die_coords, wp::WritePointer, Line, LineManager, ReverseMap};
use ftl_proto::telemetry;
use ftl_timing::{scheduler::NandCmd, Scheduler};
use ftl_types::{CellType, CmdKind, IoType, MapGranularity, Ppa, Tier};

fn line_nand_type(line: &Line) -> ftl_types::NandType {
    line.blocks[0].nand_type
}

/// Outcome of one `foreground_gc` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcResult {
    pub pages_reclaimed: u64,
    pub max_completion_ns: u64,
    pub victim_line: Option<u32>,
}

/// Runs one GC cycle on `tier` if `force` or the tier's free-line count is
/// at/under the high-watermark. Selects the lowest-`vpc` victim, reads every
/// valid page, relocates it to a freshly allocated page in the same tier,
/// and erases the victim line. Returns `None` if GC was not due, or the
/// tier has nothing to collect.
#[allow(clippy::too_many_arguments)]
pub fn foreground_gc(
    geo: &Geometry,
    sched: &mut Scheduler,
    lines: &mut LineManager,
    rmap: &mut ReverseMap,
    maptbl: &mut MapTable,
    dest_wp: &mut WritePointer,
    tier: Tier,
    parent_line_id_of: impl Fn(u32) -> u32,
    stime: u64,
    force: bool,
) -> Option<GcResult> {
    if !force && !crate::thresholds::should_gc_high(lines.free_count()) {
        return None;
    }
    let victim_id = lines.pop_victim()?;
    Some(relocate_and_erase(
        geo,
        sched,
        lines,
        rmap,
        maptbl,
        dest_wp,
        tier,
        parent_line_id_of,
        victim_id,
        IoType::GcIo,
        stime,
    ))
}

/// Shared relocation body for GC and (same-tier remainder batching of)
/// migration: walk every page of `victim_id`, relocate the valid ones,
/// erase every block, and return the line to the free list.
#[allow(clippy::too_many_arguments)]
pub fn relocate_and_erase(
    geo: &Geometry,
    sched: &mut Scheduler,
    lines: &mut LineManager,
    rmap: &mut ReverseMap,
    maptbl: &mut MapTable,
    dest_wp: &mut WritePointer,
    tier: Tier,
    parent_line_id_of: impl Fn(u32) -> u32,
    victim_id: u32,
    io_type: IoType,
    stime: u64,
) -> GcResult {
    let blks_per_line = lines.blks_per_line();
    let pgs_per_blk = match tier {
        Tier::Pslc => geo.pgs_per_blk_pslc,
        Tier::Normal => geo.pgs_per_blk_normal,
    } as u16;

    let mut max_completion = stime;
    let mut reclaimed: u64 = 0;
    let nand_type = line_nand_type(lines.line(victim_id));

    let mut to_relocate = Vec::new();
    for blk_idx in 0..blks_per_line {
        for pg in 0..pgs_per_blk {
            if lines.line(victim_id).blocks[blk_idx as usize].status(pg) == ftl_types::PageStatus::Valid {
                let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx as usize);
                let src_ppa = Ppa::new_mapped(ch, lun, pl, victim_id as u16, pg, MapGranularity::Page);
                let pgidx = ftl_lines::ppa_to_pgidx(geo, tier, parent_line_id_of(victim_id), src_ppa);
                let lpn = rmap.get(pgidx);
                to_relocate.push((blk_idx as usize, pg, lpn, src_ppa, pgidx));
            }
        }
    }

    let mut to_write: Vec<(Ppa, u64)> = Vec::new();
    for (blk_idx, pg, lpn, src_ppa, pgidx) in to_relocate {
        let read_cmd = NandCmd::new(
            CmdKind::Read,
            io_type,
            src_ppa,
            nand_type,
            CellType::Lsb,
            geo.cfg().pg_size,
            stime,
        );
        let read_done = sched.advance(geo, read_cmd);
        max_completion = max_completion.max(read_done);

        if !lpn.is_invalid() {
            let alloc = dest_wp.allocate_page(geo, lines).expect("dest tier must have room for GC output");
            let dest_pgidx = ftl_lines::ppa_to_pgidx(geo, tier, alloc.ppa.blk() as u32, alloc.ppa);
            rmap.set(dest_pgidx, lpn);
            maptbl.set(lpn, alloc.ppa);
            to_write.push((alloc.ppa, read_done));

            // A destination line filling mid-relocation already landed on
            // `lines`' full list via `allocate_page`; stamping its
            // `write_order` and enqueuing it in the migration FIFO (pSLC
            // only) is the caller's job since only it holds that queue.
            let _ = alloc.retired;
        } else {
            lines.line_mut(victim_id).dec_rpc();
        }

        lines.line_mut(victim_id).invalidate(blk_idx, pg);
        lines.bump_invalid(victim_id);
        rmap.set(pgidx, ftl_types::INVALID_LPN);
        reclaimed += 1;
    }

    if !to_write.is_empty() {
        let write_done = crate::batch::commit_relocation_batch(geo, sched, tier, io_type, &to_write);
        max_completion = max_completion.max(write_done);
    }

    lines.remove_from_full(victim_id);
    for blk_idx in 0..blks_per_line {
        let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx as usize);
        let erase_ppa = Ppa::new_mapped(ch, lun, pl, victim_id as u16, 0, MapGranularity::Page);
        let erase_cmd = NandCmd::new(
            CmdKind::Erase,
            io_type,
            erase_ppa,
            nand_type,
            CellType::Lsb,
            0,
            max_completion,
        );
        let erase_done = sched.advance(geo, erase_cmd);
        max_completion = max_completion.max(erase_done);
    }
    lines.mark_line_free(victim_id);

    telemetry::GC_COUNT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    telemetry::GC_PAGES_RECLAIMED.fetch_add(reclaimed, std::sync::atomic::Ordering::Relaxed);

    tracing::debug!(target: "ftl_gc::gc", victim_id, reclaimed, tier = ?tier, "gc cycle complete");

    GcResult {
        pages_reclaimed: reclaimed,
        max_completion_ns: max_completion,
        victim_line: Some(victim_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::Tier;

    fn geo() -> Geometry {
        let cfg: ftl_geometry::GeometryConfig =
            toml::from_str(include_str!("../../ftl-geometry/tests/fixtures/sample_geometry.toml"))
                .unwrap();
        Geometry::build(cfg).unwrap()
    }

    #[test]
    fn gc_skips_when_not_due_and_not_forced() {
        let geo = geo();
        let mut sched = Scheduler::new(&geo);
        let mut lines = LineManager::new(&geo, Tier::Normal, 8, false);
        let mut rmap = ReverseMap::new(lines.pgs_per_line() * 8);
        let mut maptbl = MapTable::new(geo.total_lpns());
        let mut wp = WritePointer::new(Tier::Normal);

        let result = foreground_gc(&geo, &mut sched, &mut lines, &mut rmap, &mut maptbl, &mut wp, Tier::Normal, |id| id, 0, false);
        assert!(result.is_none(), "8 free lines is well above the high watermark");
    }
}
