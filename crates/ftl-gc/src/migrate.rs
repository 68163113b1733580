//! pSLC→normal migration (spec.md §4.11): drains the oldest full pSLC line
//! off [`ftl_lines::MigrationQueue`], relocates every still-valid page into
//! the normal tier, and erases the line back to the pSLC free list.
//!
//! Source and destination are different tiers (and therefore different
//! [`LineManager`] instances), unlike same-tier `foreground_gc` — so this
//! walks its own relocation loop rather than reusing `gc::relocate_and_erase`.

use ftl_geometry::Geometry;
use ftl_l2p::MapTable;
use ftl_lines::{die_coords, wp::WritePointer, LineManager, MigrationQueue, ReverseMap};
use ftl_proto::telemetry;
use ftl_timing::{scheduler::NandCmd, Scheduler};
use ftl_types::{CellType, CmdKind, IoType, Lpn, MapGranularity, Ppa, Tier};

/// Outcome of one `do_migrate` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateResult {
    pub pages_migrated: u64,
    pub max_completion_ns: u64,
    pub source_line: u32,
}

/// Runs one migration cycle if `force` or the pSLC tier's free-line count is
/// at/under the low-watermark. Pops the oldest full pSLC line from `queue`,
/// relocates its still-valid pages into the normal tier via `dest_wp`
/// (drawing free lines from `normal_lines`), and erases the pSLC line back
/// to `pslc_lines`' free list. Returns `None` if migration was not due, a
/// LUN still has a migration in flight, or the queue is empty.
///
/// Relocation writes are batched into `pgs_per_oneshot`-sized program
/// commands the same way a oneshot write amortizes (spec.md §4.9); a
/// trailing group too small to fill a normal-tier oneshot unit is written
/// back to pSLC instead via `pslc_dest_wp`, to be picked up again by a later
/// migration cycle once enough has accumulated. Once the source line is
/// erased, every other pSLC line already fully invalidated
/// (`ipc == pgs_per_line`) is swept and erased directly, since it has
/// nothing left worth relocating (spec.md §4.11 step 6).
#[allow(clippy::too_many_arguments)]
pub fn do_migrate(
    geo: &Geometry,
    sched: &mut Scheduler,
    pslc_lines: &mut LineManager,
    pslc_rmap: &mut ReverseMap,
    pslc_dest_wp: &mut WritePointer,
    maptbl: &mut MapTable,
    queue: &mut MigrationQueue,
    dest_wp: &mut WritePointer,
    normal_lines: &mut LineManager,
    normal_rmap: &mut ReverseMap,
    stime: u64,
    force: bool,
) -> Option<MigrateResult> {
    if !force && !crate::thresholds::should_migrate_low(pslc_lines.free_count()) {
        return None;
    }
    if sched.migration_pending(stime) {
        tracing::trace!(target: "ftl_gc::migrate", stime, "skipping migration cycle, a lun still has one in flight");
        return None;
    }
    let source_id = queue.pop()?;

    let blks_per_line = pslc_lines.blks_per_line();
    let pgs_per_blk = geo.pgs_per_blk_pslc as u16;
    let nand_type = pslc_lines.line(source_id).blocks[0].nand_type;

    let mut max_completion = stime;
    let mut migrated: u64 = 0;

    let mut to_relocate = Vec::new();
    for blk_idx in 0..blks_per_line {
        for pg in 0..pgs_per_blk {
            if pslc_lines.line(source_id).blocks[blk_idx].status(pg) == ftl_types::PageStatus::Valid {
                let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
                let src_ppa = Ppa::new_mapped(ch, lun, pl, source_id as u16, pg, MapGranularity::Page);
                let pgidx = ftl_lines::ppa_to_pgidx(geo, Tier::Pslc, source_id, src_ppa);
                let lpn = pslc_rmap.get(pgidx);
                to_relocate.push((blk_idx, pg, lpn, src_ppa, pgidx));
            }
        }
    }

    let mut pending: Vec<(Lpn, u64)> = Vec::new();
    for (blk_idx, pg, lpn, src_ppa, pgidx) in to_relocate {
        let read_cmd = NandCmd::new(
            CmdKind::Read,
            IoType::MigrateIo,
            src_ppa,
            nand_type,
            CellType::Lsb,
            geo.cfg().pg_size,
            stime,
        );
        let read_done = sched.advance(geo, read_cmd);
        max_completion = max_completion.max(read_done);

        if !lpn.is_invalid() {
            pending.push((lpn, read_done));
        } else {
            pslc_lines.line_mut(source_id).dec_rpc();
        }

        pslc_lines.line_mut(source_id).invalidate(blk_idx, pg);
        pslc_lines.bump_invalid(source_id);
        pslc_rmap.set(pgidx, ftl_types::INVALID_LPN);
        migrated += 1;
    }

    // Full oneshot-sized groups land on the normal tier; a trailing group too
    // small to fill one is written back to pSLC (step 4) rather than
    // programming a partial oneshot unit on the destination tier.
    let pgs_per_oneshot_normal = geo.pgs_per_oneshot.max(1);
    let full_len = (pending.len() as u64 / pgs_per_oneshot_normal * pgs_per_oneshot_normal) as usize;
    let (to_normal, to_pslc_remainder) = pending.split_at(full_len);

    let mut to_write_normal: Vec<(Ppa, u64)> = Vec::new();
    for &(lpn, ready) in to_normal {
        let alloc = dest_wp
            .allocate_page(geo, normal_lines)
            .expect("normal tier must have room to receive migrated pages");
        let dest_pgidx = ftl_lines::ppa_to_pgidx(geo, Tier::Normal, alloc.ppa.blk() as u32, alloc.ppa);
        normal_rmap.set(dest_pgidx, lpn);
        maptbl.set(lpn, alloc.ppa);
        to_write_normal.push((alloc.ppa, ready));
    }
    if !to_write_normal.is_empty() {
        let write_done = crate::batch::commit_relocation_batch(geo, sched, Tier::Normal, IoType::MigrateIo, &to_write_normal);
        max_completion = max_completion.max(write_done);
    }

    let mut to_write_pslc: Vec<(Ppa, u64)> = Vec::new();
    for &(lpn, ready) in to_pslc_remainder {
        let alloc = pslc_dest_wp
            .allocate_page(geo, pslc_lines)
            .expect("pslc tier must have room for the migration remainder");
        let dest_pgidx = ftl_lines::ppa_to_pgidx(geo, Tier::Pslc, alloc.ppa.blk() as u32, alloc.ppa);
        pslc_rmap.set(dest_pgidx, lpn);
        maptbl.set(lpn, alloc.ppa);
        to_write_pslc.push((alloc.ppa, ready));
        if let Some(retired) = alloc.retired {
            if retired.became_full {
                let order = queue.push(retired.line_id);
                pslc_lines.line_mut(retired.line_id).write_order = Some(order);
            }
        }
    }
    if !to_write_pslc.is_empty() {
        let write_done = crate::batch::commit_relocation_batch(geo, sched, Tier::Pslc, IoType::MigrateIo, &to_write_pslc);
        max_completion = max_completion.max(write_done);
    }

    pslc_lines.remove_from_full(source_id);
    for blk_idx in 0..blks_per_line {
        let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
        let erase_ppa = Ppa::new_mapped(ch, lun, pl, source_id as u16, 0, MapGranularity::Page);
        let erase_cmd = NandCmd::new(
            CmdKind::Erase,
            IoType::MigrateIo,
            erase_ppa,
            nand_type,
            CellType::Lsb,
            0,
            max_completion,
        );
        let erase_done = sched.advance(geo, erase_cmd);
        max_completion = max_completion.max(erase_done);
    }
    pslc_lines.mark_line_free(source_id);

    let pgs_per_line = pslc_lines.pgs_per_line();
    let fully_invalid: Vec<u32> = pslc_lines
        .full_lines()
        .iter()
        .copied()
        .filter(|&id| pslc_lines.line(id).ipc as u64 == pgs_per_line)
        .collect();
    for line_id in fully_invalid {
        pslc_lines.remove_from_full(line_id);
        queue.remove(line_id);
        let sweep_nand_type = pslc_lines.line(line_id).blocks[0].nand_type;
        for blk_idx in 0..blks_per_line {
            let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
            let erase_ppa = Ppa::new_mapped(ch, lun, pl, line_id as u16, 0, MapGranularity::Page);
            let erase_cmd = NandCmd::new(
                CmdKind::Erase,
                IoType::MigrateIo,
                erase_ppa,
                sweep_nand_type,
                CellType::Lsb,
                0,
                max_completion,
            );
            let erase_done = sched.advance(geo, erase_cmd);
            max_completion = max_completion.max(erase_done);
        }
        pslc_lines.mark_line_free(line_id);
    }

    telemetry::MIGRATIONS_TOTAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    telemetry::MIGRATION_PGS.fetch_add(migrated, std::sync::atomic::Ordering::Relaxed);

    tracing::debug!(target: "ftl_gc::migrate", source_id, migrated, "migration cycle complete");

    Some(MigrateResult {
        pages_migrated: migrated,
        max_completion_ns: max_completion,
        source_line: source_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        let cfg: ftl_geometry::GeometryConfig =
            toml::from_str(include_str!("../../ftl-geometry/tests/fixtures/sample_geometry.toml"))
                .unwrap();
        Geometry::build(cfg).unwrap()
    }

    #[test]
    fn migrate_skips_when_not_due_and_not_forced() {
        let geo = geo();
        let mut sched = Scheduler::new(&geo);
        let mut pslc_lines = LineManager::new(&geo, Tier::Pslc, 8, false);
        let mut pslc_rmap = ReverseMap::new(pslc_lines.pgs_per_line() * 8);
        let mut pslc_dest_wp = WritePointer::new(Tier::Pslc);
        let mut maptbl = MapTable::new(geo.total_lpns());
        let mut queue = MigrationQueue::new();
        let mut dest_wp = WritePointer::new(Tier::Normal);
        let mut normal_lines = LineManager::new(&geo, Tier::Normal, 4, false);
        let mut normal_rmap = ReverseMap::new(normal_lines.pgs_per_line() * 4);

        let result = do_migrate(
            &geo,
            &mut sched,
            &mut pslc_lines,
            &mut pslc_rmap,
            &mut pslc_dest_wp,
            &mut maptbl,
            &mut queue,
            &mut dest_wp,
            &mut normal_lines,
            &mut normal_rmap,
            0,
            false,
        );
        assert!(result.is_none(), "8 free pSLC lines is above the low watermark");
    }

    #[test]
    fn migrate_moves_valid_pages_off_pslc_onto_normal_tier() {
        let geo = geo();
        let mut sched = Scheduler::new(&geo);
        let mut pslc_lines = LineManager::new(&geo, Tier::Pslc, 1, false);
        let mut pslc_rmap = ReverseMap::new(pslc_lines.pgs_per_line());
        let mut pslc_dest_wp = WritePointer::new(Tier::Pslc);
        let mut maptbl = MapTable::new(geo.total_lpns());
        let mut queue = MigrationQueue::new();
        let mut dest_wp = WritePointer::new(Tier::Normal);
        let mut normal_lines = LineManager::new(&geo, Tier::Normal, 1, false);
        let mut normal_rmap = ReverseMap::new(normal_lines.pgs_per_line());

        let blks_per_line = pslc_lines.blks_per_line();
        let pgs_per_blk = geo.pgs_per_blk_pslc as u16;
        let mut lpns = Vec::new();
        let mut next_lpn = 0u64;
        for blk_idx in 0..blks_per_line {
            for pg in 0..pgs_per_blk {
                let lpn = ftl_types::Lpn(next_lpn);
                next_lpn += 1;
                pslc_lines.line_mut(0).program(blk_idx, pg);
                let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
                let ppa = Ppa::new_mapped(ch, lun, pl, 0, pg, MapGranularity::Page);
                let pgidx = ftl_lines::ppa_to_pgidx(&geo, Tier::Pslc, 0, ppa);
                pslc_rmap.set(pgidx, lpn);
                maptbl.set(lpn, ppa);
                lpns.push(lpn);
            }
        }
        assert!(pslc_lines.retire_from_write_pointer(0), "every page programmed, line must retire full");
        queue.push(0);

        let result = do_migrate(
            &geo,
            &mut sched,
            &mut pslc_lines,
            &mut pslc_rmap,
            &mut pslc_dest_wp,
            &mut maptbl,
            &mut queue,
            &mut dest_wp,
            &mut normal_lines,
            &mut normal_rmap,
            0,
            true,
        )
        .expect("forced migration with a queued full line must run");

        assert_eq!(result.pages_migrated, blks_per_line as u64 * pgs_per_blk as u64);
        assert_eq!(result.source_line, 0);
        assert_eq!(pslc_lines.free_count(), 1, "source line returns to the pslc free list");

        // This fixture's normal-tier oneshot unit (3 pages) divides evenly
        // into the relocated page count, so every page lands on the normal
        // tier with none left over for the pslc-remainder path.
        for lpn in lpns {
            let ppa = maptbl.get(lpn);
            assert!(!ppa.is_unmapped());
            let dest_line = normal_lines.line(ppa.blk() as u32);
            assert_ne!(dest_line.blocks[0].nand_type, ftl_types::NandType::Slc, "migrated page must not land on an SLC block");
        }
    }

    #[test]
    fn migrate_returns_none_on_empty_queue_even_when_forced() {
        let geo = geo();
        let mut sched = Scheduler::new(&geo);
        let mut pslc_lines = LineManager::new(&geo, Tier::Pslc, 1, false);
        let mut pslc_rmap = ReverseMap::new(pslc_lines.pgs_per_line());
        let mut pslc_dest_wp = WritePointer::new(Tier::Pslc);
        let mut maptbl = MapTable::new(geo.total_lpns());
        let mut queue = MigrationQueue::new();
        let mut dest_wp = WritePointer::new(Tier::Normal);
        let mut normal_lines = LineManager::new(&geo, Tier::Normal, 4, false);
        let mut normal_rmap = ReverseMap::new(normal_lines.pgs_per_line() * 4);

        let result = do_migrate(
            &geo,
            &mut sched,
            &mut pslc_lines,
            &mut pslc_rmap,
            &mut pslc_dest_wp,
            &mut maptbl,
            &mut queue,
            &mut dest_wp,
            &mut normal_lines,
            &mut normal_rmap,
            0,
            true,
        );
        assert!(result.is_none());
    }

    #[test]
    fn migrate_batches_writes_into_oneshot_sized_program_commands() {
        // Count NandCmd::Write issuances indirectly: a line with exactly one
        // oneshot unit's worth of valid pages (3, per this fixture) must cost
        // the same as a single 3-page program, not three separate 1-page
        // programs.
        let geo = geo();
        assert_eq!(geo.pgs_per_oneshot, 3);
        let mut sched = Scheduler::new(&geo);
        let mut pslc_lines = LineManager::new(&geo, Tier::Pslc, 1, false);
        let mut pslc_rmap = ReverseMap::new(pslc_lines.pgs_per_line());
        let mut pslc_dest_wp = WritePointer::new(Tier::Pslc);
        let mut maptbl = MapTable::new(geo.total_lpns());
        let mut queue = MigrationQueue::new();
        let mut dest_wp = WritePointer::new(Tier::Normal);
        let mut normal_lines = LineManager::new(&geo, Tier::Normal, 1, false);
        let mut normal_rmap = ReverseMap::new(normal_lines.pgs_per_line());

        let blks_per_line = pslc_lines.blks_per_line();
        let pgs_per_blk = geo.pgs_per_blk_pslc as u16;
        let mut next_lpn = 0u64;
        for blk_idx in 0..blks_per_line {
            for pg in 0..pgs_per_blk {
                let lpn = ftl_types::Lpn(next_lpn);
                next_lpn += 1;
                pslc_lines.line_mut(0).program(blk_idx, pg);
                let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
                let ppa = Ppa::new_mapped(ch, lun, pl, 0, pg, MapGranularity::Page);
                let pgidx = ftl_lines::ppa_to_pgidx(&geo, Tier::Pslc, 0, ppa);
                pslc_rmap.set(pgidx, lpn);
                maptbl.set(lpn, ppa);
            }
        }
        pslc_lines.retire_from_write_pointer(0);
        queue.push(0);

        let result = do_migrate(
            &geo,
            &mut sched,
            &mut pslc_lines,
            &mut pslc_rmap,
            &mut pslc_dest_wp,
            &mut maptbl,
            &mut queue,
            &mut dest_wp,
            &mut normal_lines,
            &mut normal_rmap,
            0,
            true,
        )
        .expect("forced migration with a queued full line must run");
        assert_eq!(result.pages_migrated, (blks_per_line as u64) * pgs_per_blk as u64);
    }
}
