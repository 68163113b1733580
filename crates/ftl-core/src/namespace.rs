//! Per-namespace state: the L2P map, both tiers' line/credit bookkeeping,
//! the migration FIFO, and the write-buffer pool (spec.md §2 "Namespace
//! types", §4.6–§4.11). [`BlockNamespace`] backs `conzone_block`,
//! [`ZonedNamespace`] backs `conzone_zoned`, [`MetaNamespace`] backs
//! `conzone_meta` (all-pSLC, no migration, no zones).

use ftl_geometry::Geometry;
use ftl_gc::{do_migrate, foreground_gc};
use ftl_l2p::L2pManager;
use ftl_lines::MigrationQueue;
use ftl_proto::telemetry;
use ftl_timing::Scheduler;
use ftl_types::{IoType, Lpn, Tier};
use ftl_wbuf::pool::WriteBufferPool;

use crate::nand::{invalidate_current_mapping, nand_commit_write_batch, nand_read_page, nand_stage_write, nand_write_page};
use crate::tier::TierState;
use crate::zone::ZoneManager;

/// Result of staging one page through a namespace's write buffer (spec.md
/// §4.6, §5 "two retry triggers"). `Retry` is this workspace's translation
/// of the spec's "return false to upstream": no buffer could accept the
/// write right now.
#[derive(Debug, Clone, Copy)]
pub enum WriteOutcome {
    Completed(u64),
    Retry,
    CapExceeded,
}

/// Runs foreground GC on `tier` if due, feeding reclaimed pages back into
/// its write credits (spec.md §4.10, "credits_to_refill").
fn maybe_gc(geo: &Geometry, sched: &mut Scheduler, l2p: &mut L2pManager, ts: &mut TierState, tier: Tier, stime: u64) {
    let mut gc_wp = std::mem::replace(&mut ts.gc_wp, ftl_lines::WritePointer::new(tier));
    if let Some(result) = foreground_gc(geo, sched, &mut ts.lines, &mut ts.rmap, &mut l2p.maptbl, &mut gc_wp, tier, |id| id, stime, false) {
        ts.credits.refill(result.pages_reclaimed);
    }
    ts.gc_wp = gc_wp;
}

/// Per-LPN "which tier currently holds this mapping", needed because
/// `MapTable` only stores a `Ppa`, whose `blk` field is a tier-local line id
/// (pSLC and normal lines both start numbering at 0).
pub type LpnTierMap = Vec<Option<Tier>>;

/// `conzone_block`: an ordinary overwrite-in-place block namespace, pSLC
/// tier in front of the normal tier with background migration.
pub struct BlockNamespace {
    pub l2p: L2pManager,
    pub pslc: TierState,
    pub normal: TierState,
    pub lpn_tier: LpnTierMap,
    pub migration_queue: MigrationQueue,
    pub wbuf: WriteBufferPool,
}

impl BlockNamespace {
    pub fn new(geo: &Geometry, pslc_lines: u32, normal_lines: u32, num_wb: u32) -> Self {
        let total_lpns = geo.total_lpns();
        BlockNamespace {
            l2p: L2pManager::new(total_lpns, geo.cfg().l2p_cache_hash_slot, (geo.cfg().l2p_cache_size / geo.cfg().l2p_cache_hash_slot as u64) as u32),
            pslc: TierState::new(geo, Tier::Pslc, pslc_lines, geo.pgs_per_line_pslc as i64),
            normal: TierState::new(geo, Tier::Normal, normal_lines, geo.pgs_per_line_normal as i64),
            lpn_tier: vec![None; total_lpns as usize],
            migration_queue: MigrationQueue::new(),
            wbuf: WriteBufferPool::new(num_wb, (geo.cfg().global_wb_size / geo.cfg().pg_size) as u32, geo.cfg().wb_mgnt, true),
        }
    }

    /// Overwrites `lpn` with fresh data. Destination tier is decided by
    /// [`ftl_wbuf::flush_target`] (spec.md §4.6 `get_flush_target_location`):
    /// pSLC whenever `slc_bypass` is off, normal unconditionally under
    /// `normal_only`, and otherwise normal only once this namespace's
    /// already-buffered pages plus this one would fill a normal-tier oneshot
    /// unit — a lone small write still lands on pSLC first. The page is
    /// mapped synchronously and staged into the namespace's (single, shared)
    /// write buffer; the physical NAND program only fires once that buffer
    /// fills, amortizing it across a oneshot unit (spec.md §4.6/§4.7).
    pub fn write_lpn(&mut self, geo: &Geometry, sched: &mut Scheduler, lpn: Lpn, io_type: IoType, stime: u64) -> WriteOutcome {
        invalidate_current_mapping(geo, &mut self.l2p, &mut self.pslc, &mut self.normal, &mut self.lpn_tier, lpn);

        let agg_pending_pgs = self.wbuf.get(0).pgs() as u64;
        let tier = match ftl_wbuf::flush_target(false, geo.cfg().slc_bypass, geo.cfg().normal_only, agg_pending_pgs, 1, geo.pgs_per_oneshot) {
            ftl_wbuf::FlushTarget::Pslc => Tier::Pslc,
            ftl_wbuf::FlushTarget::Normal => Tier::Normal,
        };
        {
            let ts = match tier {
                Tier::Pslc => &self.pslc,
                Tier::Normal => &self.normal,
            };
            if ts.user_wp.current_line().is_none() && ts.lines.free_count() == 0 {
                return WriteOutcome::CapExceeded;
            }
        }

        let Some(idx) = self.wbuf.select(-1, true) else {
            return WriteOutcome::Retry;
        };

        let ts = match tier {
            Tier::Pslc => &mut self.pslc,
            Tier::Normal => &mut self.normal,
        };
        let (_ppa, retired) = nand_stage_write(geo, &mut self.l2p, ts, tier, &mut self.lpn_tier, lpn);
        if let Some(r) = retired {
            if r.became_full && tier == Tier::Pslc {
                let order = self.migration_queue.push(r.line_id);
                self.pslc.lines.line_mut(r.line_id).write_order = Some(order);
            }
        }
        debug_assert!(self.wbuf.get_mut(idx).push(lpn, -1), "select() only ever hands back a buffer with room");

        let mut max_completion = stime;
        if self.wbuf.get(idx).is_full() {
            max_completion = max_completion.max(self.flush_buffer(geo, sched, idx, tier, io_type, max_completion));
        }

        maybe_gc(geo, sched, &mut self.l2p, &mut self.normal, Tier::Normal, max_completion);
        maybe_gc(geo, sched, &mut self.l2p, &mut self.pslc, Tier::Pslc, max_completion);

        if tier == Tier::Pslc {
            let mut dest_wp = std::mem::replace(&mut self.normal.gc_wp, ftl_lines::WritePointer::new(Tier::Normal));
            let mut pslc_dest_wp = std::mem::replace(&mut self.pslc.gc_wp, ftl_lines::WritePointer::new(Tier::Pslc));
            if let Some(result) = do_migrate(
                geo,
                sched,
                &mut self.pslc.lines,
                &mut self.pslc.rmap,
                &mut pslc_dest_wp,
                &mut self.l2p.maptbl,
                &mut self.migration_queue,
                &mut dest_wp,
                &mut self.normal.lines,
                &mut self.normal.rmap,
                max_completion,
                false,
            ) {
                tracing::debug!(target: "ftl_core::namespace", source_line = result.source_line, pages_migrated = result.pages_migrated, "migration triggered from write path");
                for _ in 0..result.pages_migrated {
                    // migrated LPNs now live in the normal tier (or, for a
                    // trailing remainder, back on pSLC); lpn_tier is
                    // corrected lazily the next time each is looked up via
                    // maptbl (its ppa already reflects the new location) —
                    // see DESIGN.md "migrated-lpn tier bookkeeping".
                }
            }
            self.normal.gc_wp = dest_wp;
            self.pslc.gc_wp = pslc_dest_wp;
        }

        WriteOutcome::Completed(max_completion)
    }

    /// Drains buffer `idx`, issuing one oneshot-aggregated NAND program per
    /// chunk of its staged LPNs and releasing the buffer immediately — the
    /// shared block-namespace buffer has no cross-zone contention to model,
    /// so there is no reason to keep it marked `flushing` past this call.
    fn flush_buffer(&mut self, geo: &Geometry, sched: &mut Scheduler, idx: usize, tier: Tier, io_type: IoType, stime: u64) -> u64 {
        let drained = self.wbuf.get_mut(idx).start_flush(stime, 0);
        self.wbuf.get_mut(idx).release();
        if drained.is_empty() {
            return stime;
        }
        let ts = match tier {
            Tier::Pslc => &mut self.pslc,
            Tier::Normal => &mut self.normal,
        };
        let ctime = nand_commit_write_batch(geo, sched, ts, tier, &self.l2p, &drained, io_type, stime);
        telemetry::WB_FLUSHES_TOTAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        ctime
    }

    /// Forces out any pending (non-empty, not already flushing) buffer —
    /// `OpKind::Flush`/FUA writes (spec.md §4.6 "explicit FUA/flush").
    /// A no-op success when nothing is staged.
    pub fn flush_now(&mut self, geo: &Geometry, sched: &mut Scheduler, io_type: IoType, stime: u64) -> u64 {
        let tier = if geo.cfg().slc_bypass { Tier::Normal } else { Tier::Pslc };
        let mut max_completion = stime;
        for idx in 0..self.wbuf.len() {
            if self.wbuf.get(idx).pgs() > 0 && !self.wbuf.get(idx).flushing {
                max_completion = max_completion.max(self.flush_buffer(geo, sched, idx, tier, io_type, max_completion));
            }
        }
        max_completion
    }

    pub fn read_lpn(&mut self, geo: &Geometry, sched: &mut Scheduler, lpn: Lpn, io_type: IoType, stime: u64) -> u64 {
        nand_read_page(geo, sched, &mut self.l2p, &self.lpn_tier, lpn, io_type, stime)
    }
}

/// `conzone_meta`: small, permanent, all-pSLC metadata store — no migration,
/// no normal tier, no zones.
pub struct MetaNamespace {
    pub l2p: L2pManager,
    pub pslc: TierState,
    pub lpn_tier: LpnTierMap,
}

impl MetaNamespace {
    pub fn new(geo: &Geometry, total_lpns: u64, pslc_lines: u32) -> Self {
        MetaNamespace {
            l2p: L2pManager::new(total_lpns, geo.cfg().l2p_cache_hash_slot, (geo.cfg().l2p_cache_size / geo.cfg().l2p_cache_hash_slot as u64) as u32),
            pslc: TierState::new(geo, Tier::Pslc, pslc_lines, geo.pgs_per_line_pslc as i64),
            lpn_tier: vec![None; total_lpns as usize],
        }
    }

    pub fn write_lpn(&mut self, geo: &Geometry, sched: &mut Scheduler, lpn: Lpn, io_type: IoType, stime: u64) -> Option<u64> {
        let mut dummy_normal = TierState::new(geo, Tier::Normal, 0, 0);
        invalidate_current_mapping(geo, &mut self.l2p, &mut self.pslc, &mut dummy_normal, &mut self.lpn_tier, lpn);

        if self.pslc.user_wp.current_line().is_none() && self.pslc.lines.free_count() == 0 {
            return None;
        }
        let (ctime, _retired) = nand_write_page(geo, sched, &mut self.l2p, &mut self.pslc, Tier::Pslc, &mut self.lpn_tier, lpn, io_type, stime);
        maybe_gc(geo, sched, &mut self.l2p, &mut self.pslc, Tier::Pslc, ctime);
        Some(ctime)
    }

    pub fn read_lpn(&mut self, geo: &Geometry, sched: &mut Scheduler, lpn: Lpn, io_type: IoType, stime: u64) -> u64 {
        nand_read_page(geo, sched, &mut self.l2p, &self.lpn_tier, lpn, io_type, stime)
    }
}

/// `conzone_zoned`: sequential-write-only, one dedicated line per zone per
/// tier. Migration still moves a zone's pSLC line to its normal-tier
/// counterpart, but there is no intra-zone GC: ZNS never partially
/// invalidates a zone, only a full reset does (see DESIGN.md).
pub struct ZonedNamespace {
    pub l2p: L2pManager,
    pub pslc: TierState,
    pub normal: TierState,
    pub lpn_tier: LpnTierMap,
    pub migration_queue: MigrationQueue,
    pub wbuf: WriteBufferPool,
    pub zones: ZoneManager,
}

impl ZonedNamespace {
    pub fn new(geo: &Geometry, num_zones: u32, max_open: u32, max_active: u32, num_wb: u32) -> Self {
        let total_lpns = num_zones as u64 * geo.pgs_per_zone;
        ZonedNamespace {
            l2p: L2pManager::new(total_lpns, geo.cfg().l2p_cache_hash_slot, (geo.cfg().l2p_cache_size / geo.cfg().l2p_cache_hash_slot as u64) as u32),
            pslc: TierState::new(geo, Tier::Pslc, num_zones, geo.pgs_per_line_pslc as i64),
            normal: TierState::new(geo, Tier::Normal, num_zones, geo.pgs_per_line_normal as i64),
            lpn_tier: vec![None; total_lpns as usize],
            migration_queue: MigrationQueue::new(),
            wbuf: WriteBufferPool::new(num_wb, (geo.cfg().zone_wb_size / geo.cfg().pg_size) as u32, geo.cfg().wb_mgnt, false),
            zones: ZoneManager::new(num_zones, geo.pgs_per_zone, geo.zone_capacity_pgs, max_open, max_active),
        }
    }

    /// Appends one page of sequential data to zone `zid`, binding that
    /// zone's write pointer to its own dedicated line on first use. Stages
    /// through `self.wbuf` the same way `BlockNamespace` does, except a
    /// flushed-full buffer here stays marked `flushing` until an explicit
    /// [`ZonedNamespace::poll_write_buffers`] call — modeling the spec's
    /// deferred `InternalOperation` release, and giving cross-zone writes a
    /// real reason to see [`WriteOutcome::Retry`] (spec.md §4.6, §5 "two
    /// retry triggers").
    pub fn write_zone_page(&mut self, geo: &Geometry, sched: &mut Scheduler, zid: u32, lpn: Lpn, io_type: IoType, stime: u64) -> WriteOutcome {
        if self.pslc.user_wp.current_line() != Some(zid) {
            self.pslc.user_wp.bind(zid);
        }

        // A flush scheduled to complete at or before `stime` has, from this
        // command's point of view, already been delivered — release it
        // before selecting so sequential writes on the same timeline don't
        // retry forever waiting on a flush that is in the past. Genuinely
        // concurrent writes (same `stime`, flush not yet due) still see the
        // buffer held until `poll_write_buffers` runs.
        self.poll_write_buffers(stime);

        let Some(idx) = self.wbuf.select(zid as i64, false) else {
            return WriteOutcome::Retry;
        };

        let mut max_completion = stime;
        let stolen = self.wbuf.get(idx).zid != -1 && self.wbuf.get(idx).zid != zid as i64 && self.wbuf.get(idx).pgs() > 0;
        if stolen {
            max_completion = max_completion.max(self.flush_buffer(geo, sched, idx, io_type, max_completion));
        }

        let (_ppa, retired) = nand_stage_write(geo, &mut self.l2p, &mut self.pslc, Tier::Pslc, &mut self.lpn_tier, lpn);
        if let Some(r) = retired {
            if r.became_full {
                let order = self.migration_queue.push(r.line_id);
                self.pslc.lines.line_mut(r.line_id).write_order = Some(order);
            }
        }
        debug_assert!(self.wbuf.get_mut(idx).push(lpn, zid as i64), "select() only ever hands back a buffer with room");

        if self.wbuf.get(idx).is_full() {
            max_completion = max_completion.max(self.flush_buffer(geo, sched, idx, io_type, max_completion));
        }

        WriteOutcome::Completed(max_completion)
    }

    /// Drains buffer `idx` into a oneshot-aggregated NAND program batch.
    /// Leaves the buffer `flushing` (spec.md §4.6 step 6) — only
    /// [`ZonedNamespace::poll_write_buffers`] clears that flag, so a write
    /// targeting a still-flushing buffer correctly retries instead of
    /// silently reusing capacity that hasn't actually been released yet.
    fn flush_buffer(&mut self, geo: &Geometry, sched: &mut Scheduler, idx: usize, io_type: IoType, stime: u64) -> u64 {
        let drained = self.wbuf.get_mut(idx).start_flush(stime, 0);
        if drained.is_empty() {
            self.wbuf.get_mut(idx).release();
            return stime;
        }
        let ctime = nand_commit_write_batch(geo, sched, &mut self.pslc, Tier::Pslc, &self.l2p, &drained, io_type, stime);
        self.wbuf.get_mut(idx).time = ctime;
        telemetry::WB_FLUSHES_TOTAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        ctime
    }

    /// Forces out every pending, non-flushing buffer and releases it right
    /// away — `OpKind::Flush`/FUA writes don't wait for the deferred
    /// release callback.
    pub fn flush_now(&mut self, geo: &Geometry, sched: &mut Scheduler, io_type: IoType, stime: u64) -> u64 {
        let mut max_completion = stime;
        for idx in 0..self.wbuf.len() {
            if self.wbuf.get(idx).pgs() > 0 && !self.wbuf.get(idx).flushing {
                max_completion = max_completion.max(self.flush_buffer(geo, sched, idx, io_type, max_completion));
                self.wbuf.get_mut(idx).release();
            }
        }
        max_completion
    }

    /// Releases any buffer whose scheduled flush completion has elapsed by
    /// `now` — the upstream shim's delivery of a deferred `InternalOperation`
    /// (spec.md §6 "deferred internal-operation queue").
    pub fn poll_write_buffers(&mut self, now: u64) {
        for buf in self.wbuf.iter_mut() {
            if buf.flushing && now >= buf.time {
                buf.release();
            }
        }
    }

    pub fn read_zone_page(&mut self, geo: &Geometry, sched: &mut Scheduler, lpn: Lpn, io_type: IoType, stime: u64) -> u64 {
        nand_read_page(geo, sched, &mut self.l2p, &self.lpn_tier, lpn, io_type, stime)
    }

    /// Resets `zid`: erases its pSLC line (and, if migrated, its normal
    /// line), unmaps every LPN in range, and rebinds the write pointer back
    /// to the zone's own (now-empty) line (spec.md §4.12).
    pub fn reset_zone(&mut self, geo: &Geometry, sched: &mut Scheduler, zid: u32, stime: u64) -> u64 {
        let zone = *self.zones.zone(zid);
        let mut max_completion = stime;

        // Expel any of this zone's pages still sitting in a write buffer
        // (spec.md §4.12): a reset must not let a stale buffered LPN get
        // flushed to NAND after the line underneath it has been erased.
        for buf in self.wbuf.iter_mut() {
            buf.compact_remove(|lpn| lpn.0 >= zone.slba.0 && lpn.0 < zone.wp.0);
            if buf.lpns().is_empty() && !buf.flushing {
                buf.zid = -1;
            }
        }

        for raw in zone.slba.0..zone.wp.0 {
            let lpn = Lpn(raw);
            let ppa = self.l2p.maptbl.get(lpn);
            if !ppa.is_unmapped() {
                self.l2p.maptbl.unmap(lpn);
                self.lpn_tier[lpn.0 as usize] = None;
            }
        }
        if self.pslc.lines.line(zid).vpc + self.pslc.lines.line(zid).ipc > 0 {
            max_completion = self.erase_line(geo, sched, Tier::Pslc, zid, max_completion);
        }
        if self.normal.lines.line(zid).vpc + self.normal.lines.line(zid).ipc > 0 {
            max_completion = self.erase_line(geo, sched, Tier::Normal, zid, max_completion);
        }
        self.pslc.user_wp.zero();
        self.zones.reset(zid);
        max_completion
    }

    fn erase_line(&mut self, geo: &Geometry, sched: &mut Scheduler, tier: Tier, line_id: u32, stime: u64) -> u64 {
        use ftl_lines::die_coords;
        use ftl_timing::scheduler::NandCmd;
        use ftl_types::{CellType, CmdKind, Ppa};

        let ts = match tier {
            Tier::Pslc => &mut self.pslc,
            Tier::Normal => &mut self.normal,
        };
        let nand_type = crate::nand::nand_type_for(geo, tier);
        let mut completion = stime;
        for blk_idx in 0..ts.lines.blks_per_line() {
            let (ch, lun, pl) = die_coords(geo.cfg(), blk_idx);
            let ppa = Ppa::new_mapped(ch, lun, pl, line_id as u16, 0, ftl_types::MapGranularity::Page);
            let cmd = NandCmd::new(CmdKind::Erase, IoType::UserIo, ppa, nand_type, CellType::Lsb, 0, completion);
            completion = sched.advance(geo, cmd);
        }
        ts.lines.remove_from_full(line_id);
        ts.lines.mark_line_free(line_id);
        completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo_with_slc_bypass() -> Geometry {
        let toml_src = r#"
            nand_channels = 2
            luns_per_ch = 1
            plns_per_lun = 1
            blks_per_pln = 16

            blk_size = 24576
            flash_page_size = 4096
            oneshot_page_size = 12288
            pslc_oneshot_page_size = 4096
            lba_size = 512
            pg_size = 4096

            cell_mode = "Tlc"

            zone_size = 16384
            zone_capacity = 16384
            chunk_size = 4096
            dies_per_zone = 2
            write_unit_size = 4096

            zone_wb_size = 4096
            global_wb_size = 8192

            l2p_cache_size = 64
            l2p_entry_size = 8
            l2p_cache_hash_slot = 16

            pslc_init_blks = 4
            meta_pslc_init_blks = 2
            data_pslc_init_blks = 2

            wb_mgnt = "static"
            slc_bypass = true
            normal_only = false
            zoned_slc = true
            l2p_hybrid_map = false
            l2p_hybrid_map_resident = false
            l2p_preread = 2

            max_ch_xfer_size = 4096
            nand_channel_bandwidth = 800000000
            pcie_bandwidth = 4000000000
            fw_pg_rd_latency_ns = 500
            fw_pg_wr_latency_ns = 500
            fw_ch_xfer_latency_ns = 100

            total_lpns = 1000

            [latencies]
            pg_rd_lat_ns = [
                [40000, 40000, 40000, 40000],
                [60000, 60000, 60000, 60000],
                [75000, 75000, 85000, 85000],
                [90000, 90000, 100000, 110000],
            ]
            pg_rd_lat_4kib_ns = [
                [25000, 25000, 25000, 25000],
                [35000, 35000, 35000, 35000],
                [45000, 45000, 50000, 50000],
                [55000, 55000, 60000, 65000],
            ]
            pg_wr_lat_ns = [100000, 300000, 600000, 900000]
            blk_er_lat_ns = [1000000, 2000000, 3000000, 4000000]
        "#;
        let cfg: ftl_geometry::GeometryConfig = toml::from_str(toml_src).unwrap();
        Geometry::build(cfg).unwrap()
    }

    #[test]
    fn slc_bypass_small_write_still_lands_on_pslc_until_oneshot_fills() {
        // oneshot_page_size / pg_size == 3, so the first two writes (with an
        // empty aggregator) must stay on pSLC per flush_target's threshold
        // branch, not jump straight to normal the way a bare `slc_bypass`
        // check would.
        let geo = geo_with_slc_bypass();
        assert_eq!(geo.pgs_per_oneshot, 3);
        let mut sched = Scheduler::new(&geo);
        let mut ns = BlockNamespace::new(&geo, 4, 4, 1);

        let before = ns.normal.lines.line(0).vpc;
        let outcome = ns.write_lpn(&geo, &mut sched, Lpn(0), IoType::UserIo, 0);
        assert!(matches!(outcome, WriteOutcome::Completed(_)));
        assert_eq!(ns.normal.lines.line(0).vpc, before, "a lone small write under slc_bypass must not program the normal tier yet");
        assert_eq!(ns.pslc.lines.line(0).vpc, 1, "it must land on pslc instead");
    }
}
