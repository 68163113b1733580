//! NAND write/read paths (spec.md §4.7, §4.8) and the mapping-invalidation
//! step every overwrite performs first. Each LPN still resolves to exactly
//! one flash page in `maptbl` (see DESIGN.md for why
//! `update_or_reserve_mapping`'s multi-granularity reservation-ahead
//! allocation remains scoped out), but the L2P *cache* entry backing it can
//! be installed at a coarser granularity — `Chunk`/`Zone`/`SubZone` — when
//! `lpn` sits on that unit's boundary, the way spec.md §4.5's `map_read`
//! classifies entries. The physical NAND program command is no longer
//! issued one page at a time either: [`nand_stage_write`] allocates/maps a
//! page without touching the scheduler, and [`nand_commit_write_batch`]
//! amortizes a batch of already-staged LPNs across `pgs_per_oneshot`-sized
//! NAND program commands, the way a write-buffer flush does (spec.md §4.7).

use ftl_geometry::Geometry;
use ftl_l2p::{start_lpn, L2pManager, GRANULARITY_SCAN_ORDER};
use ftl_lines::{blk_idx, ppa_to_pgidx, RetiredLine};
use ftl_timing::{scheduler::NandCmd, Scheduler};
use ftl_types::{CellType, CmdKind, IoType, Lpn, MapGranularity, NandType, Ppa, Tier, INVALID_LPN};

use crate::tier::TierState;

pub fn nand_type_for(geo: &Geometry, tier: Tier) -> NandType {
    match tier {
        Tier::Pslc => NandType::Slc,
        Tier::Normal => geo.cell_mode(),
    }
}

/// Classifies the L2P granularity a cache entry for `lpn` should carry:
/// the coarsest unit in [`GRANULARITY_SCAN_ORDER`] whose start exactly
/// equals `lpn` (spec.md §4.5 "for a given zone or LPN, `start_lpn(lpn,
/// gran)` rounds `lpn` down to the unit boundary" — an LPN that IS its
/// unit's boundary is eligible to stand in for the whole unit). Always
/// `Page` when `l2p_hybrid_map` is disabled.
fn classify_granularity(geo: &Geometry, lpn: Lpn) -> MapGranularity {
    if !geo.cfg().l2p_hybrid_map {
        return MapGranularity::Page;
    }
    GRANULARITY_SCAN_ORDER
        .into_iter()
        .find(|&gran| start_lpn(geo, lpn, gran) == lpn)
        .unwrap_or(MapGranularity::Page)
}

/// `resident` is set only for a genuinely coarser-than-page classification,
/// and only when the geometry opts into pinning such entries (spec.md §4.5
/// "resident only for zoned+hybrid-map entries at non-page granularity").
fn resident_for(geo: &Geometry, gran: MapGranularity) -> bool {
    geo.cfg().l2p_hybrid_map_resident && gran != MapGranularity::Page
}

/// Invalidates `lpn`'s current mapping (if any), wherever it lives. Every
/// write (first write aside) must clear the old copy before the new one is
/// installed, or the old page's line would never regain a free slot.
pub fn invalidate_current_mapping(
    geo: &Geometry,
    l2p: &mut L2pManager,
    pslc: &mut TierState,
    normal: &mut TierState,
    lpn_tier: &mut [Option<Tier>],
    lpn: ftl_types::Lpn,
) {
    let ppa = l2p.maptbl.get(lpn);
    if ppa.is_unmapped() {
        return;
    }
    let tier = lpn_tier[lpn.0 as usize].expect("mapped lpn must record which tier holds it");
    let ts = match tier {
        Tier::Pslc => &mut *pslc,
        Tier::Normal => &mut *normal,
    };
    let bidx = blk_idx(geo.cfg(), ppa.ch(), ppa.lun(), ppa.pl());
    let pgidx = ppa_to_pgidx(geo, tier, ppa.blk() as u32, ppa);
    ts.lines.line_mut(ppa.blk() as u32).invalidate(bidx, ppa.pg());
    ts.lines.bump_invalid(ppa.blk() as u32);
    ts.rmap.set(pgidx, INVALID_LPN);
    l2p.maptbl.unmap(lpn);
    lpn_tier[lpn.0 as usize] = None;
}

/// Allocates a fresh page for `lpn` on `tier` and installs its mapping, but
/// does not touch the scheduler or consume a write credit — the physical
/// program command is [`nand_commit_write_batch`]'s job, deferred until
/// enough staged LPNs accumulate for a oneshot unit (or a buffer flush
/// forces the issue). Mapping visibility is synchronous with this call: a
/// read of `lpn` immediately after resolves to the page allocated here,
/// whether or not its physical program has been committed yet.
pub fn nand_stage_write(
    geo: &Geometry,
    l2p: &mut L2pManager,
    ts: &mut TierState,
    tier: Tier,
    lpn_tier: &mut [Option<Tier>],
    lpn: Lpn,
) -> (Ppa, Option<RetiredLine>) {
    let alloc = ts
        .user_wp
        .allocate_page(geo, &mut ts.lines)
        .expect("tier must have room; caller checks cap_exceeded before calling");

    let pgidx = ppa_to_pgidx(geo, tier, alloc.ppa.blk() as u32, alloc.ppa);
    ts.rmap.set(pgidx, lpn);
    let gran = classify_granularity(geo, lpn);
    l2p.install(lpn, alloc.ppa, gran, resident_for(geo, gran));
    lpn_tier[lpn.0 as usize] = Some(tier);

    (alloc.ppa, alloc.retired)
}

/// Issues NAND program commands for `lpns` (every one of which must already
/// be mapped via [`nand_stage_write`]), chunked into
/// `min(pgs_per_oneshot, remaining)`-page groups the way a real oneshot
/// page program amortizes (spec.md §4.7). Each chunk's command targets the
/// first page in that chunk — channel/LUN occupancy is what the timing
/// model actually cares about, and a write buffer always flushes pages that
/// were staged back-to-back onto the same line. Consumes one write credit
/// per page and returns the max completion across every chunk issued (or
/// `stime` unchanged if `lpns` is empty).
pub fn nand_commit_write_batch(
    geo: &Geometry,
    sched: &mut Scheduler,
    ts: &mut TierState,
    tier: Tier,
    l2p: &L2pManager,
    lpns: &[Lpn],
    io_type: IoType,
    stime: u64,
) -> u64 {
    if lpns.is_empty() {
        return stime;
    }
    let pgs_per_oneshot = match tier {
        Tier::Pslc => geo.pslc_pgs_per_oneshot,
        Tier::Normal => geo.pgs_per_oneshot,
    }
    .max(1);
    let nand_type = nand_type_for(geo, tier);

    let mut max_completion = stime;
    let mut chunk_head: Option<Ppa> = None;
    let mut chunk_len: u64 = 0;
    for (i, &lpn) in lpns.iter().enumerate() {
        if chunk_head.is_none() {
            chunk_head = Some(l2p.maptbl.get(lpn));
        }
        chunk_len += 1;
        let is_last = i + 1 == lpns.len();
        if chunk_len >= pgs_per_oneshot || is_last {
            let xfer = chunk_len.min(pgs_per_oneshot) * geo.cfg().pg_size;
            let cmd = NandCmd::new(CmdKind::Write, io_type, chunk_head.expect("chunk always starts with a head ppa"), nand_type, CellType::Lsb, xfer, stime);
            let ctime = sched.advance(geo, cmd);
            max_completion = max_completion.max(ctime);
            for _ in 0..chunk_len {
                ts.credits.consume_one();
            }
            chunk_head = None;
            chunk_len = 0;
        }
    }
    max_completion
}

/// Stages and immediately commits one LPN — the non-buffered write path
/// (`MetaNamespace`, and every unit test below that doesn't need a write
/// buffer in the loop).
pub fn nand_write_page(
    geo: &Geometry,
    sched: &mut Scheduler,
    l2p: &mut L2pManager,
    ts: &mut TierState,
    tier: Tier,
    lpn_tier: &mut [Option<Tier>],
    lpn: Lpn,
    io_type: IoType,
    stime: u64,
) -> (u64, Option<RetiredLine>) {
    let (_ppa, retired) = nand_stage_write(geo, l2p, ts, tier, lpn_tier, lpn);
    let ctime = nand_commit_write_batch(geo, sched, ts, tier, l2p, &[lpn], io_type, stime);
    (ctime, retired)
}

/// Reads `lpn`: an unmapped LPN costs one skipped NAND op and completes
/// immediately at `stime` (spec.md §4.8 "unmapped-read" behavior). A mapped
/// LPN that misses the L2P cache first issues a NAND map-read (spec.md §4.5)
/// and, on a page-granularity match, prefetches up to `l2p_preread` further
/// mappings into the cache before the real data read is issued.
pub fn nand_read_page(
    geo: &Geometry,
    sched: &mut Scheduler,
    l2p: &mut L2pManager,
    lpn_tier: &[Option<Tier>],
    lpn: ftl_types::Lpn,
    io_type: IoType,
    stime: u64,
) -> u64 {
    let hit = l2p.lookup(lpn).is_some();
    let mut stime = stime;
    if !hit {
        l2p.record_miss();
        let ppa = l2p.maptbl.get(lpn);
        if !ppa.is_unmapped() {
            let tier = lpn_tier[lpn.0 as usize].expect("mapped lpn must record which tier holds it");
            let map_read = NandCmd::new(CmdKind::Read, IoType::MapRead, ppa, nand_type_for(geo, tier), CellType::Lsb, geo.cfg().pg_size, stime);
            stime = sched.advance(geo, map_read);
            let gran = classify_granularity(geo, lpn);
            tracing::trace!(target: "ftl_core::nand", lpn = lpn.0, ?gran, "l2p miss, map read installed cache entry");
            l2p.install(lpn, ppa, gran, resident_for(geo, gran));
            prefetch(geo, l2p, lpn_tier, lpn);
        }
    }
    let ppa = l2p.maptbl.get(lpn);
    if ppa.is_unmapped() {
        return stime;
    }
    let tier = lpn_tier[lpn.0 as usize].expect("mapped lpn must record which tier holds it");
    let cmd = NandCmd::new(CmdKind::Read, io_type, ppa, nand_type_for(geo, tier), CellType::Lsb, geo.cfg().pg_size, stime);
    sched.advance(geo, cmd)
}

/// Installs cache entries for up to `l2p_preread` already-mapped LPNs past
/// `lpn`, without issuing NAND reads for them — a later access to one of
/// these LPNs becomes a cache hit instead of a second map-read miss (spec.md
/// §4.5 "prefetch up to pre_read entries ahead").
fn prefetch(geo: &Geometry, l2p: &mut L2pManager, lpn_tier: &[Option<Tier>], lpn: ftl_types::Lpn) {
    for offset in 1..=geo.cfg().l2p_preread as u64 {
        let next = lpn.0 + offset;
        if next as usize >= lpn_tier.len() {
            break;
        }
        let next_lpn = ftl_types::Lpn(next);
        let next_ppa = l2p.maptbl.get(next_lpn);
        if !next_ppa.is_unmapped() {
            let gran = classify_granularity(geo, next_lpn);
            l2p.install(next_lpn, next_ppa, gran, resident_for(geo, gran));
        }
    }
}
