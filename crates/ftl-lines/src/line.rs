//! Line/block lifecycle and the reverse (physical-page → LPN) map
//! (spec.md §3 "Block"/"Line", §4.4, §4.10).

use ftl_geometry::Geometry;
use ftl_types::{Lpn, NandType, PageStatus, Tier, INVALID_LPN};

use crate::heap::{Handle, IndexedHeap};

/// One physical block: a flat array of page statuses plus the counters
/// spec.md §3 requires (`vpc + ipc + free == used_pgs`).
#[derive(Debug, Clone)]
pub struct Block {
    pub nand_type: NandType,
    pages: Vec<PageStatus>,
    pub vpc: u32,
    pub ipc: u32,
    pub erase_cnt: u32,
}

impl Block {
    fn new(nand_type: NandType, used_pgs: u64) -> Self {
        Block {
            nand_type,
            pages: vec![PageStatus::Free; used_pgs as usize],
            vpc: 0,
            ipc: 0,
            erase_cnt: 0,
        }
    }

    pub fn used_pgs(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn free_count(&self) -> u32 {
        self.used_pgs() - self.vpc - self.ipc
    }

    pub fn status(&self, pg: u16) -> PageStatus {
        self.pages[pg as usize]
    }

    /// `free -> valid`. Panics (contract violation) if the page was not free.
    fn program(&mut self, pg: u16) {
        let slot = &mut self.pages[pg as usize];
        assert_eq!(*slot, PageStatus::Free, "program into non-free page {pg}");
        *slot = PageStatus::Valid;
        self.vpc += 1;
    }

    /// `valid -> invalid`. Panics if the page was not valid.
    fn invalidate(&mut self, pg: u16) {
        let slot = &mut self.pages[pg as usize];
        assert_eq!(*slot, PageStatus::Valid, "invalidate of non-valid page {pg}");
        *slot = PageStatus::Invalid;
        self.vpc -= 1;
        self.ipc += 1;
    }

    /// `invalid|valid -> free` for every page; bumps `erase_cnt`.
    fn erase(&mut self) {
        for slot in &mut self.pages {
            *slot = PageStatus::Free;
        }
        self.vpc = 0;
        self.ipc = 0;
        self.erase_cnt += 1;
    }
}

/// One superblock: one block per channel×LUN×plane, tracked together.
/// `sub_lined` distinguishes the two addressing shapes of spec.md §3: when
/// `false` the line is an interleaved parent (writes rotate across every die
/// before `pg` advances); when `true` each die's block is addressed
/// independently by whichever write pointer owns it (used for zone
/// capacities smaller than a full superblock).
#[derive(Debug, Clone)]
pub struct Line {
    pub id: u32,
    pub tier: Tier,
    pub blocks: Vec<Block>,
    pub vpc: u32,
    pub ipc: u32,
    pub rpc: u32,
    pub sub_lined: bool,
    /// Set when a multi-page mapping unit spilled into a second line; the
    /// write pointer continues there once this line is exhausted.
    pub rsv_nextline: Option<u32>,
    /// Monotonically increasing id assigned the moment a pSLC line fills;
    /// the migration FIFO orders strictly by this value.
    pub write_order: Option<u64>,
}

impl Line {
    fn new(
        id: u32,
        tier: Tier,
        blocks_per_line: usize,
        used_pgs: u64,
        nand_type: NandType,
        sub_lined: bool,
    ) -> Self {
        Line {
            id,
            tier,
            blocks: (0..blocks_per_line)
                .map(|_| Block::new(nand_type, used_pgs))
                .collect(),
            vpc: 0,
            ipc: 0,
            rpc: 0,
            sub_lined,
            rsv_nextline: None,
            write_order: None,
        }
    }

    fn reset(&mut self) {
        for b in &mut self.blocks {
            b.erase();
        }
        self.vpc = 0;
        self.ipc = 0;
        self.rpc = 0;
        self.rsv_nextline = None;
        self.write_order = None;
    }

    pub fn pgs_per_line(&self) -> u64 {
        self.blocks.iter().map(|b| b.used_pgs() as u64).sum()
    }

    /// `free -> valid` at `(blk_idx, pg)`. Updates line and block counters.
    pub fn program(&mut self, blk_idx: usize, pg: u16) {
        self.blocks[blk_idx].program(pg);
        self.vpc += 1;
    }

    /// `valid -> invalid` at `(blk_idx, pg)`.
    pub fn invalidate(&mut self, blk_idx: usize, pg: u16) {
        self.blocks[blk_idx].invalidate(pg);
        self.vpc -= 1;
        self.ipc += 1;
    }

    /// Marks a page reserved: counted as valid (pre-claimed) but with no
    /// owning LPN in the reverse map; bumps `rpc`.
    pub fn reserve(&mut self, blk_idx: usize, pg: u16) {
        self.blocks[blk_idx].program(pg);
        self.vpc += 1;
        self.rpc += 1;
    }

    /// A previously reserved page is either claimed by a real LPN (still
    /// valid, just no longer "spare") or invalidated outright; either way it
    /// leaves the reserved pool.
    pub fn dec_rpc(&mut self) {
        debug_assert!(self.rpc > 0, "rpc underflow");
        self.rpc -= 1;
    }
}

/// The reverse map for one tier: `pgidx -> owning LPN`, or `INVALID_LPN` for
/// a reserved-but-unwritten page.
pub struct ReverseMap {
    rmap: Vec<Lpn>,
}

impl ReverseMap {
    pub fn new(total_pages: u64) -> Self {
        ReverseMap {
            rmap: vec![INVALID_LPN; total_pages as usize],
        }
    }

    pub fn get(&self, pgidx: u64) -> Lpn {
        self.rmap[pgidx as usize]
    }

    pub fn set(&mut self, pgidx: u64, lpn: Lpn) {
        self.rmap[pgidx as usize] = lpn;
    }
}

/// Owns every line in one tier: the arena, free list, full list, and the
/// victim priority queue ordered by ascending `vpc`.
pub struct LineManager {
    pgs_per_line: u64,
    blks_per_line: usize,
    lines: Vec<Line>,
    free: Vec<u32>,
    full: Vec<u32>,
    victim_pq: IndexedHeap<u32>,
    /// `line_id -> handle in victim_pq`, for O(1) lookup during `change_priority`.
    victim_handles: Vec<Option<Handle>>,
    pub tier_full: bool,
}

impl LineManager {
    pub fn new(geo: &Geometry, tier: Tier, num_lines: u32, sub_lined: bool) -> Self {
        let blks_per_line = geo.blks_per_line as usize;
        let (pgs_per_blk, nand_type) = match tier {
            Tier::Pslc => (geo.pgs_per_blk_pslc, NandType::Slc),
            Tier::Normal => (geo.pgs_per_blk_normal, geo.cell_mode()),
        };
        let lines: Vec<Line> = (0..num_lines)
            .map(|id| Line::new(id, tier, blks_per_line, pgs_per_blk, nand_type, sub_lined))
            .collect();
        let pgs_per_line = lines.first().map(|l| l.pgs_per_line()).unwrap_or(0);
        let free = lines.iter().map(|l| l.id).collect();
        LineManager {
            pgs_per_line,
            blks_per_line,
            lines,
            free,
            full: Vec::new(),
            victim_pq: IndexedHeap::new(),
            victim_handles: vec![None; num_lines as usize],
            tier_full: false,
        }
    }

    pub fn line(&self, id: u32) -> &Line {
        &self.lines[id as usize]
    }

    pub fn line_mut(&mut self, id: u32) -> &mut Line {
        &mut self.lines[id as usize]
    }

    pub fn pgs_per_line(&self) -> u64 {
        self.pgs_per_line
    }

    pub fn blks_per_line(&self) -> usize {
        self.blks_per_line
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    /// Pops the head of the free list. Returns `None` and latches
    /// `tier_full` if the tier has no free lines left.
    pub fn get_next_free_line(&mut self) -> Option<u32> {
        match self.free.pop() {
            Some(id) => Some(id),
            None => {
                self.tier_full = true;
                None
            }
        }
    }

    /// Classifies a line that just had its write pointer exhausted: full if
    /// every page is valid, victim-eligible if some pages are invalid.
    /// Panics on a line with neither valid nor invalid pages, since such a
    /// line should never have left the free list unaccounted for.
    ///
    /// Returns `true` when the line entered the full list (the caller
    /// assigns it a `write_order` and, for pSLC, enqueues it in the
    /// migration FIFO).
    pub fn retire_from_write_pointer(&mut self, id: u32) -> bool {
        let line = &self.lines[id as usize];
        debug_assert_eq!(line.vpc + line.ipc, self.pgs_per_line as u32, "line counters out of range");
        if line.vpc == self.pgs_per_line as u32 {
            self.full.push(id);
            tracing::trace!(target: "ftl_lines::line", id, tier = ?line.tier, "line retired full");
            true
        } else if line.ipc > 0 {
            let handle = self.victim_pq.insert(line.vpc);
            self.victim_handles[id as usize] = Some(handle);
            false
        } else {
            panic!("line {id} retired with vpc={} ipc={} — contract violation", line.vpc, line.ipc);
        }
    }

    /// Notifies the manager that a page in `id` transitioned valid->invalid,
    /// keeping the victim priority queue's key current. No-op if the line
    /// isn't currently in the victim queue (e.g. still active / full).
    pub fn bump_invalid(&mut self, id: u32) {
        if let Some(handle) = self.victim_handles[id as usize] {
            let new_vpc = self.lines[id as usize].vpc;
            self.victim_pq.change_priority(handle, new_vpc);
        }
    }

    /// Pops the line with lowest `vpc` for relocation. `None` if the tier has
    /// no line awaiting GC.
    pub fn pop_victim(&mut self) -> Option<u32> {
        let (handle, _vpc) = self.victim_pq.pop()?;
        let id = self.victim_handles.iter().position(|h| *h == Some(handle))? as u32;
        self.victim_handles[id as usize] = None;
        Some(id)
    }

    pub fn victim_count(&self) -> usize {
        self.victim_pq.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn full_count(&self) -> usize {
        self.full.len()
    }

    /// Removes a line from the full list (used when the migrator pulls it
    /// out to relocate, ahead of `mark_line_free`).
    pub fn remove_from_full(&mut self, id: u32) {
        self.full.retain(|&x| x != id);
    }

    /// Returns a line to the free list and resets its counters. If the line
    /// is still held by a write pointer, the caller must zero that pointer
    /// instead of calling this — see `ftl-lines::wp`.
    pub fn mark_line_free(&mut self, id: u32) {
        if let Some(handle) = self.victim_handles[id as usize].take() {
            self.victim_pq.remove(handle);
        }
        self.full.retain(|&x| x != id);
        self.lines[id as usize].reset();
        self.free.push(id);
        self.tier_full = false;
    }

    /// Every line currently in the full list — used by the migrator's sweep
    /// for fully-invalidated pSLC lines (spec.md §4.11 step 6).
    pub fn full_lines(&self) -> &[u32] {
        &self.full
    }
}
