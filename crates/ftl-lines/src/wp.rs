//! Write pointers and the page allocator built on top of [`crate::line`]
//! (spec.md §4.4).

use ftl_geometry::Geometry;
use ftl_types::{MapGranularity, Ppa, Tier};

use crate::line::LineManager;

/// Index of a physical block within a line's flat `blocks` array: planes are
/// the outermost axis, then LUN, then channel, matching the order the write
/// pointer rotates through.
pub fn blk_idx(cfg: &ftl_geometry::GeometryConfig, ch: u8, lun: u8, pl: u8) -> usize {
    let nchs = cfg.nand_channels as usize;
    let luns = cfg.luns_per_ch as usize;
    (pl as usize * luns + lun as usize) * nchs + ch as usize
}

/// Inverse of [`blk_idx`]: recovers the `(ch, lun, pl)` die coordinates a
/// flat block-within-line index was built from. Every caller that walks a
/// line block-by-block (erase, GC/migration relocation) needs this to
/// address the die it is actually operating on, rather than assuming
/// `(ch=0, lun=0, pl=0)` for every block.
pub fn die_coords(cfg: &ftl_geometry::GeometryConfig, idx: usize) -> (u8, u8, u8) {
    let nchs = cfg.nand_channels as usize;
    let luns = cfg.luns_per_ch as usize;
    let ch = idx % nchs;
    let rem = idx / nchs;
    let lun = rem % luns;
    let pl = rem / luns;
    (ch as u8, lun as u8, pl as u8)
}

/// Outcome of an `allocate_page` call that exhausted the current line.
#[derive(Debug, Clone, Copy)]
pub struct RetiredLine {
    pub line_id: u32,
    pub tier: Tier,
    /// `true` if the line went to the full list (every page valid); `false`
    /// if it went to the victim priority queue instead.
    pub became_full: bool,
}

/// One `allocate_page` result: the physical page handed out, which block
/// slot it occupies (for `Line::program`/`invalidate`), and whether this
/// allocation retired the line it was drawn from.
#[derive(Debug, Clone, Copy)]
pub struct PageAlloc {
    pub ppa: Ppa,
    pub blk_idx: usize,
    pub retired: Option<RetiredLine>,
}

/// Cursor through one tier's interleaved address space: channel is the
/// fastest-moving axis, then LUN, then plane, then page — one full page
/// across every channel/LUN/plane ("a stripe") is handed out before `pg`
/// advances. When `sub_block` is `Some`, the pointer instead stays pinned to
/// one die and only `pg` advances (spec.md §3 "sub-lined parent").
#[derive(Debug, Clone)]
pub struct WritePointer {
    tier: Tier,
    line: Option<u32>,
    sub_block: Option<(u8, u8, u8)>,
    ch: u8,
    lun: u8,
    pl: u8,
    pg: u16,
}

impl WritePointer {
    pub fn new(tier: Tier) -> Self {
        WritePointer {
            tier,
            line: None,
            sub_block: None,
            ch: 0,
            lun: 0,
            pl: 0,
            pg: 0,
        }
    }

    /// A write pointer that only ever addresses a single die's block within
    /// whatever line it is pointed at (spec.md §3 sub-lined addressing).
    pub fn new_sub_block(tier: Tier, ch: u8, lun: u8, pl: u8) -> Self {
        WritePointer {
            tier,
            line: None,
            sub_block: Some((ch, lun, pl)),
            ch,
            lun,
            pl,
            pg: 0,
        }
    }

    pub fn current_line(&self) -> Option<u32> {
        self.line
    }

    /// True if this pointer is the one holding `line_id` — callers must zero
    /// the pointer instead of re-listing the line in that case (spec.md
    /// §4.4, `mark_line_free`).
    pub fn holds_line(&self, line_id: u32) -> bool {
        self.line == Some(line_id)
    }

    /// Points this pointer at an already-allocated free line (used when a
    /// line is pulled out-of-band, e.g. by the migrator).
    pub fn bind(&mut self, line_id: u32) {
        self.line = Some(line_id);
        if let Some((ch, lun, pl)) = self.sub_block {
            self.ch = ch;
            self.lun = lun;
            self.pl = pl;
        } else {
            self.ch = 0;
            self.lun = 0;
            self.pl = 0;
        }
        self.pg = 0;
    }

    /// Zeroes the pointer; used when the line it was pointing at is reclaimed
    /// out from under it (e.g. a zone reset erasing a still-open line).
    pub fn zero(&mut self) {
        self.line = None;
        self.pg = 0;
        if let Some((ch, lun, pl)) = self.sub_block {
            self.ch = ch;
            self.lun = lun;
            self.pl = pl;
        } else {
            self.ch = 0;
            self.lun = 0;
            self.pl = 0;
        }
    }

    /// Returns the next free PPA to program (already marked `valid` in the
    /// line's block counters), pulling a new line from `lines` when the
    /// current one fills (or is uninitialized), and retiring an exhausted
    /// line into the full list / victim queue. Returns `None` if the tier
    /// has no free line left to allocate into.
    pub fn allocate_page(&mut self, geo: &Geometry, lines: &mut LineManager) -> Option<PageAlloc> {
        if self.line.is_none() {
            let id = lines.get_next_free_line()?;
            self.bind(id);
        }
        let line_id = self.line.expect("just ensured Some");
        let cfg = geo.cfg();
        let bidx = blk_idx(cfg, self.ch, self.lun, self.pl);

        lines.line_mut(line_id).program(bidx, self.pg);
        let ppa = Ppa::new_mapped(self.ch, self.lun, self.pl, line_id as u16, self.pg, MapGranularity::Page);

        let pgs_per_blk = match self.tier {
            Tier::Pslc => geo.pgs_per_blk_pslc,
            Tier::Normal => geo.pgs_per_blk_normal,
        };

        let mut retired = None;

        if self.sub_block.is_some() {
            self.pg += 1;
            if self.pg as u64 >= pgs_per_blk {
                retired = self.retire_and_advance(lines, line_id);
            }
        } else {
            self.ch += 1;
            if self.ch as u32 >= cfg.nand_channels {
                self.ch = 0;
                self.lun += 1;
                if self.lun as u32 >= cfg.luns_per_ch {
                    self.lun = 0;
                    self.pl += 1;
                    if self.pl as u32 >= cfg.plns_per_lun {
                        self.pl = 0;
                        self.pg += 1;
                        if self.pg as u64 >= pgs_per_blk {
                            retired = self.retire_and_advance(lines, line_id);
                        }
                    }
                }
            }
        }

        Some(PageAlloc {
            ppa,
            blk_idx: bidx,
            retired,
        })
    }

    fn retire_and_advance(&mut self, lines: &mut LineManager, line_id: u32) -> Option<RetiredLine> {
        let became_full = lines.retire_from_write_pointer(line_id);
        match lines.line(line_id).rsv_nextline {
            Some(next) => {
                self.line = Some(next);
                self.pg = 0;
            }
            None => self.line = None,
        }
        Some(RetiredLine {
            line_id,
            tier: self.tier,
            became_full,
        })
    }
}
