//! A single write-buffer: fixed-capacity staging for LPNs awaiting a flush
//! to NAND (spec.md §3 "Write buffer", §4.6).

use ftl_types::Lpn;

#[derive(Debug, Clone)]
pub struct WriteBuffer {
    capacity_pgs: u32,
    lpns: Vec<Lpn>,
    /// `-1` means unassigned (spec.md: "`zid = -1` means unassigned").
    pub zid: i64,
    pub flushing: bool,
    pub sqid: u32,
    /// Absolute time the in-flight flush was submitted at; meaningful only
    /// while `flushing`.
    pub time: u64,
}

impl WriteBuffer {
    pub fn new(capacity_pgs: u32) -> Self {
        WriteBuffer {
            capacity_pgs,
            lpns: Vec::new(),
            zid: -1,
            flushing: false,
            sqid: 0,
            time: 0,
        }
    }

    pub fn capacity_pgs(&self) -> u32 {
        self.capacity_pgs
    }

    pub fn pgs(&self) -> usize {
        self.lpns.len()
    }

    pub fn lpns(&self) -> &[Lpn] {
        &self.lpns
    }

    pub fn is_idle(&self) -> bool {
        !self.flushing && self.zid == -1 && self.lpns.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lpns.len() as u32 >= self.capacity_pgs
    }

    /// Can this write, targeting `zid` (-1 for the block namespace, which
    /// never contends on zone identity), be staged here right now?
    pub fn can_accept(&self, zid: i64) -> bool {
        !self.flushing && (self.zid == -1 || self.zid == zid || zid == -1)
    }

    /// Appends `lpn`, claiming the buffer for `zid` if it was unassigned.
    /// Returns `false` if the buffer is already full.
    pub fn push(&mut self, lpn: Lpn, zid: i64) -> bool {
        if self.is_full() {
            return false;
        }
        if self.zid == -1 {
            self.zid = zid;
        }
        self.lpns.push(lpn);
        true
    }

    /// Removes every LPN in `matched` from the buffer while preserving the
    /// order of what remains (spec.md §4.12 zone-reset compaction). Returns
    /// the count removed, used to compute `bytes_to_release`.
    pub fn compact_remove(&mut self, matched: impl Fn(Lpn) -> bool) -> usize {
        let before = self.lpns.len();
        self.lpns.retain(|&lpn| !matched(lpn));
        before - self.lpns.len()
    }

    /// Begins a flush: drains every staged LPN out (caller issues the NAND
    /// writes for them) and re-marks the buffer per spec.md §4.6 step 6:
    /// `flushing=true, pgs=0, flush_data=0, zid=-1`. The capacity is only
    /// truly returned to callers once [`WriteBuffer::release`] runs at the
    /// flush's scheduled completion time.
    pub fn start_flush(&mut self, stime: u64, sqid: u32) -> Vec<Lpn> {
        let drained = std::mem::take(&mut self.lpns);
        self.flushing = true;
        self.zid = -1;
        self.time = stime;
        self.sqid = sqid;
        drained
    }

    /// Clears the in-flight flag, completing the release callback the
    /// upstream shim schedules at the flush's completion time.
    pub fn release(&mut self) {
        self.flushing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_claims_unassigned_buffer() {
        let mut buf = WriteBuffer::new(4);
        assert!(buf.is_idle());
        buf.push(Lpn(1), 7);
        assert_eq!(buf.zid, 7);
        assert!(!buf.is_idle());
    }

    #[test]
    fn full_buffer_rejects_push() {
        let mut buf = WriteBuffer::new(1);
        assert!(buf.push(Lpn(1), 0));
        assert!(!buf.push(Lpn(2), 0));
    }

    #[test]
    fn start_flush_drains_and_resets() {
        let mut buf = WriteBuffer::new(2);
        buf.push(Lpn(1), 5);
        buf.push(Lpn(2), 5);
        let drained = buf.start_flush(100, 3);
        assert_eq!(drained, vec![Lpn(1), Lpn(2)]);
        assert!(buf.flushing);
        assert_eq!(buf.zid, -1);
        assert_eq!(buf.pgs(), 0);
    }

    #[test]
    fn compact_preserves_order_of_remainder() {
        let mut buf = WriteBuffer::new(8);
        for i in 0..5u64 {
            buf.push(Lpn(i), 1);
        }
        let removed = buf.compact_remove(|lpn| lpn.0 < 3);
        assert_eq!(removed, 3);
        assert_eq!(buf.lpns(), &[Lpn(3), Lpn(4)]);
    }
}
