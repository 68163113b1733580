//! Buffer selection (`__wb_get`, spec.md §4.6).

use ftl_geometry::WriteBufferPolicy;

use crate::buffer::WriteBuffer;

/// Owns every write buffer for one namespace. Selection depends on the
/// namespace kind and the configured policy:
/// - a single shared SSD-wide buffer when `spp.write_buffer_size > 0`
///   (modeled here as `nr_wb == 1` with `shared == true`)
/// - zoned + `Static`: sticky per-zone assignment, falling back to an idle
///   buffer, falling back to stealing the least-recently-active buffer
/// - zoned + `Mod`: `zid mod nr_wb`
/// - block namespace: the single buffer
pub struct WriteBufferPool {
    buffers: Vec<WriteBuffer>,
    policy: WriteBufferPolicy,
    shared: bool,
}

impl WriteBufferPool {
    pub fn new(nr_wb: u32, capacity_pgs: u32, policy: WriteBufferPolicy, shared: bool) -> Self {
        WriteBufferPool {
            buffers: (0..nr_wb.max(1)).map(|_| WriteBuffer::new(capacity_pgs)).collect(),
            policy,
            shared,
        }
    }

    pub fn get(&self, idx: usize) -> &WriteBuffer {
        &self.buffers[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut WriteBuffer {
        &mut self.buffers[idx]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WriteBuffer> {
        self.buffers.iter_mut()
    }

    /// Picks the buffer index a write targeting `zid` should stage into, or
    /// `None` if the write must be rejected (soft backpressure: no idle
    /// buffer, or the live buffer belongs to another zone and isn't flushing
    /// yet — spec.md §4.6 / §5 "two retry triggers").
    pub fn select(&self, zid: i64, block_namespace: bool) -> Option<usize> {
        if self.shared || block_namespace || self.buffers.len() == 1 {
            let buf = &self.buffers[0];
            return if buf.can_accept(zid) || buf.is_idle() {
                Some(0)
            } else {
                None
            };
        }

        match self.policy {
            WriteBufferPolicy::Mod => {
                let idx = (zid.rem_euclid(self.buffers.len() as i64)) as usize;
                let buf = &self.buffers[idx];
                if buf.can_accept(zid) {
                    Some(idx)
                } else {
                    None
                }
            }
            WriteBufferPolicy::Static => {
                if let Some(idx) = self.buffers.iter().position(|b| b.zid == zid && !b.flushing) {
                    return Some(idx);
                }
                if let Some(idx) = self.buffers.iter().position(|b| b.is_idle()) {
                    return Some(idx);
                }
                if self.buffers.iter().all(|b| !b.flushing) {
                    return self
                        .buffers
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, b)| b.pgs())
                        .map(|(idx, _)| idx);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::Lpn;

    #[test]
    fn mod_policy_is_deterministic() {
        let pool = WriteBufferPool::new(4, 8, WriteBufferPolicy::Mod, false);
        assert_eq!(pool.select(5, false), Some(1));
        assert_eq!(pool.select(8, false), Some(0));
    }

    #[test]
    fn static_policy_prefers_sticky_buffer() {
        let mut pool = WriteBufferPool::new(2, 8, WriteBufferPolicy::Static, false);
        pool.get_mut(0).push(Lpn(0), 3);
        assert_eq!(pool.select(3, false), Some(0));
    }

    #[test]
    fn static_policy_rejects_when_only_busy_other_zone_buffer() {
        let mut pool = WriteBufferPool::new(1, 1, WriteBufferPolicy::Static, false);
        pool.get_mut(0).push(Lpn(0), 3);
        assert_eq!(pool.select(7, false), None);
    }

    #[test]
    fn block_namespace_always_uses_single_buffer() {
        let pool = WriteBufferPool::new(4, 8, WriteBufferPolicy::Mod, false);
        assert_eq!(pool.select(-1, true), Some(0));
    }
}
