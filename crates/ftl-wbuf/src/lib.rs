//! Write buffering: per-zone/shared staging and flush-target selection
//! (spec.md §3 "Write buffer", §4.6). Aggregation against GC/migration
//! remainders (`zone_agg`, `gc_agg_lpns`) lives in `ftl-gc`/`ftl-core`, which
//! own the zone-keyed state this crate's buffers feed into.

pub mod buffer;
pub mod pool;

pub use buffer::WriteBuffer;
pub use pool::WriteBufferPool;

/// Where a flush should land (spec.md §4.6 `get_flush_target_location`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTarget {
    Pslc,
    Normal,
}

/// Decides a flush's destination tier.
///
/// - meta namespace always goes to pSLC
/// - `slc_bypass` disabled forces pSLC
/// - `normal_only` forces normal
/// - otherwise: normal only if the zone's pending aggregator plus this
///   flush would complete a normal-tier oneshot page; pSLC otherwise
#[allow(clippy::too_many_arguments)]
pub fn flush_target(
    is_meta_namespace: bool,
    slc_bypass: bool,
    normal_only: bool,
    agg_pending_pgs: u64,
    flush_pgs: u64,
    normal_pgs_per_oneshot: u64,
) -> FlushTarget {
    if is_meta_namespace || !slc_bypass {
        return FlushTarget::Pslc;
    }
    if normal_only {
        return FlushTarget::Normal;
    }
    if (agg_pending_pgs + flush_pgs) >= normal_pgs_per_oneshot {
        tracing::trace!(target: "ftl_wbuf", agg_pending_pgs, flush_pgs, "flush aggregator fills a normal oneshot unit");
        FlushTarget::Normal
    } else {
        FlushTarget::Pslc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_namespace_always_pslc() {
        assert_eq!(flush_target(true, true, false, 100, 100, 4), FlushTarget::Pslc);
    }

    #[test]
    fn slc_bypass_disabled_forces_pslc() {
        assert_eq!(flush_target(false, false, false, 100, 100, 4), FlushTarget::Pslc);
    }

    #[test]
    fn normal_only_forces_normal() {
        assert_eq!(flush_target(false, true, true, 0, 1, 4), FlushTarget::Normal);
    }

    #[test]
    fn enough_aggregated_pages_goes_normal() {
        assert_eq!(flush_target(false, true, false, 3, 1, 4), FlushTarget::Normal);
        assert_eq!(flush_target(false, true, false, 1, 1, 4), FlushTarget::Pslc);
    }
}
