//! GC/migration trigger thresholds (spec.md §4.10/§4.11).

/// Foreground GC on a tier is due once its free-line count drops to this
/// many lines or fewer.
pub const GC_THRES_LINES_HIGH: usize = 2;

/// pSLC→normal migration is due once the pSLC free-line count drops to this
/// many lines or fewer.
pub const MIGRATE_THRES_LINES_LOW: usize = 2;

pub fn should_gc_high(free_line_cnt: usize) -> bool {
    free_line_cnt <= GC_THRES_LINES_HIGH
}

pub fn should_migrate_low(pslc_free_line_cnt: usize) -> bool {
    pslc_free_line_cnt <= MIGRATE_THRES_LINES_LOW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert!(should_gc_high(2));
        assert!(!should_gc_high(3));
        assert!(should_migrate_low(2));
        assert!(!should_migrate_low(3));
    }
}
