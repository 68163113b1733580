//! Foreground garbage collection and pSLC→normal migration (spec.md §4.10,
//! §4.11). Built on `ftl-lines`' line/migration-queue bookkeeping, `ftl-l2p`'s
//! flat map, and `ftl-timing`'s scheduler; owns none of that state itself —
//! `ftl-core` holds the real per-namespace instances and calls through.

mod batch;
pub mod credits;
pub mod gc;
pub mod migrate;
pub mod thresholds;

pub use credits::WriteCredits;
pub use gc::{foreground_gc, relocate_and_erase, GcResult};
pub use migrate::{do_migrate, MigrateResult};
pub use thresholds::{should_gc_high, should_migrate_low, GC_THRES_LINES_HIGH, MIGRATE_THRES_LINES_LOW};
