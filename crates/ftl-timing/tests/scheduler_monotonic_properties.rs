//! Property test for spec.md §8 invariant 6 (monotonic time): for any LUN,
//! successive completion times never precede the command's own submission
//! time, and back-to-back writes submitted in non-decreasing `stime` order
//! to the same LUN never complete out of order.

use ftl_geometry::{Geometry, GeometryConfig};
use ftl_timing::{NandCmd, Scheduler};
use ftl_types::{CellType, CmdKind, IoType, MapGranularity, Ppa};
use proptest::prelude::*;

fn geo() -> Geometry {
    let cfg: GeometryConfig =
        toml::from_str(include_str!("../../ftl-geometry/tests/fixtures/sample_geometry.toml")).unwrap();
    Geometry::build(cfg).unwrap()
}

proptest! {
    #[test]
    fn completion_time_never_precedes_submission_and_stays_ordered(
        gaps in prop::collection::vec(0u64..5_000_000, 1..20),
    ) {
        let geo = geo();
        let mut sched = Scheduler::new(&geo);
        let ppa = Ppa::new_mapped(0, 0, 0, 0, 0, MapGranularity::Page);

        let mut stime = 0u64;
        let mut last_ctime = 0u64;
        for gap in gaps {
            stime += gap;
            let cmd = NandCmd::new(CmdKind::Write, IoType::UserIo, ppa, geo.cell_mode(), CellType::Lsb, 4096, stime);
            let ctime = sched.advance(&geo, cmd);
            prop_assert!(ctime >= stime, "ctime {ctime} < stime {stime}");
            prop_assert!(ctime >= last_ctime, "completion times went backwards: {ctime} < {last_ctime}");
            last_ctime = ctime;
        }
    }
}
