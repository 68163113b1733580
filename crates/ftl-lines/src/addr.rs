//! Dense global page-index arithmetic (spec.md §4.3).

use ftl_geometry::Geometry;
use ftl_types::{Ppa, Tier};

/// Derives the dense physical page index honoring the interleaved
/// channel/LUN layout: pages within one "stripe" (one `pg` value across every
/// channel/LUN/plane) are contiguous, and stripes advance by `pgs_per_oneshot`.
pub fn ppa_to_pgidx(geo: &Geometry, tier: Tier, parent_line_id: u32, ppa: Ppa) -> u64 {
    let cfg = geo.cfg();
    let nchs = cfg.nand_channels as u64;
    let luns = cfg.luns_per_ch as u64;
    let pgs_per_oneshot = match tier {
        Tier::Pslc => geo.pslc_pgs_per_oneshot,
        Tier::Normal => geo.pgs_per_oneshot,
    };
    let pgs_per_line = match tier {
        Tier::Pslc => geo.pgs_per_line_pslc,
        Tier::Normal => geo.pgs_per_line_normal,
    };

    let pg = ppa.pg() as u64;
    let ch = ppa.ch() as u64;
    let lun = ppa.lun() as u64;

    parent_line_id as u64 * pgs_per_line
        + (pg / pgs_per_oneshot) * pgs_per_oneshot * nchs * luns
        + (lun * nchs + ch) * pgs_per_oneshot
        + (pg % pgs_per_oneshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        let cfg: ftl_geometry::GeometryConfig =
            toml::from_str(include_str!("../../ftl-geometry/tests/fixtures/sample_geometry.toml"))
                .unwrap();
        Geometry::build(cfg).unwrap()
    }

    #[test]
    fn first_page_of_first_line_is_zero() {
        let geo = geo();
        let ppa = Ppa::new_mapped(0, 0, 0, 0, 0, ftl_types::MapGranularity::Page);
        assert_eq!(ppa_to_pgidx(&geo, Tier::Normal, 0, ppa), 0);
    }

    #[test]
    fn second_line_offsets_by_pgs_per_line() {
        let geo = geo();
        let ppa = Ppa::new_mapped(0, 0, 0, 0, 0, ftl_types::MapGranularity::Page);
        assert_eq!(
            ppa_to_pgidx(&geo, Tier::Normal, 1, ppa),
            geo.pgs_per_line_normal
        );
    }
}
