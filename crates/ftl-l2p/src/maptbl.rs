//! The flat logical→physical map and multi-granularity unit-start
//! arithmetic (spec.md §4.5).

use ftl_geometry::Geometry;
use ftl_types::{Lpn, MapGranularity, Ppa};

/// `maptbl[lpn] -> ppa`, `Ppa::UNMAPPED` for an unmapped LPN. One instance
/// per namespace; sized to that namespace's total LPN count.
pub struct MapTable {
    tbl: Vec<Ppa>,
}

impl MapTable {
    pub fn new(total_lpns: u64) -> Self {
        MapTable {
            tbl: vec![Ppa::UNMAPPED; total_lpns as usize],
        }
    }

    pub fn get(&self, lpn: Lpn) -> Ppa {
        self.tbl[lpn.0 as usize]
    }

    pub fn set(&mut self, lpn: Lpn, ppa: Ppa) {
        self.tbl[lpn.0 as usize] = ppa;
    }

    pub fn unmap(&mut self, lpn: Lpn) {
        self.tbl[lpn.0 as usize] = Ppa::UNMAPPED;
    }

    pub fn len(&self) -> u64 {
        self.tbl.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.tbl.is_empty()
    }
}

/// Rounds `lpn` down to the start of its mapping unit at `gran`. `Page`
/// granularity is an identity; `Chunk`/`Zone`/`SubZone` round to the
/// corresponding pages-per-unit boundary (spec.md §4.5: "for a given zone or
/// LPN, `start_lpn(lpn, gran)` rounds `lpn` down to the unit boundary").
pub fn start_lpn(geo: &Geometry, lpn: Lpn, gran: MapGranularity) -> Lpn {
    let unit = match gran {
        MapGranularity::Page => 1,
        MapGranularity::Chunk => geo.pgs_per_chunk,
        MapGranularity::Zone => geo.pgs_per_zone,
        MapGranularity::SubZone => geo.pgs_per_line_pslc,
    };
    Lpn((lpn.0 / unit) * unit)
}

/// The granularity scan order `map_read` walks on a cache miss: coarsest
/// first so a single hit can resolve an entire zone/chunk at once, falling
/// back to `Page` (spec.md §4.5).
pub const GRANULARITY_SCAN_ORDER: [MapGranularity; 4] = [
    MapGranularity::Zone,
    MapGranularity::SubZone,
    MapGranularity::Chunk,
    MapGranularity::Page,
];

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
    fn page_granularity_is_identity() {
        let geo = geo();
        assert_eq!(start_lpn(&geo, Lpn(7), MapGranularity::Page), Lpn(7));
    }

    #[test]
    fn chunk_granularity_rounds_down() {
        let geo = geo();
        let lpn = Lpn(geo.pgs_per_chunk + 1);
        assert_eq!(start_lpn(&geo, lpn, MapGranularity::Chunk), Lpn(geo.pgs_per_chunk));
    }

    #[test]
    fn unmapped_roundtrip() {
        let mut tbl = MapTable::new(4);
        assert!(tbl.get(Lpn(0)).is_unmapped());
        tbl.set(Lpn(0), Ppa::new_mapped(1, 1, 1, 1, 1, MapGranularity::Page));
        assert!(!tbl.get(Lpn(0)).is_unmapped());
        tbl.unmap(Lpn(0));
        assert!(tbl.get(Lpn(0)).is_unmapped());
    }
}
