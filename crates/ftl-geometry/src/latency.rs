//! Per-cell-mode / per-cell-type NAND latency tables.

use ftl_types::{CellType, NandType};

fn nand_idx(n: NandType) -> usize {
    match n {
        NandType::Slc => 0,
        NandType::Mlc => 1,
        NandType::Tlc => 2,
        NandType::Qlc => 3,
    }
}

fn cell_idx(c: CellType) -> usize {
    match c {
        CellType::Lsb => 0,
        CellType::Msb => 1,
        CellType::Csb => 2,
        CellType::Tsb => 3,
    }
}

/// Nanosecond latency constants, one entry per `(nand_type, cell_type)` or
/// per `nand_type` as the hardware recipe in spec.md §4.2 requires.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LatencyConfig {
    /// Full logical-page read latency, indexed `[nand_type][cell_type]`.
    pub pg_rd_lat_ns: [[u64; 4]; 4],
    /// Read latency used when `xfer_size == 4096` (spec.md §4.2), same indexing.
    pub pg_rd_lat_4kib_ns: [[u64; 4]; 4],
    /// Program latency, indexed by `nand_type` only (a program always writes a full page).
    pub pg_wr_lat_ns: [u64; 4],
    /// Block erase latency, indexed by `nand_type`.
    pub blk_er_lat_ns: [u64; 4],
}

impl LatencyConfig {
    pub fn pg_rd_lat(&self, nand_type: NandType, cell_type: CellType, xfer_size: u64) -> u64 {
        let table = if xfer_size == 4096 {
            &self.pg_rd_lat_4kib_ns
        } else {
            &self.pg_rd_lat_ns
        };
        table[nand_idx(nand_type)][cell_idx(cell_type)]
    }

    pub fn pg_wr_lat(&self, nand_type: NandType) -> u64 {
        self.pg_wr_lat_ns[nand_idx(nand_type)]
    }

    pub fn blk_er_lat(&self, nand_type: NandType) -> u64 {
        self.blk_er_lat_ns[nand_idx(nand_type)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LatencyConfig {
        LatencyConfig {
            pg_rd_lat_ns: [[40_000; 4]; 4],
            pg_rd_lat_4kib_ns: [[25_000; 4]; 4],
            pg_wr_lat_ns: [100_000, 300_000, 600_000, 900_000],
            blk_er_lat_ns: [1_000_000, 2_000_000, 3_000_000, 4_000_000],
        }
    }

    #[test]
    fn picks_4kib_table_on_exact_size() {
        let lat = sample();
        assert_eq!(lat.pg_rd_lat(NandType::Tlc, CellType::Lsb, 4096), 25_000);
        assert_eq!(lat.pg_rd_lat(NandType::Tlc, CellType::Lsb, 16384), 40_000);
    }

    #[test]
    fn per_nand_type_write_and_erase() {
        let lat = sample();
        assert_eq!(lat.pg_wr_lat(NandType::Slc), 100_000);
        assert_eq!(lat.blk_er_lat(NandType::Qlc), 4_000_000);
    }
}
