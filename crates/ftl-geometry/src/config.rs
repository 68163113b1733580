//! Raw, on-disk geometry configuration (spec.md §6 "Geometry configuration").
//!
//! Deserialized straight from TOML with `serde`; [`crate::Geometry::build`]
//! validates it and derives every quantity the rest of the workspace needs
//! (pages-per-line, pages-per-oneshot, ...). Mirrors the teacher's
//! `core_config::Config` + `load_from` split between "what was written on
//! disk" and "what the running program actually uses".

use crate::latency::LatencyConfig;
use serde::Deserialize;

/// Write-buffer-to-zone assignment policy (spec.md §4.6, §6 `WB_MGNT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteBufferPolicy {
    Static,
    Mod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryConfig {
    pub nand_channels: u32,
    pub luns_per_ch: u32,
    pub plns_per_lun: u32,
    pub blks_per_pln: u32,

    pub blk_size: u64,
    pub flash_page_size: u64,
    pub oneshot_page_size: u64,
    pub pslc_oneshot_page_size: u64,
    pub lba_size: u64,
    pub pg_size: u64,

    pub cell_mode: ftl_types::NandType,

    pub zone_size: u64,
    pub zone_capacity: u64,
    pub chunk_size: u64,
    pub dies_per_zone: u32,

    /// Minimum granularity a zoned write must align to (spec.md §4.13,
    /// §7 "misaligned to `write_unit_size`").
    pub write_unit_size: u64,

    pub zone_wb_size: u64,
    pub global_wb_size: u64,

    pub l2p_cache_size: u64,
    pub l2p_entry_size: u64,
    pub l2p_cache_hash_slot: u32,

    pub pslc_init_blks: u32,
    pub meta_pslc_init_blks: u32,
    pub data_pslc_init_blks: u32,

    pub wb_mgnt: WriteBufferPolicy,
    pub slc_bypass: bool,
    pub normal_only: bool,
    pub zoned_slc: bool,
    pub l2p_hybrid_map: bool,
    pub l2p_hybrid_map_resident: bool,
    pub l2p_preread: u32,

    pub max_ch_xfer_size: u64,
    /// Bytes/second.
    pub nand_channel_bandwidth: u64,
    /// Bytes/second.
    pub pcie_bandwidth: u64,
    pub fw_pg_rd_latency_ns: u64,
    pub fw_pg_wr_latency_ns: u64,
    pub fw_ch_xfer_latency_ns: u64,

    /// Total addressable LPNs for the block namespace (see DESIGN.md:
    /// the original derives this from the capacity-planning CLI, which is
    /// explicitly out of scope; here it is a direct, validated input).
    pub total_lpns: u64,

    pub latencies: LatencyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample_toml() -> &'static str {
        include_str!("../tests/fixtures/sample_geometry.toml")
    }

    #[test]
    fn parses_sample_config() {
        let cfg: GeometryConfig = toml::from_str(sample_toml()).expect("valid toml");
        assert_eq!(cfg.nand_channels, 4);
        assert_eq!(cfg.wb_mgnt, WriteBufferPolicy::Static);
    }
}
