//! Device geometry and derived parameters (spec.md §4.1, §6).
//!
//! [`GeometryConfig`] is the raw, on-disk shape of a device description;
//! [`Geometry::build`] validates it and derives every page/block/line count
//! the rest of the workspace addresses NAND with. Nothing here issues I/O or
//! tracks device state — this crate is pure arithmetic over a fixed config,
//! the same role `core_config` plays for the teacher's editor settings.

mod config;
mod latency;

pub use config::{GeometryConfig, WriteBufferPolicy};
pub use latency::LatencyConfig;

use std::path::Path;

use ftl_types::NandType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read geometry config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse geometry config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("{field}: {value} is not a multiple of pg_size ({pg_size})")]
    NotPageAligned {
        field: &'static str,
        value: u64,
        pg_size: u64,
    },
    #[error("pages per normal block ({pgs_per_blk_normal}) is not divisible by {bits_per_cell} bits/cell for pSLC derivation")]
    PslcBlockNotDivisible {
        pgs_per_blk_normal: u64,
        bits_per_cell: u32,
    },
    #[error("zone_capacity ({zone_capacity}) exceeds zone_size ({zone_size})")]
    ZoneCapacityExceedsZoneSize { zone_capacity: u64, zone_size: u64 },
    #[error("{field} must be nonzero")]
    Zero { field: &'static str },
}

/// Loads a [`GeometryConfig`] from a TOML file on disk.
///
/// Mirrors the teacher's `core_config::load_from`: I/O and parse failures are
/// distinct variants so callers can tell "no such file" from "malformed
/// config" apart.
pub fn load_from(path: &Path) -> Result<GeometryConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let cfg = toml::from_str(&text)?;
    Ok(cfg)
}

/// Validated device geometry with every derived page/block/line count
/// pre-computed. Immutable once built; cheap to clone and share across the
/// scheduler, line manager, and L2P cache.
#[derive(Debug, Clone)]
pub struct Geometry {
    cfg: GeometryConfig,

    pub pgs_per_oneshot: u64,
    pub pslc_pgs_per_oneshot: u64,
    pub pgs_per_chunk: u64,
    pub pgs_per_zone: u64,
    pub zone_capacity_pgs: u64,
    pub pgs_per_flashpg: u64,
    pub write_unit_pgs: u64,

    pub blks_per_line: u64,
    pub pgs_per_blk_normal: u64,
    pub pgs_per_blk_pslc: u64,
    pub pgs_per_line_normal: u64,
    pub pgs_per_line_pslc: u64,
}

impl Geometry {
    pub fn build(cfg: GeometryConfig) -> Result<Geometry, GeometryError> {
        let pg_size = cfg.pg_size;
        if pg_size == 0 {
            return Err(GeometryError::Zero { field: "pg_size" });
        }

        let page_aligned = |field: &'static str, value: u64| -> Result<u64, GeometryError> {
            if value % pg_size != 0 {
                return Err(GeometryError::NotPageAligned {
                    field,
                    value,
                    pg_size,
                });
            }
            Ok(value / pg_size)
        };

        let pgs_per_oneshot = page_aligned("oneshot_page_size", cfg.oneshot_page_size)?;
        let pslc_pgs_per_oneshot = page_aligned("pslc_oneshot_page_size", cfg.pslc_oneshot_page_size)?;
        let pgs_per_chunk = page_aligned("chunk_size", cfg.chunk_size)?;
        let pgs_per_zone = page_aligned("zone_size", cfg.zone_size)?;
        let zone_capacity_pgs = page_aligned("zone_capacity", cfg.zone_capacity)?;
        let pgs_per_flashpg = page_aligned("flash_page_size", cfg.flash_page_size)?;
        let write_unit_pgs = page_aligned("write_unit_size", cfg.write_unit_size)?;

        if cfg.zone_capacity > cfg.zone_size {
            return Err(GeometryError::ZoneCapacityExceedsZoneSize {
                zone_capacity: cfg.zone_capacity,
                zone_size: cfg.zone_size,
            });
        }

        if cfg.nand_channels == 0 || cfg.luns_per_ch == 0 || cfg.plns_per_lun == 0 {
            return Err(GeometryError::Zero { field: "nand_channels/luns_per_ch/plns_per_lun" });
        }
        let blks_per_line =
            cfg.nand_channels as u64 * cfg.luns_per_ch as u64 * cfg.plns_per_lun as u64;

        let pgs_per_blk_normal = page_aligned("blk_size", cfg.blk_size)?;

        let bits_per_cell = cfg.cell_mode.bits_per_cell() as u64;
        if pgs_per_blk_normal % bits_per_cell != 0 {
            return Err(GeometryError::PslcBlockNotDivisible {
                pgs_per_blk_normal,
                bits_per_cell: bits_per_cell as u32,
            });
        }
        let pgs_per_blk_pslc = pgs_per_blk_normal / bits_per_cell;

        let pgs_per_line_normal = pgs_per_blk_normal * blks_per_line;
        let pgs_per_line_pslc = pgs_per_blk_pslc * blks_per_line;

        tracing::debug!(
            target: "ftl_geometry",
            blks_per_line,
            pgs_per_blk_normal,
            pgs_per_blk_pslc,
            pgs_per_oneshot,
            "geometry derived"
        );

        Ok(Geometry {
            cfg,
            pgs_per_oneshot,
            pslc_pgs_per_oneshot,
            pgs_per_chunk,
            pgs_per_zone,
            zone_capacity_pgs,
            pgs_per_flashpg,
            write_unit_pgs,
            blks_per_line,
            pgs_per_blk_normal,
            pgs_per_blk_pslc,
            pgs_per_line_normal,
            pgs_per_line_pslc,
        })
    }

    pub fn cfg(&self) -> &GeometryConfig {
        &self.cfg
    }

    pub fn latencies(&self) -> &LatencyConfig {
        &self.cfg.latencies
    }

    pub fn cell_mode(&self) -> NandType {
        self.cfg.cell_mode
    }

    /// Total number of logical pages addressable in the block namespace.
    pub fn total_lpns(&self) -> u64 {
        self.cfg.total_lpns
    }

    /// Host-visible capacity in bytes (`total_lpns * lba_size`).
    pub fn user_capacity_bytes(&self) -> u64 {
        self.cfg.total_lpns * self.cfg.lba_size
    }

    /// Number of blocks permanently reserved for the all-pSLC metadata
    /// namespace, i.e. never available to the block/zoned data path.
    pub fn reserved_pslc_blocks(&self) -> u64 {
        self.cfg.meta_pslc_init_blks as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cfg() -> GeometryConfig {
        toml::from_str(include_str!("../tests/fixtures/sample_geometry.toml")).unwrap()
    }

    #[test]
    fn builds_from_sample_config() {
        let geo = Geometry::build(sample_cfg()).expect("valid geometry");
        assert_eq!(geo.blks_per_line, 4 * 2 * 1);
        assert_eq!(geo.pgs_per_blk_normal, geo.pgs_per_blk_pslc * geo.cell_mode().bits_per_cell() as u64);
    }

    #[test]
    fn rejects_misaligned_zone_size() {
        let mut cfg = sample_cfg();
        cfg.zone_size = cfg.pg_size + 1;
        let err = Geometry::build(cfg).unwrap_err();
        assert!(matches!(err, GeometryError::NotPageAligned { field: "zone_size", .. }));
    }

    #[test]
    fn rejects_zone_capacity_over_zone_size() {
        let mut cfg = sample_cfg();
        cfg.zone_capacity = cfg.zone_size + cfg.pg_size;
        let err = Geometry::build(cfg).unwrap_err();
        assert!(matches!(err, GeometryError::ZoneCapacityExceedsZoneSize { .. }));
    }

    #[test]
    fn capacity_arithmetic() {
        let geo = Geometry::build(sample_cfg()).unwrap();
        assert_eq!(geo.user_capacity_bytes(), geo.total_lpns() * geo.cfg().lba_size);
    }
}
