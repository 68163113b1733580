//! Demo/harness entrypoint: loads a device description (geometry + namespace
//! sizing) and a scripted host command trace, replays the trace through
//! [`ftl_core::Ftl`], and prints each command's completion status/time plus
//! a final telemetry snapshot. Not the excluded capacity-planning CLI — a
//! thin operational entrypoint comparable to the teacher's `ox-bin`, minus
//! the interactive terminal loop this simulator has no use for.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use ftl_core::{BlockNamespace, Ftl, MetaNamespace, ZonedNamespace};
use ftl_geometry::{Geometry, GeometryConfig};
use ftl_proto::{telemetry_snapshot, CommandIn, Namespace, OpKind, Status, ZoneSendAction};
use ftl_types::{IoType, Lpn};

/// Whole contents of one trace file: the device's geometry, how big to size
/// each namespace's line/buffer pools, and the commands to replay.
#[derive(Debug, Deserialize)]
struct SimFile {
    geometry: GeometryConfig,
    device: DeviceSizing,
    commands: Vec<TraceCommand>,
}

#[derive(Debug, Deserialize)]
struct DeviceSizing {
    meta_total_lpns: u64,
    meta_pslc_lines: u32,
    block_pslc_lines: u32,
    block_normal_lines: u32,
    block_num_wb: u32,
    zoned_num_zones: u32,
    zoned_max_open: u32,
    zoned_max_active: u32,
    zoned_num_wb: u32,
}

#[derive(Debug, Deserialize)]
struct TraceCommand {
    namespace: String,
    op: String,
    slba: u64,
    #[serde(default)]
    nlb: u32,
    #[serde(default)]
    io_type: Option<String>,
    #[serde(default)]
    force_flush: bool,
    #[serde(default)]
    zone_action: Option<String>,
    #[serde(default)]
    sqid: u32,
    nsecs_start: u64,
}

fn parse_namespace(s: &str) -> Result<Namespace> {
    Ok(match s {
        "meta" | "conzone_meta" => Namespace::ConzoneMeta,
        "block" | "conzone_block" => Namespace::ConzoneBlock,
        "zoned" | "conzone_zoned" => Namespace::ConzoneZoned,
        other => bail!("unknown namespace {other:?}"),
    })
}

fn parse_op(s: &str) -> Result<OpKind> {
    Ok(match s {
        "read" => OpKind::Read,
        "write" => OpKind::Write,
        "append" => OpKind::Append,
        "flush" => OpKind::Flush,
        "zone_mgmt_send" => OpKind::ZoneMgmtSend,
        "zone_mgmt_recv" => OpKind::ZoneMgmtRecv,
        other => bail!("unknown op {other:?}"),
    })
}

fn parse_io_type(s: Option<&str>) -> IoType {
    match s {
        Some("gc") => IoType::GcIo,
        Some("migrate") => IoType::MigrateIo,
        Some("map_read") => IoType::MapRead,
        _ => IoType::UserIo,
    }
}

fn parse_zone_action(s: Option<&str>) -> Result<Option<ZoneSendAction>> {
    Ok(match s {
        None => None,
        Some("open") => Some(ZoneSendAction::Open),
        Some("close") => Some(ZoneSendAction::Close),
        Some("finish") => Some(ZoneSendAction::Finish),
        Some("reset") => Some(ZoneSendAction::Reset),
        Some("offline") => Some(ZoneSendAction::OfflineAction),
        Some(other) => bail!("unknown zone_action {other:?}"),
    })
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Success => "success",
        Status::CapExceeded => "cap_exceeded",
        Status::ZnsBoundary => "zns_boundary",
        Status::ZnsInvalidWrite => "zns_invalid_write",
        Status::ZnsErrFull => "zns_err_full",
        Status::ZnsErrReadOnly => "zns_err_read_only",
        Status::ZnsErrOffline => "zns_err_offline",
        Status::ZnsNoOpenZone => "zns_no_open_zone",
        Status::ZnsNoActiveZone => "zns_no_active_zone",
        Status::InvalidField => "invalid_field",
        Status::Retry => "retry",
    }
}

impl TraceCommand {
    fn into_command_in(self) -> Result<CommandIn> {
        Ok(CommandIn {
            namespace: parse_namespace(&self.namespace)?,
            op: parse_op(&self.op)?,
            slba: Lpn(self.slba),
            nlb: self.nlb,
            io_type: parse_io_type(self.io_type.as_deref()),
            force_flush: self.force_flush,
            zone_action: parse_zone_action(self.zone_action.as_deref())?,
            sqid: self.sqid,
            nsecs_start: self.nsecs_start,
        })
    }
}

/// Replays a command trace against a hybrid pSLC/normal FTL simulation.
#[derive(Parser, Debug)]
#[command(name = "ftl-sim", version, about = "Hybrid pSLC/normal FTL command-trace replayer")]
struct Args {
    /// Path to a TOML trace file (`[geometry]`, `[device]`, `[[commands]]`).
    trace: PathBuf,

    /// Write logs to this file instead of stderr (non-blocking appender).
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(|n| n.to_owned()).unwrap_or_else(|| "ftl-sim.log".into());
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(non_blocking).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}

fn build_ftl(sim: &SimFile) -> Result<Ftl> {
    let geo = Geometry::build(sim.geometry.clone()).context("invalid geometry")?;

    let meta = MetaNamespace::new(&geo, sim.device.meta_total_lpns, sim.device.meta_pslc_lines);
    let block = BlockNamespace::new(&geo, sim.device.block_pslc_lines, sim.device.block_normal_lines, sim.device.block_num_wb);
    let zoned = ZonedNamespace::new(
        &geo,
        sim.device.zoned_num_zones,
        sim.device.zoned_max_open,
        sim.device.zoned_max_active,
        sim.device.zoned_num_wb,
    );

    Ok(Ftl::new(geo, meta, block, zoned))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_ref());

    let text = std::fs::read_to_string(&args.trace)
        .with_context(|| format!("reading trace file {}", args.trace.display()))?;
    let sim: SimFile = toml::from_str(&text).context("parsing trace file")?;

    info!(commands = sim.commands.len(), "loaded trace");

    let mut ftl = build_ftl(&sim)?;

    const MAX_RETRIES: u32 = 8;

    for (idx, raw) in sim.commands.into_iter().enumerate() {
        let mut cmd = raw.into_command_in()?;
        let mut out = ftl.request(cmd);
        let mut retries = 0;
        while out.status == Status::Retry && retries < MAX_RETRIES {
            // Soft write-buffer backpressure: the shim resubmits the exact
            // same command once the pending flush its reply reports on has
            // had a chance to drain.
            cmd.nsecs_start = out.nsecs_target;
            out = ftl.request(cmd);
            retries += 1;
        }
        if out.status.is_success() {
            info!(idx, nsecs_target = out.nsecs_target, "ok");
        } else {
            warn!(idx, status = status_name(out.status), nsecs_target = out.nsecs_target, "rejected");
        }
        println!("[{idx}] status={} nsecs_target={}", status_name(out.status), out.nsecs_target);
    }

    let snap = telemetry_snapshot();
    println!(
        "requests={} failed={} gc_cycles={} gc_pages={} migrations={} migration_pgs={} l2p_hits={} l2p_misses={}",
        snap.requests_total,
        snap.requests_failed,
        snap.gc_count,
        snap.gc_pages_reclaimed,
        snap.migrations_total,
        snap.migration_pgs,
        snap.l2p_cache_hits,
        snap.l2p_cache_misses,
    );

    Ok(())
}
