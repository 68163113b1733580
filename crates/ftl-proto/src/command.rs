use ftl_types::{IoType, Lpn};

/// One of the three independent namespaces a command can target (spec.md §6
/// "Namespace types"). `ConzoneMeta` is the all-pSLC metadata namespace;
/// `ConzoneBlock` and `ConzoneZoned` share the NAND channel/LUN scheduler
/// with it and with each other, so contention between namespaces is real and
/// modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    ConzoneMeta,
    ConzoneBlock,
    ConzoneZoned,
}

/// The host-facing operation a `CommandIn` requests (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Read,
    Write,
    Append,
    Flush,
    ZoneMgmtSend,
    ZoneMgmtRecv,
}

/// The specific action a `ZoneMgmtSend` command requests (spec.md §2.12,
/// referenced but not redesigned: only `Reset` mutates FTL state the way
/// this crate models it — the other actions are zone-state-machine-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneSendAction {
    Close,
    Finish,
    Open,
    Reset,
    OfflineAction,
}

/// Wire-level result code (spec.md §6/§7), named after the spec's own
/// vocabulary so a scenario test can assert `status == ZnsErrFull` directly
/// instead of translating through a generic enum. Most variants here
/// describe a device correctly declining a request, not a bug in this
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    /// `pslc_full` or `device_full` latched — no free line on the requested tier.
    CapExceeded,
    /// Write/read range crosses a zone boundary.
    ZnsBoundary,
    /// `slba != zone.wp`, misaligned to `write_unit_size`, or beyond zone capacity.
    ZnsInvalidWrite,
    ZnsErrFull,
    ZnsErrReadOnly,
    ZnsErrOffline,
    ZnsNoOpenZone,
    ZnsNoActiveZone,
    /// Read past zone capacity, or any other malformed field.
    InvalidField,
    /// Soft write-buffer backpressure (spec.md §4.6/§5): no buffer could
    /// accept this write right now (none idle, and the live one belongs to
    /// another zone and isn't flushing yet). Not a real error — the exact
    /// same command should be resubmitted once pending flushes drain.
    Retry,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

/// A single request entering the pipeline (spec.md §6 "Input command
/// envelope").
#[derive(Debug, Clone, Copy)]
pub struct CommandIn {
    pub namespace: Namespace,
    pub op: OpKind,
    pub slba: Lpn,
    /// Number of logical blocks the command covers; zero for
    /// zone-management commands that address a single zone.
    pub nlb: u32,
    pub io_type: IoType,
    /// Set on writes that request FUA/immediate durability, forcing a flush.
    pub force_flush: bool,
    /// Only meaningful when `op == ZoneMgmtSend`.
    pub zone_action: Option<ZoneSendAction>,
    /// Submission queue id — threaded through to deferred `InternalOperation`s.
    pub sqid: u32,
    /// Monotonic submission time in nanoseconds, used to drive the timing model.
    pub nsecs_start: u64,
}

/// The reply the pipeline produces for a `CommandIn` (spec.md §6 "Output").
#[derive(Debug, Clone, Copy)]
pub struct CommandOut {
    pub status: Status,
    /// Absolute completion time in nanoseconds.
    pub nsecs_target: u64,
}

impl CommandOut {
    pub fn success(nsecs_target: u64) -> Self {
        CommandOut {
            status: Status::Success,
            nsecs_target,
        }
    }

    pub fn failed(status: Status, at_ns: u64) -> Self {
        debug_assert!(!status.is_success(), "failed() called with Status::Success");
        tracing::trace!(target: "ftl_proto::command", ?status, at_ns, "command rejected");
        CommandOut {
            status,
            nsecs_target: at_ns,
        }
    }
}

/// Background work the FTL schedules for itself, outside the host-visible
/// request path: a write-buffer release the upstream shim must deliver once
/// its scheduled time elapses (spec.md §6 "deferred internal-operation
/// queue"). GC and migration run synchronously inside the pipeline call that
/// triggers them (spec.md §4.10/§4.11) and do not need a deferred entry.
#[derive(Debug, Clone, Copy)]
pub struct InternalOperation {
    pub sqid: u32,
    pub time_ns: u64,
    pub buffer_id: u32,
    pub bytes_to_release: u64,
}
