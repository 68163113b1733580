//! The request/response envelope the rest of the workspace speaks: what a
//! host sends the device (`CommandIn`), what comes back (`CommandOut`), the
//! three namespaces a command can target, and the internal deferred-work
//! queue entries GC/migration/write-buffer flush enqueue for themselves.
//!
//! `Status` here is a wire-level result code, not a Rust `Error` — a command
//! that comes back `Status::ZoneStateViolation` is the device correctly
//! refusing an operation, not this crate failing. Genuine bugs/contract
//! violations use `debug_assert!`/`panic!` in the crates that enforce them.

mod command;
pub mod telemetry;

pub use command::{CommandIn, CommandOut, InternalOperation, Namespace, OpKind, Status, ZoneSendAction};
pub use telemetry::{telemetry_snapshot, TelemetrySnapshot};
