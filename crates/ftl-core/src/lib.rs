//! The request pipeline, namespace types, and zone state machine (spec.md
//! §4.12, §4.13, §6) — the top-level crate that wires the rest of the
//! workspace (`ftl-geometry`, `ftl-timing`, `ftl-lines`, `ftl-l2p`,
//! `ftl-wbuf`, `ftl-gc`) into one `Ftl` facade a host command trace can
//! drive end to end.

pub mod namespace;
pub mod nand;
pub mod pipeline;
pub mod tier;
pub mod zone;

pub use namespace::{BlockNamespace, MetaNamespace, ZonedNamespace};
pub use pipeline::Ftl;
pub use zone::{Zone, ZoneManager, ZoneState};
