//! NAND cell/tier vocabulary shared by every crate in the workspace.

/// Physical programming mode of a block. `Slc` blocks are the pSLC tier;
/// everything else belongs to the normal tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum NandType {
    Slc,
    Mlc,
    Tlc,
    Qlc,
}

impl NandType {
    pub fn is_pslc(self) -> bool {
        matches!(self, NandType::Slc)
    }

    pub fn bits_per_cell(self) -> u32 {
        match self {
            NandType::Slc => 1,
            NandType::Mlc => 2,
            NandType::Tlc => 3,
            NandType::Qlc => 4,
        }
    }
}

/// Which bit-plane within a multi-level cell a page's program/read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CellType {
    Lsb,
    Msb,
    Csb,
    Tsb,
}

/// The tier a line/block/write targets. Independent of `NandType` so that
/// allocation code can reason about "pSLC" vs "normal" without matching on
/// every possible `NandType` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Pslc,
    Normal,
}

/// A page's lifecycle state. `reserved` is not a separate state: a page with
/// `status == Valid` whose reverse map holds [`crate::INVALID_LPN`] is a
/// reserved page (pre-claimed slot for a multi-page mapping unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    Free,
    Valid,
    Invalid,
}

/// Why a NAND/internal-write op is being issued — distinguishes host traffic
/// from the FTL's own background relocation traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoType {
    UserIo,
    GcIo,
    MigrateIo,
    MapRead,
}

/// The kind of NAND command a scheduler `advance` call represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdKind {
    Read,
    Write,
    Erase,
    Nop,
}
