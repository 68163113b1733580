//! Superblocks ("lines"), write pointers, the physical address index
//! arithmetic, and the migration FIFO (spec.md §3, §4.3, §4.4, §4.10,
//! §4.11). Nothing here knows about L2P, write buffers, or the request
//! pipeline — `ftl-l2p`, `ftl-wbuf`, and `ftl-core` build on top of this.

pub mod addr;
pub mod heap;
pub mod line;
pub mod migration;
pub mod wp;

pub use addr::ppa_to_pgidx;
pub use heap::{Handle, IndexedHeap};
pub use line::{Block, Line, LineManager, ReverseMap};
pub use migration::MigrationQueue;
pub use wp::{blk_idx, die_coords, PageAlloc, RetiredLine, WritePointer};
