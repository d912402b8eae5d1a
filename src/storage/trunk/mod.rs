//! Trunk Space Allocator
//!
//! Small files are packed into large pre-allocated trunk files instead of
//! getting an inode each. This module decides where trunk files live,
//! names them, pre-allocates them, and hands out regions of them.
//!
//! # Architecture
//!
//! ```text
//! TrunkAllocator
//!   ├─→ SlotTable
//!   │     ├─→ Slot(256B)  → [free, held, free]
//!   │     ├─→ Slot(512B)  → [held]
//!   │     └─→ Slot(1KB)   → []
//!   └─→ TrunkFileCreator
//!         ├─→ PathSelector (round robin | load balance) → StorePaths + FreeSpaceTable
//!         ├─→ TrunkIdGenerator
//!         ├─→ SubPathSharder
//!         └─→ TrunkFileInitializer (zero fill + fsync)
//! ```
//!
//! A request is mapped to the first slot whose bound covers it. The first
//! free record in that slot that fits is held and returned; only when none
//! fits is a new trunk file created.

pub mod allocator;
pub mod creator;
pub mod file_id;
pub mod init;
pub mod naming;
pub mod path;
pub mod slot;
pub mod space;

pub use allocator::{AllocatorStats, SlotStats, TrunkAllocator};
pub use creator::{CreatedTrunk, TrunkFileCreator};
pub use file_id::TrunkIdGenerator;
pub use init::TrunkFileInitializer;
pub use naming::{decode_trunk_id, encode_trunk_id, trunk_file_path, HashSharder, SubPathSharder};
pub use path::{FreeSpaceTable, PathSelector, StorePathMode, StorePaths};
pub use slot::{calculate_slot_sizes, Slot, SlotTable};
pub use space::{TrunkSpace, TrunkStatus};
