//! Storage layer
//!
//! # Architecture
//!
//! ```text
//! Store paths (one per disk)
//!   └─→ data/
//!        └─→ Trunk files (fixed size, zero-filled at creation)
//!             └─→ Trunk spaces (offset, size) holding small files
//! ```
//!
//! Reading and writing payload bytes, journaling allocations and
//! monitoring disk space are done by the hosting storage service; this
//! layer only owns where trunk files go and which regions are handed out.

pub mod trunk;

pub use trunk::{TrunkAllocator, TrunkSpace, TrunkStatus};
