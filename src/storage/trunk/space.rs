//! Trunk space records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Allocation state of a trunk space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrunkStatus {
    /// Available to satisfy an allocation request
    Free,
    /// Handed out to a caller
    Held,
}

/// A byte range inside a trunk file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrunkSpace {
    /// Index of the store path backing the trunk file
    pub store_path_index: usize,
    /// First-level sharding directory
    pub sub_path_high: u32,
    /// Second-level sharding directory
    pub sub_path_low: u32,
    /// Identifier of the backing trunk file
    pub trunk_id: u32,
    /// Offset of this region within the trunk file
    pub offset: u64,
    /// Length of this region in bytes
    pub size: u64,
    pub status: TrunkStatus,
}

impl TrunkSpace {
    /// A free region, ready to be registered with the allocator
    pub fn free(
        store_path_index: usize,
        (sub_path_high, sub_path_low): (u32, u32),
        trunk_id: u32,
        offset: u64,
        size: u64,
    ) -> Self {
        Self {
            store_path_index,
            sub_path_high,
            sub_path_low,
            trunk_id,
            offset,
            size,
            status: TrunkStatus::Free,
        }
    }

    /// A region spanning a whole, freshly created trunk file.
    ///
    /// The caller that triggered the creation owns it, so it starts out held.
    pub fn whole_file(
        store_path_index: usize,
        (sub_path_high, sub_path_low): (u32, u32),
        trunk_id: u32,
        trunk_file_size: u64,
    ) -> Self {
        Self {
            store_path_index,
            sub_path_high,
            sub_path_low,
            trunk_id,
            offset: 0,
            size: trunk_file_size,
            status: TrunkStatus::Held,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == TrunkStatus::Free
    }

    /// Mark a free region as held.
    ///
    /// Returns `false` (and changes nothing) if the region was already held.
    pub fn hold(&mut self) -> bool {
        if self.is_free() {
            self.status = TrunkStatus::Held;
            true
        } else {
            false
        }
    }

    /// Whether this region can satisfy a request of `size` bytes
    pub fn fits(&self, size: u64) -> bool {
        self.is_free() && self.size >= size
    }
}

impl fmt::Display for TrunkSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trunk(path={}, sub={:02X}/{:02X}, id={}, offset={}, size={})",
            self.store_path_index,
            self.sub_path_high,
            self.sub_path_low,
            self.trunk_id,
            self.offset,
            self.size
        )
    }
}
