//! Slot table for the trunk allocator
//!
//! Each slot is a size class with its own free-list and its own lock, so
//! allocations for different size classes never contend with each other.

use super::space::TrunkSpace;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One size class of the trunk allocator
#[derive(Debug)]
pub struct Slot {
    /// Upper bound (bytes) of requests this slot services
    pub size: u64,
    /// Index of this slot in the table
    pub index: u16,
    /// Trunk spaces owned by this slot, in insertion order
    free_list: Mutex<VecDeque<TrunkSpace>>,
}

impl Slot {
    /// Create an empty slot
    pub fn new(index: u16, size: u64) -> Self {
        Self {
            size,
            index,
            free_list: Mutex::new(VecDeque::new()),
        }
    }

    /// Check if a request of `size` bytes belongs to this slot's bound
    pub fn can_fit(&self, size: u64) -> bool {
        size <= self.size
    }

    /// Reserve the first free record large enough for `size`.
    ///
    /// Records are scanned in insertion order; the match is marked held
    /// and a copy of it is returned.
    pub fn take_free(&self, size: u64) -> Option<TrunkSpace> {
        let mut list = self.free_list.lock();
        let space = list.iter_mut().find(|space| space.fits(size))?;
        space.hold();
        Some(*space)
    }

    /// Append a record to the end of this slot's list
    pub fn push(&self, space: TrunkSpace) -> Result<()> {
        let mut list = self.free_list.lock();
        list.try_reserve(1).map_err(|e| {
            Error::OutOfMemory(format!("Failed to grow free-list of slot {}: {}", self.index, e))
        })?;
        list.push_back(space);
        Ok(())
    }

    /// Number of free records
    pub fn free_count(&self) -> usize {
        self.free_list.lock().iter().filter(|s| s.is_free()).count()
    }

    /// Number of records tracked by this slot (free and held)
    pub fn len(&self) -> usize {
        self.free_list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.free_list.lock().is_empty()
    }

    /// Copy of the records currently tracked, in insertion order
    pub fn snapshot(&self) -> Vec<TrunkSpace> {
        self.free_list.lock().iter().copied().collect()
    }
}

/// Ascending table of slots, fixed at startup
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Build a table from strictly ascending slot bounds
    pub fn new(sizes: &[u64]) -> Result<Self> {
        if sizes.is_empty() {
            return Err(Error::Config("Slot table must not be empty".to_string()));
        }
        if sizes.len() > MAX_SLOTS {
            return Err(Error::Config(format!("Too many slots: {}", sizes.len())));
        }
        if sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(format!(
                "Slot sizes must be strictly ascending: {:?}",
                sizes
            )));
        }

        let slots = sizes
            .iter()
            .enumerate()
            .map(|(index, &size)| Slot::new(index as u16, size))
            .collect();
        Ok(Self { slots })
    }

    /// Build a table from a minimum size, a maximum size and a growth factor
    pub fn with_growth(min_size: u64, max_size: u64, growth_factor: f64) -> Result<Self> {
        Self::new(&calculate_slot_sizes(min_size, max_size, growth_factor))
    }

    /// Find the first slot whose bound covers `size`
    pub fn get_slot(&self, size: u64) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.can_fit(size))
    }

    /// Slot a free region of `size` bytes is filed under.
    ///
    /// That is the largest slot whose bound is <= `size`, so every request
    /// routed to it fits; regions smaller than every bound go to the first slot.
    pub fn slot_for_region(&self, size: u64) -> &Slot {
        self.slots
            .iter()
            .rev()
            .find(|slot| slot.size <= size)
            .unwrap_or(&self.slots[0])
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Largest request the table can service
    pub fn max_size(&self) -> u64 {
        self.slots.last().map(|s| s.size).unwrap_or(0)
    }
}

/// Most slots a table can hold
pub const MAX_SLOTS: usize = u16::MAX as usize;

/// Calculate slot bounds growing geometrically from `min_size`.
///
/// `max_size` is always the last bound, even if the progression skips it.
/// Returns an empty vector if `min_size` is zero or above `max_size`, or if
/// the growth factor does not grow.
pub fn calculate_slot_sizes(min_size: u64, max_size: u64, growth_factor: f64) -> Vec<u64> {
    let mut sizes = Vec::new();
    if min_size == 0 || min_size > max_size || !(growth_factor > 1.0) {
        return sizes;
    }

    let mut current = min_size;
    // Stop once the table is too large to be accepted anyway
    while current < max_size && sizes.len() <= MAX_SLOTS {
        sizes.push(current);
        let next = (current as f64 * growth_factor).ceil() as u64;
        current = next.max(current + 1);
    }
    sizes.push(max_size);

    sizes
}
