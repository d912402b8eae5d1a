//! Trunk space allocator

use super::creator::TrunkFileCreator;
use super::file_id::TrunkIdGenerator;
use super::init::TrunkFileInitializer;
use super::naming::{HashSharder, SubPathSharder};
use super::path::{FreeSpaceTable, PathSelector, StorePaths};
use super::slot::{Slot, SlotTable};
use super::space::TrunkSpace;
use crate::config::TrunkConfig;
use crate::error::{Error, Result};
use crate::metrics;
use tracing::{debug, info};

/// Hands out trunk spaces, creating trunk files when no free space fits.
///
/// Safe to share between threads: each slot has its own lock and trunk
/// file creation happens outside of any slot lock.
#[derive(Debug)]
pub struct TrunkAllocator {
    slots: SlotTable,
    creator: TrunkFileCreator,
    reserved_mb: u64,
}

impl TrunkAllocator {
    /// Create an allocator using the default hash sharder
    pub fn new(config: &TrunkConfig) -> Result<Self> {
        let sharder = HashSharder::new(config.subdir_count_per_path);
        Self::with_sharder(config, Box::new(sharder))
    }

    /// Create an allocator with a custom sub-path sharder
    pub fn with_sharder(config: &TrunkConfig, sharder: Box<dyn SubPathSharder>) -> Result<Self> {
        config.validate()?;

        let slots = SlotTable::with_growth(
            config.slot_min_size,
            config.effective_slot_max_size(),
            config.slot_growth_factor,
        )?;
        info!(
            "Initializing trunk allocator with {} slots: {:?}",
            slots.len(),
            slots.slots().iter().map(|s| s.size).collect::<Vec<_>>()
        );

        let avg_reserved_mb = config.avg_reserved_mb();
        let creator = TrunkFileCreator::new(
            StorePaths::new(config.store_paths.clone()),
            PathSelector::new(config.store_path_mode, avg_reserved_mb),
            TrunkIdGenerator::new(config.trunk_id_start),
            sharder,
            TrunkFileInitializer::new(config.init_chunk_size),
            config.trunk_file_size,
        );
        info!(
            paths = config.store_paths.len(),
            mode = ?config.store_path_mode,
            trunk_file_size = config.trunk_file_size,
            reserved_mb = config.reserved_mb,
            avg_reserved_mb,
            "Trunk file placement configured"
        );

        Ok(Self {
            slots,
            creator,
            reserved_mb: config.reserved_mb,
        })
    }

    /// Slot that services requests of `size` bytes
    pub fn get_slot(&self, size: u64) -> Option<&Slot> {
        self.slots.get_slot(size)
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// Free-space table the disk monitor updates
    pub fn free_space(&self) -> &FreeSpaceTable {
        self.creator.paths().free_space()
    }

    pub fn store_paths(&self) -> &StorePaths {
        self.creator.paths()
    }

    pub fn path_selector(&self) -> &PathSelector {
        self.creator.selector()
    }

    /// Last trunk id handed out
    pub fn current_trunk_id(&self) -> u32 {
        self.creator.ids().current()
    }

    /// Allocate a trunk space of at least `size` bytes.
    ///
    /// Free records are reused when one fits, looking in the matching slot
    /// first and then in the larger slots. Otherwise a new trunk file is
    /// created and a record spanning all of it is returned; that record
    /// stays tracked in the matching slot as held.
    pub fn allocate(&self, size: u64) -> Result<TrunkSpace> {
        match self.try_allocate(size) {
            Ok((space, outcome)) => {
                metrics::record_allocation(outcome);
                Ok(space)
            }
            Err(e) => {
                metrics::record_allocation(metrics::OUTCOME_FAILED);
                Err(e)
            }
        }
    }

    fn try_allocate(&self, size: u64) -> Result<(TrunkSpace, &'static str)> {
        let slot = self.slots.get_slot(size).ok_or_else(|| {
            debug!(size, max = self.slots.max_size(), "No slot for trunk request");
            Error::NoMatchingSlot {
                size,
                max: self.slots.max_size(),
            }
        })?;

        // One slot lock at a time, in ascending order
        for candidate in &self.slots.slots()[slot.index as usize..] {
            if let Some(space) = candidate.take_free(size) {
                debug!(size, slot = candidate.size, %space, "Reused free trunk space");
                return Ok((space, metrics::OUTCOME_REUSED));
            }
        }

        let space = self.create_space()?;
        slot.push(space)?;

        debug!(size, slot = slot.size, %space, "Allocated new trunk file");
        Ok((space, metrics::OUTCOME_CREATED))
    }

    fn create_space(&self) -> Result<TrunkSpace> {
        let created = self.creator.create_trunk_file()?;
        Ok(TrunkSpace::whole_file(
            created.store_path_index,
            created.sub_path,
            created.trunk_id,
            self.creator.trunk_file_size(),
        ))
    }

    /// Make a free region available to future allocations.
    ///
    /// The region is filed under the largest slot whose bound it covers.
    pub fn add_free_space(&self, space: TrunkSpace) -> Result<()> {
        if !space.is_free() {
            return Err(Error::InvalidArgument(format!(
                "Only free trunk spaces can be added: {}",
                space
            )));
        }
        if space.size == 0 {
            return Err(Error::InvalidArgument(format!("Empty trunk space: {}", space)));
        }
        if self.store_paths().root(space.store_path_index).is_none() {
            return Err(Error::InvalidArgument(format!(
                "Unknown store path in trunk space: {}",
                space
            )));
        }

        let slot = self.slots.slot_for_region(space.size);
        slot.push(space)?;
        metrics::TRUNK_SPACES_REGISTERED.inc();
        debug!(slot = slot.size, %space, "Added free trunk space");
        Ok(())
    }

    /// Recompute the load-balance path from the free-space table and
    /// publish it. Returns the published index (-1 when no path has more
    /// than `reserved_mb` free).
    pub fn refresh_load_balance(&self) -> i64 {
        let index = self.store_paths().load_balance_candidate(self.reserved_mb);
        self.path_selector().publish_load_balance_index(index);
        debug!(index, reserved_mb = self.reserved_mb, "Published load-balance store path");
        index
    }

    /// Per-slot bookkeeping counts
    pub fn stats(&self) -> AllocatorStats {
        let mut stats = AllocatorStats {
            trunk_id: self.current_trunk_id(),
            ..Default::default()
        };

        for slot in self.slots.slots() {
            let records = slot.snapshot();
            let free: Vec<&TrunkSpace> = records.iter().filter(|s| s.is_free()).collect();
            let slot_stats = SlotStats {
                index: slot.index,
                size: slot.size,
                free_spaces: free.len(),
                held_spaces: records.len() - free.len(),
                free_bytes: free.iter().map(|s| s.size).sum(),
            };
            stats.free_spaces += slot_stats.free_spaces;
            stats.held_spaces += slot_stats.held_spaces;
            stats.free_bytes += slot_stats.free_bytes;
            stats.slots.push(slot_stats);
        }

        stats
    }
}

/// Statistics for the trunk allocator
#[derive(Debug, Default)]
pub struct AllocatorStats {
    pub slots: Vec<SlotStats>,
    pub free_spaces: usize,
    pub held_spaces: usize,
    pub free_bytes: u64,
    /// Last trunk id handed out
    pub trunk_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotStats {
    pub index: u16,
    pub size: u64,
    pub free_spaces: usize,
    pub held_spaces: usize,
    pub free_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::trunk::naming::{trunk_file_path, DATA_DIR};
    use crate::storage::trunk::path::StorePathMode;
    use crate::storage::trunk::space::TrunkStatus;
    use std::path::Path;

    fn config(root: &Path) -> TrunkConfig {
        TrunkConfig {
            store_paths: vec![root.to_path_buf()],
            trunk_file_size: 8192,
            slot_min_size: 256,
            slot_max_size: 4096,
            slot_growth_factor: 2.0,
            reserved_mb: 10,
            init_chunk_size: 1024,
            ..Default::default()
        }
    }

    fn allocator(root: &Path) -> Result<TrunkAllocator> {
        let allocator = TrunkAllocator::new(&config(root))?;
        allocator.free_space().set_free_mb(0, 100)?;
        Ok(allocator)
    }

    fn trunk_files(root: &Path) -> usize {
        std::fs::read_dir(root.join(DATA_DIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_allocate_creates_trunk_file() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        let space = allocator.allocate(300)?;
        assert_eq!(space.trunk_id, 1);
        assert_eq!(space.offset, 0);
        assert_eq!(space.size, 8192);
        assert_eq!(space.status, TrunkStatus::Held);

        let path = trunk_file_path(dir.path(), 1);
        assert_eq!(std::fs::metadata(path).unwrap().len(), 8192);

        // The new record is tracked in the requesting slot, held
        let slot = allocator.get_slot(300).unwrap();
        assert_eq!(slot.size, 512);
        assert_eq!(slot.snapshot(), vec![space]);
        Ok(())
    }

    #[test]
    fn test_allocate_reuses_free_space_without_new_file() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        let free = TrunkSpace::free(0, (1, 2), 77, 1024, 512);
        allocator.add_free_space(free)?;

        let space = allocator.allocate(400)?;
        assert_eq!(space.trunk_id, 77);
        assert_eq!(space.offset, 1024);
        assert_eq!(space.status, TrunkStatus::Held);

        assert_eq!(trunk_files(dir.path()), 0);
        assert_eq!(allocator.current_trunk_id(), 0);

        // The reused record is now held; the next request needs a new file
        let next = allocator.allocate(400)?;
        assert_eq!(next.trunk_id, 1);
        assert_eq!(trunk_files(dir.path()), 1);
        Ok(())
    }

    #[test]
    fn test_allocate_no_matching_slot() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        let err = allocator.allocate(4097).unwrap_err();
        assert!(matches!(err, Error::NoMatchingSlot { size: 4097, max: 4096 }));
        assert!(!dir.path().join(DATA_DIR).exists());
        Ok(())
    }

    #[test]
    fn test_allocate_out_of_space() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;
        allocator.free_space().set_free_mb(0, 10)?;

        assert!(matches!(allocator.allocate(256), Err(Error::OutOfSpace(_))));
        assert!(!dir.path().join(DATA_DIR).exists());
        assert_eq!(allocator.stats().held_spaces, 0);
        Ok(())
    }

    #[test]
    fn test_allocate_reuses_larger_slot_before_creating() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        // Filed under the 4096 slot, far above the request's 512 slot
        allocator.add_free_space(TrunkSpace::free(0, (0, 0), 99, 0, 1 << 20))?;

        let space = allocator.allocate(300)?;
        assert_eq!(space.trunk_id, 99);
        assert_eq!(trunk_files(dir.path()), 0);
        assert_eq!(allocator.current_trunk_id(), 0);
        Ok(())
    }

    #[test]
    fn test_allocate_never_takes_from_smaller_slot() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        // Filed under the 256 slot; too small for a 2000 byte request
        allocator.add_free_space(TrunkSpace::free(0, (0, 0), 42, 0, 300))?;

        let space = allocator.allocate(2000)?;
        assert_eq!(space.trunk_id, 1);
        assert_eq!(allocator.stats().free_spaces, 1);
        Ok(())
    }

    #[test]
    fn test_failed_allocations_are_counted() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;
        let failed = || {
            metrics::TRUNK_ALLOCATIONS
                .with_label_values(&[metrics::OUTCOME_FAILED])
                .get()
        };

        let before = failed();
        assert!(allocator.allocate(1 << 20).is_err());
        allocator.free_space().set_free_mb(0, 0)?;
        assert!(allocator.allocate(256).is_err());

        // Other tests may fail allocations concurrently
        assert!(failed() >= before + 2);
        Ok(())
    }

    #[test]
    fn test_add_free_space_routing() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        // Slots: 256, 512, 1024, 2048, 4096
        allocator.add_free_space(TrunkSpace::free(0, (0, 0), 1, 0, 700))?;
        allocator.add_free_space(TrunkSpace::free(0, (0, 0), 2, 0, 100))?;
        allocator.add_free_space(TrunkSpace::free(0, (0, 0), 3, 0, 1 << 20))?;

        let stats = allocator.stats();
        let free_by_slot: Vec<(u64, usize)> =
            stats.slots.iter().map(|s| (s.size, s.free_spaces)).collect();
        assert_eq!(
            free_by_slot,
            vec![(256, 1), (512, 1), (1024, 0), (2048, 0), (4096, 1)]
        );
        assert_eq!(stats.free_bytes, 700 + 100 + (1 << 20));
        Ok(())
    }

    #[test]
    fn test_add_free_space_rejects_invalid() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(dir.path())?;

        let mut held = TrunkSpace::free(0, (0, 0), 1, 0, 512);
        held.hold();
        assert!(allocator.add_free_space(held).is_err());
        assert!(allocator.add_free_space(TrunkSpace::free(0, (0, 0), 1, 0, 0)).is_err());
        assert!(allocator.add_free_space(TrunkSpace::free(5, (0, 0), 1, 0, 512)).is_err());
        Ok(())
    }

    #[test]
    fn test_refresh_load_balance() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = TrunkAllocator::new(&TrunkConfig {
            store_path_mode: StorePathMode::LoadBalance,
            ..config(dir.path())
        })?;

        allocator.free_space().set_free_mb(0, 5)?;
        assert_eq!(allocator.refresh_load_balance(), -1);
        assert!(matches!(allocator.allocate(256), Err(Error::OutOfSpace(_))));

        allocator.free_space().set_free_mb(0, 500)?;
        assert_eq!(allocator.refresh_load_balance(), 0);
        assert_eq!(allocator.allocate(256)?.store_path_index, 0);
        Ok(())
    }

    #[test]
    fn test_trunk_id_seed() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let allocator = TrunkAllocator::new(&TrunkConfig {
            trunk_id_start: 500,
            ..config(dir.path())
        })?;
        allocator.free_space().set_free_mb(0, 100)?;

        assert_eq!(allocator.allocate(256)?.trunk_id, 501);
        assert_eq!(allocator.stats().trunk_id, 501);
        Ok(())
    }
}
