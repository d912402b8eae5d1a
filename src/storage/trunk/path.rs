//! Store paths and trunk file placement
//!
//! The free-space table is refreshed by an external disk monitor and read
//! here without locking. The round-robin cursor is the only state this
//! module mutates, and it is only touched under its own lock.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{debug, warn};

/// Policy for choosing the store path of a new trunk file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePathMode {
    /// Rotate through the paths, skipping those below the average reservation
    #[default]
    RoundRobin,
    /// Use the path published by the external load balancer
    LoadBalance,
}

/// Per-path free space in megabytes
#[derive(Debug)]
pub struct FreeSpaceTable {
    free_mbs: Vec<AtomicU64>,
}

impl FreeSpaceTable {
    /// A table of `count` paths, all reporting zero free space
    pub fn new(count: usize) -> Self {
        Self {
            free_mbs: (0..count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Build a table from known values
    pub fn from_values(values: &[u64]) -> Self {
        Self {
            free_mbs: values.iter().map(|&v| AtomicU64::new(v)).collect(),
        }
    }

    /// Update hook for the disk monitor
    pub fn set_free_mb(&self, index: usize, free_mb: u64) -> Result<()> {
        let slot = self.free_mbs.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Store path index {} out of range ({} paths)",
                index,
                self.free_mbs.len()
            ))
        })?;
        slot.store(free_mb, Ordering::Relaxed);
        Ok(())
    }

    /// Free megabytes of path `index`; unknown paths report zero
    pub fn free_mb(&self, index: usize) -> u64 {
        self.free_mbs
            .get(index)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.free_mbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free_mbs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.free_mbs
            .iter()
            .map(|v| v.load(Ordering::Relaxed))
            .collect()
    }
}

/// The configured store path roots and their free space
#[derive(Debug)]
pub struct StorePaths {
    roots: Vec<PathBuf>,
    free_space: FreeSpaceTable,
}

impl StorePaths {
    /// Register `roots`; free space starts at zero until the monitor reports
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let free_space = FreeSpaceTable::new(roots.len());
        Self { roots, free_space }
    }

    pub fn root(&self, index: usize) -> Option<&Path> {
        self.roots.get(index).map(PathBuf::as_path)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn free_space(&self) -> &FreeSpaceTable {
        &self.free_space
    }

    /// Default load-balance choice: the path with the most free space.
    ///
    /// Returns -1 when even that path has no more than `reserved_mb` free.
    /// Ties go to the lowest index.
    pub fn load_balance_candidate(&self, reserved_mb: u64) -> i64 {
        let best = (0..self.len())
            .map(|i| (i, self.free_space.free_mb(i)))
            .fold(None, |best: Option<(usize, u64)>, (i, free)| match best {
                Some((_, best_free)) if best_free >= free => best,
                _ => Some((i, free)),
            });

        match best {
            Some((index, free)) if free > reserved_mb => index as i64,
            _ => -1,
        }
    }
}

/// Chooses the store path a new trunk file is created under
#[derive(Debug)]
pub struct PathSelector {
    mode: StorePathMode,
    avg_reserved_mb: u64,
    /// Next path in round-robin mode
    cursor: Mutex<usize>,
    /// Path published by the load balancer; negative means no space
    load_balance_index: AtomicI64,
}

impl PathSelector {
    pub fn new(mode: StorePathMode, avg_reserved_mb: u64) -> Self {
        Self {
            mode,
            avg_reserved_mb,
            cursor: Mutex::new(0),
            load_balance_index: AtomicI64::new(0),
        }
    }

    pub fn mode(&self) -> StorePathMode {
        self.mode
    }

    pub fn avg_reserved_mb(&self) -> u64 {
        self.avg_reserved_mb
    }

    /// Publish the path chosen by the external load-balancing computation
    pub fn publish_load_balance_index(&self, index: i64) {
        self.load_balance_index.store(index, Ordering::Release);
    }

    pub fn load_balance_index(&self) -> i64 {
        self.load_balance_index.load(Ordering::Acquire)
    }

    /// Pick the store path for a new trunk file
    pub fn select_path(&self, paths: &StorePaths) -> Result<usize> {
        match self.mode {
            StorePathMode::LoadBalance => self.select_load_balance(paths),
            StorePathMode::RoundRobin => self.select_round_robin(paths),
        }
    }

    fn select_load_balance(&self, paths: &StorePaths) -> Result<usize> {
        let index = self.load_balance_index();
        if index < 0 {
            return Err(Error::OutOfSpace(
                "Load balancer reports no store path with free space".to_string(),
            ));
        }

        let index = index as usize;
        if index >= paths.len() {
            warn!(index, paths = paths.len(), "Load balancer published unknown store path");
            return Err(Error::OutOfSpace(format!(
                "Store path index {} out of range ({} paths)",
                index,
                paths.len()
            )));
        }

        debug!(index, "Selected store path (load balance)");
        Ok(index)
    }

    fn select_round_robin(&self, paths: &StorePaths) -> Result<usize> {
        let count = paths.len();
        if count == 0 {
            return Err(Error::OutOfSpace("No store paths configured".to_string()));
        }

        let free = paths.free_space();
        let mut cursor = self.cursor.lock();
        if *cursor >= count {
            *cursor = 0;
        }

        let mut index = *cursor;
        if free.free_mb(index) <= self.avg_reserved_mb {
            match (0..count).find(|&i| free.free_mb(i) > self.avg_reserved_mb) {
                Some(i) => {
                    index = i;
                    *cursor = i;
                }
                None => {
                    warn!(
                        avg_reserved_mb = self.avg_reserved_mb,
                        free_mbs = ?free.snapshot(),
                        "All store paths are at or below the reserved space"
                    );
                    return Err(Error::OutOfSpace(format!(
                        "No store path has more than {} MB free",
                        self.avg_reserved_mb
                    )));
                }
            }
        }

        *cursor = (*cursor + 1) % count;

        debug!(index, "Selected store path (round robin)");
        Ok(index)
    }
}
