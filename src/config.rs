//! Allocator configuration
//!
//! Supplied by the hosting storage node at startup, usually from a TOML
//! file:
//!
//! ```toml
//! store_paths = ["/data/store0", "/data/store1"]
//! trunk_file_size = 67108864
//! slot_min_size = 256
//! store_path_mode = "round_robin"
//! reserved_mb = 1024
//!
//! [log]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::storage::trunk::init::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::storage::trunk::StorePathMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRUNK_FILE_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_SLOT_MIN_SIZE: u64 = 256;
pub const DEFAULT_SLOT_MAX_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_RESERVED_MB: u64 = 1024;
pub const DEFAULT_SUBDIR_COUNT: u32 = 256;

/// Trunk allocator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrunkConfig {
    /// Store path roots; trunk files go to `<root>/data`
    pub store_paths: Vec<PathBuf>,
    /// Size every new trunk file is pre-allocated to
    pub trunk_file_size: u64,
    /// Bound of the smallest slot
    pub slot_min_size: u64,
    /// Bound of the largest slot, capped at `trunk_file_size`
    pub slot_max_size: u64,
    /// Ratio between consecutive slot bounds
    pub slot_growth_factor: f64,
    pub store_path_mode: StorePathMode,
    /// Per-path reservation used when picking the load-balance path
    pub reserved_mb: u64,
    /// Reservation used by round-robin placement.
    /// Derived from `reserved_mb` when unset.
    pub avg_reserved_mb: Option<u64>,
    /// Directories per sharding level
    pub subdir_count_per_path: u32,
    /// Trunk id counter seed; the first file gets `trunk_id_start + 1`
    pub trunk_id_start: u32,
    /// Size of the zero buffer used to pre-allocate trunk files
    pub init_chunk_size: usize,
    pub log: LogConfig,
}

impl Default for TrunkConfig {
    fn default() -> Self {
        Self {
            store_paths: Vec::new(),
            trunk_file_size: DEFAULT_TRUNK_FILE_SIZE,
            slot_min_size: DEFAULT_SLOT_MIN_SIZE,
            slot_max_size: DEFAULT_SLOT_MAX_SIZE,
            slot_growth_factor: 2.0,
            store_path_mode: StorePathMode::RoundRobin,
            reserved_mb: DEFAULT_RESERVED_MB,
            avg_reserved_mb: None,
            subdir_count_per_path: DEFAULT_SUBDIR_COUNT,
            trunk_id_start: 0,
            init_chunk_size: DEFAULT_CHUNK_SIZE,
            log: LogConfig::default(),
        }
    }
}

impl TrunkConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reservation applied by round-robin placement.
    ///
    /// An explicit `avg_reserved_mb` wins; otherwise `reserved_mb` is
    /// spread evenly over the store paths.
    pub fn avg_reserved_mb(&self) -> u64 {
        self.avg_reserved_mb
            .unwrap_or_else(|| self.reserved_mb / self.store_paths.len().max(1) as u64)
    }

    /// Largest slot bound actually used
    pub fn effective_slot_max_size(&self) -> u64 {
        self.slot_max_size.min(self.trunk_file_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_paths.is_empty() {
            return Err(Error::Config("At least one store path is required".to_string()));
        }
        if self.trunk_file_size == 0 {
            return Err(Error::Config("trunk_file_size must be positive".to_string()));
        }
        if self.slot_min_size == 0 {
            return Err(Error::Config("slot_min_size must be positive".to_string()));
        }
        if self.slot_min_size > self.effective_slot_max_size() {
            return Err(Error::Config(format!(
                "slot_min_size {} exceeds the largest slot size {}",
                self.slot_min_size,
                self.effective_slot_max_size()
            )));
        }
        if !(self.slot_growth_factor > 1.0) || !self.slot_growth_factor.is_finite() {
            return Err(Error::Config(format!(
                "slot_growth_factor must be a finite number above 1, got {}",
                self.slot_growth_factor
            )));
        }
        if self.subdir_count_per_path == 0 {
            return Err(Error::Config("subdir_count_per_path must be positive".to_string()));
        }
        if self.init_chunk_size == 0 || self.init_chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "init_chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.init_chunk_size
            )));
        }
        Ok(())
    }
}

/// Logging options, consumed by [`crate::logging::init`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Directory for a daily rolling log file; stdout only when unset
    pub dir: Option<PathBuf>,
    pub ansi: bool,
    /// Emit stdout logs as JSON lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            ansi: true,
            json: false,
        }
    }
}
