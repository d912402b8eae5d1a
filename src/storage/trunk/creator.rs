//! Trunk file creation: placement, naming and pre-allocation

use super::file_id::TrunkIdGenerator;
use super::init::{io_failure, TrunkFileInitializer};
use super::naming::{encode_trunk_id, trunk_file_name, SubPathSharder, DATA_DIR};
use super::path::{PathSelector, StorePaths};
use crate::error::{Error, Result};
use crate::metrics;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Identity of a freshly created trunk file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTrunk {
    pub store_path_index: usize,
    pub sub_path: (u32, u32),
    pub trunk_id: u32,
    /// Location of the file on disk
    pub path: PathBuf,
}

/// Creates new trunk files under the configured store paths
pub struct TrunkFileCreator {
    paths: StorePaths,
    selector: PathSelector,
    ids: TrunkIdGenerator,
    sharder: Box<dyn SubPathSharder>,
    initializer: TrunkFileInitializer,
    trunk_file_size: u64,
}

impl TrunkFileCreator {
    pub fn new(
        paths: StorePaths,
        selector: PathSelector,
        ids: TrunkIdGenerator,
        sharder: Box<dyn SubPathSharder>,
        initializer: TrunkFileInitializer,
        trunk_file_size: u64,
    ) -> Self {
        Self {
            paths,
            selector,
            ids,
            sharder,
            initializer,
            trunk_file_size,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn selector(&self) -> &PathSelector {
        &self.selector
    }

    pub fn ids(&self) -> &TrunkIdGenerator {
        &self.ids
    }

    pub fn trunk_file_size(&self) -> u64 {
        self.trunk_file_size
    }

    /// Create and pre-allocate a new trunk file.
    ///
    /// Ids already taken on disk (left over or created by someone else)
    /// are skipped; the loop has no retry limit since every id is new.
    pub fn create_trunk_file(&self) -> Result<CreatedTrunk> {
        let store_path_index = self.selector.select_path(&self.paths)?;
        let root = self.paths.root(store_path_index).ok_or_else(|| {
            Error::Internal(format!("Selected unknown store path {}", store_path_index))
        })?;

        let data_dir = root.join(DATA_DIR);
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| io_failure("create data dir for", &data_dir, e))?;

        let (trunk_id, sub_path, path) = loop {
            let trunk_id = self.ids.next_id()?;
            let encoded = encode_trunk_id(trunk_id);
            let sub_path = self.sharder.shard(&encoded);
            let path = data_dir.join(trunk_file_name(trunk_id, &encoded));

            let exists = path
                .try_exists()
                .map_err(|e| io_failure("stat", &path, e))?;
            if !exists {
                break (trunk_id, sub_path, path);
            }
            warn!(path = %path.display(), trunk_id, "Trunk file already exists, trying next id");
        };

        self.initializer.initialize(&path, self.trunk_file_size)?;

        metrics::TRUNK_FILES_CREATED.inc();
        metrics::TRUNK_BYTES_PREALLOCATED.inc_by(self.trunk_file_size);
        info!(
            path = %path.display(),
            store_path_index,
            trunk_id,
            size = self.trunk_file_size,
            "Created trunk file"
        );
        debug!(sub_path_high = sub_path.0, sub_path_low = sub_path.1, "Trunk file sharding");

        Ok(CreatedTrunk {
            store_path_index,
            sub_path,
            trunk_id,
            path,
        })
    }
}

impl std::fmt::Debug for TrunkFileCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrunkFileCreator")
            .field("paths", &self.paths)
            .field("selector", &self.selector)
            .field("ids", &self.ids)
            .field("initializer", &self.initializer)
            .field("trunk_file_size", &self.trunk_file_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::trunk::naming::{trunk_file_path, HashSharder};
    use crate::storage::trunk::path::StorePathMode;
    use std::path::Path;

    fn creator(roots: Vec<PathBuf>, free: &[u64], mode: StorePathMode) -> TrunkFileCreator {
        let paths = StorePaths::new(roots);
        for (i, &mb) in free.iter().enumerate() {
            paths.free_space().set_free_mb(i, mb).unwrap();
        }
        TrunkFileCreator::new(
            paths,
            PathSelector::new(mode, 10),
            TrunkIdGenerator::new(0),
            Box::new(HashSharder::new(256)),
            TrunkFileInitializer::new(1024),
            4096,
        )
    }

    fn data_files(root: &Path) -> usize {
        std::fs::read_dir(root.join(DATA_DIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_create_trunk_file() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let creator = creator(vec![dir.path().to_path_buf()], &[100], StorePathMode::RoundRobin);

        let created = creator.create_trunk_file()?;
        assert_eq!(created.store_path_index, 0);
        assert_eq!(created.trunk_id, 1);
        assert_eq!(created.path, trunk_file_path(dir.path(), 1));
        assert_eq!(created.sub_path, HashSharder::new(256).shard(&encode_trunk_id(1)));
        assert_eq!(std::fs::metadata(&created.path).unwrap().len(), 4096);
        Ok(())
    }

    #[test]
    fn test_create_skips_existing_names() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let creator = creator(vec![dir.path().to_path_buf()], &[100], StorePathMode::RoundRobin);

        // Residual files for ids 1 and 2
        std::fs::create_dir_all(dir.path().join(DATA_DIR)).unwrap();
        std::fs::write(trunk_file_path(dir.path(), 1), b"old").unwrap();
        std::fs::write(trunk_file_path(dir.path(), 2), b"old").unwrap();

        let created = creator.create_trunk_file()?;
        assert_eq!(created.trunk_id, 3);

        // Residual files are left alone
        assert_eq!(std::fs::read(trunk_file_path(dir.path(), 1)).unwrap(), b"old");
        assert_eq!(data_files(dir.path()), 3);
        Ok(())
    }

    #[test]
    fn test_create_spreads_over_paths() -> Result<()> {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let creator = creator(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            &[100, 100],
            StorePathMode::RoundRobin,
        );

        let first = creator.create_trunk_file()?;
        let second = creator.create_trunk_file()?;
        assert_eq!((first.store_path_index, second.store_path_index), (0, 1));
        assert_eq!(data_files(a.path()), 1);
        assert_eq!(data_files(b.path()), 1);
        Ok(())
    }

    #[test]
    fn test_create_out_of_space_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let creator = creator(vec![dir.path().to_path_buf()], &[100], StorePathMode::LoadBalance);
        creator.selector().publish_load_balance_index(-1);

        assert!(matches!(creator.create_trunk_file(), Err(Error::OutOfSpace(_))));
        assert!(!dir.path().join(DATA_DIR).exists());
        // No id was consumed either
        assert_eq!(creator.ids().current(), 0);
    }

    #[test]
    fn test_create_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the store path directory should be
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"").unwrap();
        let creator = creator(vec![root], &[100], StorePathMode::RoundRobin);

        let err = creator.create_trunk_file().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
