//! Physical pre-allocation of trunk files

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, error};

/// Default size of the zero buffer reused across writes
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Largest zero buffer the initializer will allocate
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Creates trunk files filled with zeros and synced to stable storage
#[derive(Debug, Clone, Copy)]
pub struct TrunkFileInitializer {
    chunk_size: usize,
}

impl Default for TrunkFileInitializer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TrunkFileInitializer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Create `path` and pre-allocate `size` zero bytes in it.
    ///
    /// The file must not exist yet. On success the data and metadata are
    /// synced. On failure the partially written file is left behind and
    /// the handle is closed before returning.
    pub fn initialize(&self, path: &Path, size: u64) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| io_failure("create", path, e))?;

        self.fill(&mut file, path, size)?;

        file.sync_all().map_err(|e| io_failure("fsync", path, e))?;

        debug!(path = %path.display(), size, "Initialized trunk file");
        Ok(())
    }

    /// Write `size` zero bytes to `out`, which backs the file at `path`
    fn fill<W: Write>(&self, out: &mut W, path: &Path, size: u64) -> Result<()> {
        self.fill_zeros(out, size)
            .map_err(|e| io_failure("write", path, e))
    }

    fn fill_zeros<W: Write>(&self, out: &mut W, size: u64) -> io::Result<()> {
        let buf_len = usize::try_from(size).map_or(self.chunk_size, |s| s.min(self.chunk_size));
        let buf = vec![0u8; buf_len];
        let mut remaining = size;

        while remaining > 0 {
            let len = remaining.min(buf.len() as u64) as usize;
            let written = out.write(&buf[..len])?;
            if written != len {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", written, len),
                ));
            }
            remaining -= len as u64;
        }

        Ok(())
    }
}

pub(crate) fn io_failure(op: &str, path: &Path, source: io::Error) -> Error {
    error!(
        path = %path.display(),
        errno = source.raw_os_error().unwrap_or(0),
        error = %source,
        "Failed to {} trunk file",
        op
    );
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}
