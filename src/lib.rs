// trunkstore - trunk space allocation for small-file storage nodes
// Packs small files into large pre-allocated trunk files

#![warn(rust_2018_idioms)]

pub mod config;
pub mod logging;
pub mod metrics;
pub mod storage;

// Re-exports for convenience
pub use config::{LogConfig, TrunkConfig};
pub use storage::trunk::{TrunkAllocator, TrunkSpace, TrunkStatus};

/// trunkstore error types
pub mod error {
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("No slot for a request of {size} bytes (largest slot is {max} bytes)")]
        NoMatchingSlot { size: u64, max: u64 },

        #[error("Out of space: {0}")]
        OutOfSpace(String),

        #[error("I/O error on {}: {source}", path.display())]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },

        #[error("Out of memory: {0}")]
        OutOfMemory(String),

        #[error("Trunk id space exhausted")]
        IdExhausted,

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    impl Error {
        /// Underlying system error code of an I/O failure
        pub fn raw_os_error(&self) -> Option<i32> {
            match self {
                Error::Io { source, .. } => source.raw_os_error(),
                _ => None,
            }
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
