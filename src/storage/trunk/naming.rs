//! Trunk file naming and sub-path sharding
//!
//! A trunk file lives at `<store_path>/data/<id hex><id base64>`. The
//! base64 form of the id is also what the sub-path sharder hashes.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// Directory under each store path that holds trunk files
pub const DATA_DIR: &str = "data";

/// Encode a trunk id as URL-safe base64 of its big-endian bytes
pub fn encode_trunk_id(trunk_id: u32) -> String {
    URL_SAFE_NO_PAD.encode(trunk_id.to_be_bytes())
}

/// Inverse of [`encode_trunk_id`]
pub fn decode_trunk_id(encoded: &str) -> Result<u32> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::InvalidArgument(format!("Bad trunk id {:?}: {}", encoded, e)))?;
    let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
        Error::InvalidArgument(format!(
            "Bad trunk id {:?}: expected 4 bytes, got {}",
            encoded,
            bytes.len()
        ))
    })?;
    Ok(u32::from_be_bytes(raw))
}

/// File name of a trunk file: raw id bytes as hex, then the encoded id
pub fn trunk_file_name(trunk_id: u32, encoded: &str) -> String {
    format!("{:08x}{}", trunk_id, encoded)
}

/// Full path of a trunk file under `store_path`
pub fn trunk_file_path(store_path: &Path, trunk_id: u32) -> PathBuf {
    let encoded = encode_trunk_id(trunk_id);
    store_path
        .join(DATA_DIR)
        .join(trunk_file_name(trunk_id, &encoded))
}

/// Computes the two-level sharding coordinates for an encoded name
pub trait SubPathSharder: Send + Sync {
    /// Returns `(high, low)`; must be deterministic for a given name
    fn shard(&self, encoded_name: &str) -> (u32, u32);
}

/// Default sharder: xxh3 of the encoded name, split over
/// `subdir_count` directories per level
#[derive(Debug, Clone, Copy)]
pub struct HashSharder {
    subdir_count: u32,
}

impl HashSharder {
    pub fn new(subdir_count: u32) -> Self {
        Self {
            subdir_count: subdir_count.max(1),
        }
    }
}

impl Default for HashSharder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SubPathSharder for HashSharder {
    fn shard(&self, encoded_name: &str) -> (u32, u32) {
        let hash = xxh3_64(encoded_name.as_bytes());
        let count = self.subdir_count as u64;
        let high = ((hash >> 32) % count) as u32;
        let low = ((hash & 0xFFFF_FFFF) % count) as u32;
        (high, low)
    }
}
