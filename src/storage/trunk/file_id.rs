//! Trunk file id generation

use crate::error::{Error, Result};
use parking_lot::Mutex;

/// Process-wide trunk file id counter.
///
/// Ids are strictly increasing and never handed out twice. The lock is
/// held only for the increment itself.
#[derive(Debug, Default)]
pub struct TrunkIdGenerator {
    current: Mutex<u32>,
}

impl TrunkIdGenerator {
    /// Create a generator whose first id will be `start + 1`
    pub fn new(start: u32) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Advance the counter and return the new value
    pub fn next_id(&self) -> Result<u32> {
        let mut current = self.current.lock();
        let next = current.checked_add(1).ok_or(Error::IdExhausted)?;
        *current = next;
        Ok(next)
    }

    /// Last id handed out (or the seed if none was)
    pub fn current(&self) -> u32 {
        *self.current.lock()
    }
}
