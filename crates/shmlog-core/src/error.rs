//! Error types for shmlog

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Region creation, opening or mapping failed.
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("segment already exists: {0}")]
    AlreadyExists(String),

    /// Attach target is truncated or not in the expected format.
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("invalid capacity {requested}: must be between 1 and {max}")]
    InvalidCapacity { requested: usize, max: usize },

    #[error("slot not found: index {0}")]
    SlotNotFound(usize),

    #[error("no data before deadline")]
    Timeout,

    #[error("segment is not initialized")]
    NotInitialized,

    #[error("access denied: segment is attached read-only")]
    ReadOnly,
}

pub type Result<T> = std::result::Result<T, Error>;
