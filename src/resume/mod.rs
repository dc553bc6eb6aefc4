//! Durable harvest state
//!
//! Three files live in the data directory: the pagination checkpoint, the
//! progress ledger, and the item cache. All of them go through the same
//! atomic write discipline in [`atomic`].

pub mod atomic;
pub mod cache;
pub mod checkpoint;
pub mod ledger;

pub use cache::ItemCache;
pub use checkpoint::{Checkpoint, CheckpointPolicy, CheckpointSlot, CheckpointStore};
pub use ledger::{LedgerClass, ProgressLedger};

/// Maximum size of the checkpoint or ledger file (100MB)
pub const MAX_STATE_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Errors from durable state operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
