use std::sync::Arc;

use thiserror::Error;

use crate::batch_function::BatchError;

/// Shared, clonable form of an error reported by a batch function.
pub type SharedBatchError = Arc<dyn std::error::Error + Send + Sync>;

/// Reasons a load can fail.
///
/// Cloned into every waiter of a shared load future, so the batch function's errors are kept
/// behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// `try_load` was called without a key. Nothing was queued.
    #[error("load requested for an absent key")]
    InvalidKey,

    /// The batch function returned a value list that does not line up with its keys.
    #[error("batch function returned {actual} values for {expected} keys")]
    BatchContract { expected: usize, actual: usize },

    /// The batch function failed as a whole; every key of the batch carries this error.
    #[error("batch function failed: {0}")]
    BatchExecution(#[source] SharedBatchError),

    /// The batch function reported a failure for this key only.
    #[error("failed to load key: {0}")]
    PerKey(#[source] SharedBatchError),

    /// `dispatch_and_join` was called where blocking would stall the batch it waits for.
    #[error("dispatch_and_join needs a multi-threaded runtime (block_in_place) or no runtime")]
    BlockingUnsupported,

    /// The loader was dropped before the key was dispatched.
    #[error("loader shut down before the load completed")]
    Canceled,
}

impl LoadError {
    pub(crate) fn batch_execution(error: BatchError) -> Self {
        LoadError::BatchExecution(Arc::from(error))
    }

    pub(crate) fn per_key(error: BatchError) -> Self {
        LoadError::PerKey(Arc::from(error))
    }

    /// Whether this error is shared by every key of a batch, as opposed to a single key.
    pub fn is_batch_level(&self) -> bool {
        matches!(self, LoadError::BatchContract { .. } | LoadError::BatchExecution(_))
    }
}
