use async_trait::async_trait;

/// Error type a batch function reports, either for a whole batch or for a single key.
pub type BatchError = Box<dyn std::error::Error + Send + Sync>;

/// A `BatchFunction` defines the method through which some `Loader` fetches batched data from
/// some resource. It receives the keys that were queued since the `Loader`'s previous dispatch,
/// in the order `load` was called, and some user defined context struct.
///
/// The returned list must line up positionally with `keys`: the value at index `i` belongs to
/// `keys[i]`, and the list must be exactly as long as `keys`. A list of any other length fails
/// every key in the batch with [`LoadError::BatchContract`](crate::LoadError::BatchContract).
/// Returning `Err` fails every key in the batch with the same error.
///
/// When caching is disabled the same key may appear more than once in `keys`.
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    async fn load(keys: &[K], context: &Self::Context) -> Result<Vec<V>, BatchError>;
}

/// Like [`BatchFunction`], but reports an outcome per key so that one failing key does not fail
/// its siblings.
///
/// A failed key is evicted from the loader cache (unless the loader was configured to cache
/// per-key failures), so the next `load` for it goes back to the batch function.
#[async_trait]
pub trait TryBatchFunction<K, V> {
    type Context;
    async fn load(
        keys: &[K],
        context: &Self::Context,
    ) -> Result<Vec<Result<V, BatchError>>, BatchError>;
}
