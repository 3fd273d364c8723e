use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cache::SharedLoad;

/// Maps a key to the value used for deduplication and cache lookups.
pub type CacheKeyFn<K, C> = Arc<dyn Fn(&K) -> C + Send + Sync>;

/// Configuration for a [`Loader`](crate::Loader), fixed at construction.
///
/// `C` is the cache key type and `S` the cache store. Both default to the key type and an
/// insertion-ordered in-memory map. Call [`LoaderOptions::cache_key_fn`] before
/// [`LoaderOptions::cache_store`], since changing the cache key type resets the store.
pub struct LoaderOptions<K, V, C = K, S = IndexMap<C, SharedLoad<V>>> {
    pub(crate) caching: bool,
    pub(crate) batching: bool,
    pub(crate) max_batch_size: Option<NonZeroUsize>,
    pub(crate) cache_key_fn: CacheKeyFn<K, C>,
    pub(crate) cache_store: S,
    pub(crate) statistics: bool,
    pub(crate) cache_per_key_failures: bool,
    pub(crate) name: Option<&'static str>,
    phantom_value: PhantomData<fn() -> V>,
}

impl<K, V> LoaderOptions<K, V>
where
    K: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            caching: true,
            batching: true,
            max_batch_size: None,
            cache_key_fn: Arc::new(K::clone),
            cache_store: IndexMap::new(),
            statistics: false,
            cache_per_key_failures: false,
            name: None,
            phantom_value: PhantomData,
        }
    }
}

impl<K, V> Default for LoaderOptions<K, V>
where
    K: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, S> LoaderOptions<K, V, C, S> {
    /// Whether loads are cached and deduplicated by cache key. Defaults to `true`.
    ///
    /// With caching off every `load` call queues its own entry, so the batch function sees a key
    /// once per request.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    /// Whether loads wait for `dispatch`. Defaults to `true`.
    ///
    /// With batching off each `load` that misses the cache is sent to the batch function on its
    /// own, immediately.
    pub fn batching(mut self, enabled: bool) -> Self {
        self.batching = enabled;
        self
    }

    /// Upper bound on the keys passed to a single batch function call; `0` means unbounded.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = NonZeroUsize::new(max_batch_size);
        self
    }

    /// Collects load counters, readable through `Loader::statistics`. Defaults to `false`.
    pub fn statistics(mut self, enabled: bool) -> Self {
        self.statistics = enabled;
        self
    }

    /// Keep keys that a `TryBatchFunction` reported as failed in the cache, instead of evicting
    /// them so the next load retries. Defaults to `false`.
    pub fn cache_per_key_failures(mut self, enabled: bool) -> Self {
        self.cache_per_key_failures = enabled;
        self
    }

    /// Label for the loader's log span.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Replaces the cache store.
    pub fn cache_store<S2>(self, cache_store: S2) -> LoaderOptions<K, V, C, S2> {
        LoaderOptions {
            caching: self.caching,
            batching: self.batching,
            max_batch_size: self.max_batch_size,
            cache_key_fn: self.cache_key_fn,
            cache_store,
            statistics: self.statistics,
            cache_per_key_failures: self.cache_per_key_failures,
            name: self.name,
            phantom_value: PhantomData,
        }
    }

    /// Derives cache keys from keys with `f`. Resets the cache store to the default map for the
    /// new cache key type.
    pub fn cache_key_fn<C2, F>(self, f: F) -> LoaderOptions<K, V, C2>
    where
        F: Fn(&K) -> C2 + Send + Sync + 'static,
    {
        LoaderOptions {
            caching: self.caching,
            batching: self.batching,
            max_batch_size: self.max_batch_size,
            cache_key_fn: Arc::new(f),
            cache_store: IndexMap::new(),
            statistics: self.statistics,
            cache_per_key_failures: self.cache_per_key_failures,
            name: self.name,
            phantom_value: PhantomData,
        }
    }
}

impl<K, V, C, S> fmt::Debug for LoaderOptions<K, V, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("caching", &self.caching)
            .field("batching", &self.batching)
            .field("max_batch_size", &self.max_batch_size)
            .field("statistics", &self.statistics)
            .field("cache_per_key_failures", &self.cache_per_key_failures)
            .field("name", &self.name)
            .finish()
    }
}
