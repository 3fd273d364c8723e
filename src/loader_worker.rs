use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{span, Level};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchError,
    cache::{CacheStore, SharedLoad},
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp, Settlement},
    options::{CacheKeyFn, LoaderOptions},
    statistics::StatisticsRecorder,
};

/// The batch function with its context bound and its per-key outcomes made explicit.
pub type BatchLoadFn<K, V> = Arc<
    dyn Fn(Vec<K>) -> BoxFuture<'static, Result<Vec<Result<V, BatchError>>, BatchError>>
        + Send
        + Sync,
>;

/// A key waiting for the next dispatch, together with the promise its load future waits on.
struct QueuedLoad<K, V> {
    key: K,
    promise: oneshot::Sender<Result<V, LoadError>>,
    load: SharedLoad<V>,
}

/// A `LoaderWorker` is the "single-thread" worker task that owns a loader's pending queue and
/// cache.
///
/// Once started, it runs in a loop until every `Loader` handle (and therefore every strong
/// sender of its request channel) has been dropped. Ops are handled strictly in the order they
/// arrive, which is what serialises concurrent `load` calls from many tasks.
///
/// A `Load` op either finds its cache key in the cache and answers with the stored future, or
/// creates a new promise, stores its future in the cache and queues the key. A `Dispatch` op
/// drains the queue, splits it into chunks of at most `max_batch_size` keys and spawns one batch
/// task per chunk. Batch tasks fan the results out to the queued promises themselves; when some
/// keys failed they first send a `Settled` op back so that the worker can evict those keys
/// before anyone observes the failure.
pub struct LoaderWorker<K, V, C, S>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
    S: CacheStore<C, V>,
{
    cache: S,
    cache_key_fn: CacheKeyFn<K, C>,
    caching: bool,
    batching: bool,
    max_batch_size: Option<NonZeroUsize>,
    evict_failed_keys: bool,
    batch_fn: BatchLoadFn<K, V>,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    settle_tx: mpsc::WeakUnboundedSender<LoaderOp<K, V>>,
    queue: Vec<QueuedLoad<K, V>>,
    stats: StatisticsRecorder,
    debug_name: &'static str,
}

impl<K, V, C, S> LoaderWorker<K, V, C, S>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
    S: CacheStore<C, V>,
{
    pub fn new(
        batch_fn: BatchLoadFn<K, V>,
        options: LoaderOptions<K, V, C, S>,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        settle_tx: mpsc::WeakUnboundedSender<LoaderOp<K, V>>,
    ) -> Self {
        let debug_name = options.name.unwrap_or_else(std::any::type_name::<(K, V)>);
        Self {
            cache: options.cache_store,
            cache_key_fn: options.cache_key_fn,
            caching: options.caching,
            batching: options.batching,
            max_batch_size: options.max_batch_size,
            evict_failed_keys: options.caching && !options.cache_per_key_failures,
            batch_fn,
            request_rx,
            settle_tx,
            queue: Vec::new(),
            stats: StatisticsRecorder::new(debug_name, options.statistics),
            debug_name,
        }
    }

    pub async fn start(mut self) {
        let span = span!(Level::TRACE, "LoaderWorker", loader = self.debug_name);
        async move {
            while let Some(op) = self.request_rx.recv().await {
                self.mux_op(op);
            }
            if !self.queue.is_empty() {
                tracing::debug!(
                    undispatched = self.queue.len(),
                    "dropping keys that were never dispatched"
                );
            }
            tracing::info!("Tx channel closed. Terminating LoaderWorker.");
        }
        .instrument(span)
        .await
    }

    #[tracing::instrument(skip_all, fields(op = op.name()))]
    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(request) => {
                tracing::trace!(requested_keys = ?request.keys());
                match request {
                    LoadRequest::One(key, response_tx) => {
                        let load = self.load(key);
                        if response_tx.send(load).is_err() {
                            tracing::debug!("load receiver dropped");
                        }
                    }
                    LoadRequest::Many(keys, response_tx) => {
                        let loads = keys.into_iter().map(|key| self.load(key)).collect::<Vec<_>>();
                        if response_tx.send(loads).is_err() {
                            tracing::debug!("load_many receiver dropped");
                        }
                    }
                }
            }
            LoaderOp::Dispatch(response_tx) => {
                let results = self.dispatch();
                if response_tx.send(results).is_err() {
                    tracing::debug!("dispatch receiver dropped");
                }
            }
            LoaderOp::Prime(key, result) => self.prime(key, result),
            LoaderOp::PrimeMany(key_vals) => {
                for (key, value) in key_vals {
                    self.prime(key, Ok(value));
                }
            }
            LoaderOp::Clear(key) => self.clear(&key),
            LoaderOp::ClearMany(keys) => keys.iter().for_each(|key| self.clear(key)),
            LoaderOp::ClearAll => {
                self.cache.clear();
            }
            LoaderOp::Settled(settlement) => self.settle(settlement),
            LoaderOp::Statistics(response_tx) => {
                if response_tx.send(self.stats.snapshot()).is_err() {
                    tracing::debug!("statistics receiver dropped");
                }
            }
        }
    }

    fn load(&mut self, key: K) -> SharedLoad<V> {
        self.stats.record_load();
        let cache_key = (self.cache_key_fn)(&key);
        if self.caching {
            if let Some(load) = self.cache.get(&cache_key) {
                self.stats.record_cache_hit();
                return load;
            }
        }

        let (promise, load) = pending_load();
        if self.caching {
            self.cache.set(cache_key, load.clone());
        }
        let queued = QueuedLoad { key, promise, load: load.clone() };
        if self.batching {
            self.queue.push(queued);
        } else {
            self.spawn_batch(vec![queued]);
        }
        load
    }

    fn dispatch(&mut self) -> BoxFuture<'static, Result<Vec<V>, LoadError>> {
        let queue = std::mem::take(&mut self.queue);
        if queue.is_empty() {
            return future::ready(Ok(Vec::new())).boxed();
        }

        let loads = queue.iter().map(|queued| queued.load.clone()).collect::<Vec<_>>();
        let chunk_size = self.max_batch_size.map_or(queue.len(), NonZeroUsize::get);
        tracing::debug!(keys = queue.len(), chunk_size, "dispatching");

        let mut queue = queue.into_iter();
        loop {
            let chunk = queue.by_ref().take(chunk_size).collect::<Vec<_>>();
            if chunk.is_empty() {
                break;
            }
            self.spawn_batch(chunk);
        }
        join_in_order(loads).boxed()
    }

    fn spawn_batch(&mut self, batch: Vec<QueuedLoad<K, V>>) {
        self.stats.record_batch(batch.len());
        let span = tracing::debug_span!("batch", loader = self.debug_name, size = batch.len());
        tokio::spawn(
            execute_batch(
                Arc::clone(&self.batch_fn),
                batch,
                self.settle_tx.clone(),
                self.evict_failed_keys,
            )
            .instrument(span),
        );
    }

    fn prime(&mut self, key: K, result: Result<V, LoadError>) {
        if !self.caching {
            tracing::debug!(?key, "caching disabled, ignoring prime");
            return;
        }
        let cache_key = (self.cache_key_fn)(&key);
        if !self.cache.contains(&cache_key) {
            self.cache.set(cache_key, future::ready(result).boxed().shared());
        }
    }

    fn clear(&mut self, key: &K) {
        let cache_key = (self.cache_key_fn)(key);
        self.cache.delete(&cache_key);
    }

    fn settle(&mut self, settlement: Settlement<K, V>) {
        if settlement.batch_failed {
            self.stats.record_batch_failure();
        }
        self.stats.record_load_errors(settlement.load_errors);
        for (key, load) in settlement.evictions {
            let cache_key = (self.cache_key_fn)(&key);
            // Only evict the load that failed, not a newer one for the same key.
            if self.cache.get(&cache_key).map_or(false, |cached| cached.ptr_eq(&load)) {
                tracing::debug!(?key, "evicting failed key");
                self.cache.delete(&cache_key);
            }
        }
    }
}

/// Resolves to the loads' values in order, or to the first failure in that order.
///
/// Each load is driven by its own batch task, so awaiting them one after another does not delay
/// any batch.
pub(crate) async fn join_in_order<V>(loads: Vec<SharedLoad<V>>) -> Result<Vec<V>, LoadError>
where
    V: Clone,
{
    let mut values = Vec::with_capacity(loads.len());
    for load in loads {
        values.push(load.await?);
    }
    Ok(values)
}

fn pending_load<V>() -> (oneshot::Sender<Result<V, LoadError>>, SharedLoad<V>)
where
    V: 'static + Clone + Send + Sync,
{
    let (promise, rx) = oneshot::channel();
    let load = rx.map(|result| result.unwrap_or(Err(LoadError::Canceled))).boxed().shared();
    (promise, load)
}

/// Runs one batch function call and resolves every promise of the batch, positionally.
async fn execute_batch<K, V>(
    batch_fn: BatchLoadFn<K, V>,
    batch: Vec<QueuedLoad<K, V>>,
    settle_tx: mpsc::WeakUnboundedSender<LoaderOp<K, V>>,
    evict_failed_keys: bool,
) where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    let keys = batch.iter().map(|queued| queued.key.clone()).collect::<Vec<_>>();
    let expected = keys.len();

    let outcome = match batch_fn(keys).await {
        Ok(values) if values.len() == expected => Ok(values),
        Ok(values) => {
            tracing::warn!(expected, actual = values.len(), "batch function broke its contract");
            Err(LoadError::BatchContract { expected, actual: values.len() })
        }
        Err(e) => {
            tracing::debug!(error = %e, "batch function failed");
            Err(LoadError::batch_execution(e))
        }
    };

    let values = match outcome {
        Ok(values) => values,
        Err(error) => {
            report(&settle_tx, Settlement { evictions: Vec::new(), load_errors: 0, batch_failed: true });
            for queued in batch {
                resolve(queued.promise, Err(error.clone()));
            }
            return;
        }
    };

    let mut evictions = Vec::new();
    let mut load_errors = 0;
    let results = batch
        .into_iter()
        .zip(values)
        .map(|(queued, value)| match value {
            Ok(value) => (queued.promise, Ok(value)),
            Err(e) => {
                load_errors += 1;
                if evict_failed_keys {
                    evictions.push((queued.key, queued.load));
                }
                (queued.promise, Err(LoadError::per_key(e)))
            }
        })
        .collect::<Vec<_>>();

    if load_errors > 0 {
        report(&settle_tx, Settlement { evictions, load_errors, batch_failed: false });
    }
    for (promise, result) in results {
        resolve(promise, result);
    }
}

fn report<K, V>(settle_tx: &mpsc::WeakUnboundedSender<LoaderOp<K, V>>, settlement: Settlement<K, V>) {
    match settle_tx.upgrade() {
        Some(tx) => {
            if tx.send(LoaderOp::Settled(settlement)).is_err() {
                tracing::debug!("worker terminated before batch settled");
            }
        }
        None => tracing::debug!("loader dropped before batch settled"),
    }
}

fn resolve<V>(promise: oneshot::Sender<Result<V, LoadError>>, result: Result<V, LoadError>) {
    if promise.send(result).is_err() {
        tracing::debug!("load receiver dropped");
    }
}
