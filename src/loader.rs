use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};

use crate::{
    batch_function::{BatchError, BatchFunction, TryBatchFunction},
    cache::CacheStore,
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp},
    loader_worker::{join_in_order, BatchLoadFn, LoaderWorker},
    options::LoaderOptions,
    statistics::Statistics,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users call [`Loader::load`] and [`Loader::load_many`] to request values; each call returns a
/// future immediately and queues its key. Nothing reaches the batch function until
/// [`Loader::dispatch`] is called, at which point every queued key is handed to it in one call
/// (or one call per `max_batch_size` chunk). With caching enabled, repeated requests for the
/// same cache key share one future and the key is loaded once. The cache can be cleared with
/// [`Loader::clear`], [`Loader::clear_many`] and [`Loader::clear_all`], and results can be added
/// out-of-band through [`Loader::prime`].
///
/// The `Loader` struct acts as an intermediary between the callers and the
/// pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the `Loader` from
/// multiple parallel tasks, and every operation is enqueued on the request channel for
/// processing, in order, by the worker.
///
/// A loader must be created inside a tokio runtime. Dropping it stops the worker once the ops
/// already sent have been handled; keys that were never dispatched then fail with
/// [`LoadError::Canceled`].
pub struct Loader<K, V> {
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
}

impl<K, V> Loader<K, V>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    /// Creates a new Loader for the provided BatchFunction and Context type, with default
    /// options.
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    pub fn new<F>(batch_function: F, context: F::Context) -> Self
    where
        F: 'static + BatchFunction<K, V>,
        F::Context: Send + Sync + 'static,
    {
        Self::with_options(batch_function, context, LoaderOptions::new())
    }

    /// Creates a new Loader whose batch function reports an outcome per key.
    pub fn new_with_try<F>(batch_function: F, context: F::Context) -> Self
    where
        F: 'static + TryBatchFunction<K, V>,
        F::Context: Send + Sync + 'static,
    {
        Self::with_try_options(batch_function, context, LoaderOptions::new())
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    pub fn with_options<F, C, S>(
        _: F,
        context: F::Context,
        options: LoaderOptions<K, V, C, S>,
    ) -> Self
    where
        F: 'static + BatchFunction<K, V>,
        F::Context: Send + Sync + 'static,
        C: 'static + Send,
        S: 'static + CacheStore<C, V> + Send,
    {
        let context = Arc::new(context);
        let batch_fn: BatchLoadFn<K, V> = Arc::new(move |keys: Vec<K>| {
            let context = Arc::clone(&context);
            async move {
                let values = F::load(&keys, &context).await?;
                Ok::<_, BatchError>(values.into_iter().map(Ok).collect::<Vec<_>>())
            }
            .boxed()
        });
        Self::spawn(batch_fn, options)
    }

    pub fn with_try_options<F, C, S>(
        _: F,
        context: F::Context,
        options: LoaderOptions<K, V, C, S>,
    ) -> Self
    where
        F: 'static + TryBatchFunction<K, V>,
        F::Context: Send + Sync + 'static,
        C: 'static + Send,
        S: 'static + CacheStore<C, V> + Send,
    {
        let context = Arc::new(context);
        let batch_fn: BatchLoadFn<K, V> = Arc::new(move |keys: Vec<K>| {
            let context = Arc::clone(&context);
            async move { F::load(&keys, &context).await }.boxed()
        });
        Self::spawn(batch_fn, options)
    }

    fn spawn<C, S>(batch_fn: BatchLoadFn<K, V>, options: LoaderOptions<K, V, C, S>) -> Self
    where
        C: 'static + Send,
        S: 'static + CacheStore<C, V> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn(LoaderWorker::new(batch_fn, options, rx, tx.downgrade()).start());
        Self { request_tx: tx }
    }

    /// Requests the value for `key`.
    ///
    /// Returns immediately. If the cache key is already cached the returned future resolves with
    /// the cached result; otherwise the key is queued for the next [`Loader::dispatch`]. The key
    /// is queued whether or not the returned future is ever polled.
    pub fn load(&self, key: K) -> LoadFuture<V> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::Load(LoadRequest::One(key, response_tx)));
        LoadFuture::new(async move {
            let load = response_rx.await.map_err(|_| LoadError::Canceled)?;
            load.await
        })
    }

    /// Like [`Loader::load`], but rejects an absent key with [`LoadError::InvalidKey`] without
    /// queuing anything.
    pub fn try_load(&self, key: Option<K>) -> Result<LoadFuture<V>, LoadError> {
        key.map(|key| self.load(key)).ok_or(LoadError::InvalidKey)
    }

    /// Requests many values at once.
    ///
    /// The keys are queued together, in order. The returned future resolves to the values in key
    /// order, or to the first failure in key order.
    pub fn load_many<I>(&self, keys: I) -> LoadFuture<Vec<V>>
    where
        I: IntoIterator<Item = K>,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let keys = keys.into_iter().collect::<Vec<_>>();
        self.send(LoaderOp::Load(LoadRequest::Many(keys, response_tx)));
        LoadFuture::new(async move {
            let loads = response_rx.await.map_err(|_| LoadError::Canceled)?;
            join_in_order(loads).await
        })
    }

    /// Like [`Loader::load_many`], but fails with [`LoadError::InvalidKey`] if any key is
    /// absent, in which case none of the keys are queued.
    pub fn try_load_many<I>(&self, keys: I) -> Result<LoadFuture<Vec<V>>, LoadError>
    where
        I: IntoIterator<Item = Option<K>>,
    {
        let keys = keys.into_iter().collect::<Option<Vec<_>>>().ok_or(LoadError::InvalidKey)?;
        Ok(self.load_many(keys))
    }

    /// Sends every queued key to the batch function.
    ///
    /// Returns immediately; the batch function runs on its own task. The returned future
    /// resolves to the values of the dispatched keys in queue order, or to the first failure.
    /// Keys queued after this call are left for the next dispatch.
    pub fn dispatch(&self) -> LoadFuture<Vec<V>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::Dispatch(response_tx));
        LoadFuture::new(async move {
            let results = response_rx.await.map_err(|_| LoadError::Canceled)?;
            results.await
        })
    }

    /// Dispatches and blocks the current thread until the dispatched keys have settled.
    ///
    /// Usable outside of any runtime and from within a multi-threaded runtime, where it relies on
    /// `tokio::task::block_in_place`. A current-thread runtime could never make progress on the
    /// batch while blocked, so there it fails with [`LoadError::BlockingUnsupported`] and leaves
    /// the queue untouched for a later [`Loader::dispatch`].
    pub fn dispatch_and_join(&self) -> Result<Vec<V>, LoadError> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                tracing::warn!("dispatch_and_join called on a current-thread runtime");
                Err(LoadError::BlockingUnsupported)
            }
            Ok(_) => {
                let dispatch = self.dispatch();
                tokio::task::block_in_place(|| futures::executor::block_on(dispatch))
            }
            Err(_) => futures::executor::block_on(self.dispatch()),
        }
    }

    /// Adds a value to the cache. Ignored if the key is already cached.
    pub fn prime(&self, key: K, value: V) -> &Self {
        self.send(LoaderOp::Prime(key, Ok(value)));
        self
    }

    /// Adds a failure to the cache. Ignored if the key is already cached.
    pub fn prime_error(&self, key: K, error: impl Into<BatchError>) -> &Self {
        self.send(LoaderOp::Prime(key, Err(LoadError::per_key(error.into()))));
        self
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) -> &Self {
        self.send(LoaderOp::PrimeMany(key_vals));
        self
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) -> &Self {
        self.send(LoaderOp::Clear(key));
        self
    }

    /// Removes multiple values from the cache at once.
    pub fn clear_many(&self, keys: Vec<K>) -> &Self {
        self.send(LoaderOp::ClearMany(keys));
        self
    }

    /// Empties the cache.
    pub fn clear_all(&self) -> &Self {
        self.send(LoaderOp::ClearAll);
        self
    }

    /// Returns the counters collected so far. All zero unless statistics were enabled.
    pub async fn statistics(&self) -> Statistics {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::Statistics(response_tx));
        response_rx.await.unwrap_or_default()
    }

    fn send(&self, op: LoaderOp<K, V>) {
        if self.request_tx.send(op).is_err() {
            tracing::error!("loader worker terminated");
        }
    }
}

/// A pending load result, returned by [`Loader::load`], [`Loader::load_many`] and
/// [`Loader::dispatch`].
pub struct LoadFuture<T> {
    inner: BoxFuture<'static, Result<T, LoadError>>,
}

impl<T> LoadFuture<T> {
    fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        Self { inner: future.boxed() }
    }
}

impl<T> Future for LoadFuture<T> {
    type Output = Result<T, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}
