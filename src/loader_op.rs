use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::{cache::SharedLoad, error::LoadError, statistics::Statistics};

/// Set of possible requests that can be sent to the [`LoaderWorker`](crate::loader_worker::LoaderWorker).
///
/// Load, Prime and Clear come from the `Loader` handle, each with a single and many variant for
/// convenience. `Settled` is sent back by batch tasks so that the worker can update its cache and
/// counters before the affected futures resolve.
pub enum LoaderOp<K, V> {
    /// Fetch data from the resource wrapped by this loader (or the cache).
    Load(LoadRequest<K, V>),
    /// Send every queued key to the batch function.
    Dispatch(oneshot::Sender<BoxFuture<'static, Result<Vec<V>, LoadError>>>),
    /// Add a result to the cache that was obtained elsewhere. Existing entries win.
    Prime(K, Result<V, LoadError>),
    PrimeMany(Vec<(K, V)>),
    /// Remove entries from the cache so that they will be reloaded when they are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
    Settled(Settlement<K, V>),
    Statistics(oneshot::Sender<Statistics>),
}

impl<K, V> LoaderOp<K, V> {
    pub fn name(&self) -> &'static str {
        match self {
            LoaderOp::Load(LoadRequest::One(..)) => "load",
            LoaderOp::Load(LoadRequest::Many(..)) => "load_many",
            LoaderOp::Dispatch(_) => "dispatch",
            LoaderOp::Prime(..) => "prime",
            LoaderOp::PrimeMany(_) => "prime_many",
            LoaderOp::Clear(_) => "clear",
            LoaderOp::ClearMany(_) => "clear_many",
            LoaderOp::ClearAll => "clear_all",
            LoaderOp::Settled(_) => "settled",
            LoaderOp::Statistics(_) => "statistics",
        }
    }
}

pub enum LoadRequest<K, V> {
    One(K, oneshot::Sender<SharedLoad<V>>),
    Many(Vec<K>, oneshot::Sender<Vec<SharedLoad<V>>>),
}

impl<K, V> LoadRequest<K, V> {
    pub fn keys(&self) -> &[K] {
        match self {
            LoadRequest::One(ref key, _) => std::slice::from_ref(key),
            LoadRequest::Many(ref keys, _) => keys,
        }
    }
}

/// What a finished batch reports back to its worker.
pub struct Settlement<K, V> {
    /// Keys that failed individually, with the load that was handed out for them.
    pub evictions: Vec<(K, SharedLoad<V>)>,
    pub load_errors: usize,
    pub batch_failed: bool,
}
