use std::any::Any;
use std::fmt::Debug;

use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;

use crate::{loader::Loader, statistics::Statistics};

/// The parts of a loader the registry needs without knowing its key and value types.
trait RegisteredLoader: Send + Sync {
    fn dispatch(&self) -> BoxFuture<'static, ()>;
    fn statistics(&self) -> BoxFuture<'_, Statistics>;
    fn as_any(&self) -> &dyn Any;
}

impl<K, V> RegisteredLoader for Loader<K, V>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn dispatch(&self) -> BoxFuture<'static, ()> {
        Loader::dispatch(self).map(|_| ()).boxed()
    }

    fn statistics(&self) -> BoxFuture<'_, Statistics> {
        Loader::statistics(self).boxed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A named collection of loaders that are dispatched together, e.g. once per level of a GraphQL
/// query. Meant to live as long as one request, not the process.
#[derive(Default)]
pub struct Registry {
    loaders: IndexMap<String, Box<dyn RegisteredLoader>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` under `name`, replacing any loader registered under the same name.
    pub fn register<K, V>(&mut self, name: impl Into<String>, loader: Loader<K, V>) -> &mut Self
    where
        K: 'static + Clone + Debug + Send + Sync,
        V: 'static + Clone + Send + Sync,
    {
        let name = name.into();
        if self.loaders.insert(name.clone(), Box::new(loader)).is_some() {
            tracing::debug!(%name, "replaced registered loader");
        }
        self
    }

    pub fn unregister(&mut self, name: &str) -> &mut Self {
        self.loaders.shift_remove(name);
        self
    }

    /// Returns the loader registered under `name`, provided it has the requested key and value
    /// types.
    pub fn get<K, V>(&self, name: &str) -> Option<&Loader<K, V>>
    where
        K: 'static,
        V: 'static,
    {
        self.loaders.get(name)?.as_any().downcast_ref::<Loader<K, V>>()
    }

    /// Names of the registered loaders, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Dispatches every registered loader. Each dispatch is independent; results are not
    /// collected.
    pub fn dispatch_all(&self) {
        tracing::debug!(loaders = self.loaders.len(), "dispatching all loaders");
        for loader in self.loaders.values() {
            drop(loader.dispatch());
        }
    }

    /// Dispatches every registered loader and waits until all of the dispatched keys have
    /// settled, successfully or not.
    pub async fn dispatch_all_and_join(&self) {
        future::join_all(self.loaders.values().map(|loader| loader.dispatch())).await;
    }

    /// Combined counters of every registered loader.
    pub async fn statistics(&self) -> Statistics {
        future::join_all(self.loaders.values().map(|loader| loader.statistics()))
            .await
            .into_iter()
            .fold(Statistics::default(), |total, stats| total + stats)
    }
}
