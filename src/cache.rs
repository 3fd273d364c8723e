use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use futures::future::{BoxFuture, Shared};
use indexmap::IndexMap;

use crate::error::LoadError;

/// An in-flight or completed load, as held by a cache store. Every clone resolves to the same
/// result.
pub type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, LoadError>>>;

/// Storage for the loads a `Loader` has handed out, keyed by cache key.
///
/// The loader only ever touches its store from its worker task, so implementations need no
/// synchronisation of their own. Nothing is evicted implicitly; an implementation is free to
/// expire or bound its entries.
pub trait CacheStore<C, V> {
    fn contains(&self, key: &C) -> bool;

    /// Returns the load stored for `key`, if any.
    fn get(&self, key: &C) -> Option<SharedLoad<V>>;

    fn set(&mut self, key: C, value: SharedLoad<V>) -> &mut Self;
    fn delete(&mut self, key: &C) -> &mut Self;
    fn clear(&mut self) -> &mut Self;

    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The default store: an insertion-ordered map.
impl<C, V, S: BuildHasher> CacheStore<C, V> for IndexMap<C, SharedLoad<V>, S>
where
    C: Eq + Hash,
{
    fn contains(&self, key: &C) -> bool {
        self.contains_key(key)
    }

    fn get(&self, key: &C) -> Option<SharedLoad<V>> {
        IndexMap::get(self, key).cloned()
    }

    fn set(&mut self, key: C, value: SharedLoad<V>) -> &mut Self {
        self.insert(key, value);
        self
    }

    fn delete(&mut self, key: &C) -> &mut Self {
        self.shift_remove(key);
        self
    }

    fn clear(&mut self) -> &mut Self {
        IndexMap::clear(self);
        self
    }

    fn len(&self) -> usize {
        IndexMap::len(self)
    }
}

impl<C, V, S: BuildHasher> CacheStore<C, V> for HashMap<C, SharedLoad<V>, S>
where
    C: Eq + Hash,
{
    fn contains(&self, key: &C) -> bool {
        self.contains_key(key)
    }

    fn get(&self, key: &C) -> Option<SharedLoad<V>> {
        HashMap::get(self, key).cloned()
    }

    fn set(&mut self, key: C, value: SharedLoad<V>) -> &mut Self {
        self.insert(key, value);
        self
    }

    fn delete(&mut self, key: &C) -> &mut Self {
        self.remove(key);
        self
    }

    fn clear(&mut self) -> &mut Self {
        HashMap::clear(self);
        self
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}
