use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batchload::{BatchError, BatchFunction, Loader, LoaderOptions, Registry};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Character(String);

#[derive(Default)]
struct Calls(Mutex<usize>);

impl Calls {
    fn bump(&self) {
        *self.0.lock().unwrap() += 1;
    }

    fn count(&self) -> usize {
        *self.0.lock().unwrap()
    }
}

struct Characters {
    names: HashMap<i64, String>,
    calls: Arc<Calls>,
}

struct CharacterBatchFn;

#[async_trait]
impl BatchFunction<i64, Character> for CharacterBatchFn {
    type Context = Characters;
    async fn load(keys: &[i64], context: &Characters) -> Result<Vec<Character>, BatchError> {
        context.calls.bump();
        keys.iter()
            .map(|k| {
                context
                    .names
                    .get(k)
                    .map(|name| Character(name.clone()))
                    .ok_or_else(|| format!("unknown character {}", k).into())
            })
            .collect()
    }
}

struct LengthBatchFn;

#[async_trait]
impl BatchFunction<String, usize> for LengthBatchFn {
    type Context = Arc<Calls>;
    async fn load(keys: &[String], context: &Arc<Calls>) -> Result<Vec<usize>, BatchError> {
        context.bump();
        Ok(keys.iter().map(String::len).collect())
    }
}

fn characters(calls: Arc<Calls>) -> Characters {
    let mut names = HashMap::new();
    names.insert(2001, "R2-D2".to_owned());
    names.insert(1000, "Luke Skywalker".to_owned());
    Characters { names, calls }
}

fn registry(character_calls: Arc<Calls>, length_calls: Arc<Calls>) -> Registry {
    let mut registry = Registry::new();
    registry
        .register("character", Loader::new(CharacterBatchFn, characters(character_calls)))
        .register(
            "length",
            Loader::with_options(LengthBatchFn, length_calls, LoaderOptions::new().statistics(true)),
        );
    registry
}

#[tokio::test]
async fn typed_lookup() {
    let registry = registry(Arc::default(), Arc::default());

    assert!(registry.get::<i64, Character>("character").is_some());
    assert!(registry.get::<String, usize>("length").is_some());
    assert!(registry.get::<String, usize>("character").is_none());
    assert!(registry.get::<i64, Character>("planet").is_none());
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["character", "length"]);
}

#[tokio::test]
async fn dispatch_all_dispatches_every_loader() {
    let character_calls = Arc::new(Calls::default());
    let length_calls = Arc::new(Calls::default());
    let registry = registry(character_calls.clone(), length_calls.clone());

    let characters = registry.get::<i64, Character>("character").unwrap();
    let lengths = registry.get::<String, usize>("length").unwrap();

    let hero = characters.load(2001);
    let friends = characters.load_many(vec![1000, 2001]);
    let length = lengths.load("droid".to_owned());

    registry.dispatch_all();

    assert_eq!(hero.await.unwrap(), Character("R2-D2".to_owned()));
    assert_eq!(
        friends.await.unwrap(),
        vec![Character("Luke Skywalker".to_owned()), Character("R2-D2".to_owned())]
    );
    assert_eq!(length.await.unwrap(), 5);
    assert_eq!(character_calls.count(), 1);
    assert_eq!(length_calls.count(), 1);
}

#[tokio::test]
async fn one_failing_loader_does_not_affect_the_others() {
    let registry = registry(Arc::default(), Arc::default());
    let characters = registry.get::<i64, Character>("character").unwrap();
    let lengths = registry.get::<String, usize>("length").unwrap();

    let unknown = characters.load(42);
    let length = lengths.load("wookiee".to_owned());
    registry.dispatch_all_and_join().await;

    assert!(unknown.await.is_err());
    assert_eq!(length.await.unwrap(), 7);
}

#[tokio::test]
async fn statistics_are_combined() {
    let registry = registry(Arc::default(), Arc::default());
    let lengths = registry.get::<String, usize>("length").unwrap();

    let loads = lengths.load_many(vec!["a".to_owned(), "bb".to_owned(), "a".to_owned()]);
    registry.dispatch_all_and_join().await;
    loads.await.unwrap();

    let stats = registry.statistics().await;
    assert_eq!(stats.load_count, 3);
    assert_eq!(stats.cache_hit_count, 1);
    assert_eq!(stats.batch_invoke_count, 1);
}

#[tokio::test]
async fn register_replaces_and_unregister_removes() {
    let first_calls = Arc::new(Calls::default());
    let second_calls = Arc::new(Calls::default());
    let mut registry = Registry::new();
    registry.register("length", Loader::new(LengthBatchFn, first_calls.clone()));
    registry.register("length", Loader::new(LengthBatchFn, second_calls.clone()));
    assert_eq!(registry.len(), 1);

    let length = registry.get::<String, usize>("length").unwrap().load("ab".to_owned());
    registry.dispatch_all_and_join().await;
    assert_eq!(length.await.unwrap(), 2);
    assert_eq!(first_calls.count(), 0);
    assert_eq!(second_calls.count(), 1);

    registry.unregister("length");
    assert!(registry.is_empty());
    assert!(registry.get::<String, usize>("length").is_none());
}
