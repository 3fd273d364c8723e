use std::collections::HashMap;

use async_trait::async_trait;
use batchload::{BatchError, BatchFunction, Loader, Registry};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, String> for MyBatchFn {
    type Context = HashMap<i64, String>;

    async fn load(keys: &[i64], context: &Self::Context) -> Result<Vec<String>, BatchError> {
        println!("batch: {:?}", keys);
        keys.iter()
            .map(|k| context.get(k).cloned().ok_or_else(|| format!("no film {}", k).into()))
            .collect()
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let mut registry = Registry::new();
    registry.register("films", Loader::new(MyBatchFn {}, context));
    let loader = registry.get::<i64, String>("films").expect("registered above");

    // Nothing is loaded until the registry dispatches: both calls end up in one batch.
    let samurai = loader.load(7);
    let others = loader.load_many(vec![12, 2001, 7]);
    registry.dispatch_all();

    assert_eq!(samurai.await.unwrap(), "samurai");
    assert_eq!(
        others.await.unwrap(),
        vec!["angry men".to_owned(), "a space odyssey".to_owned(), "samurai".to_owned()]
    );

    // Cached now, so no further batch is needed.
    assert_eq!(loader.load(2001).await.unwrap(), "a space odyssey");
}
