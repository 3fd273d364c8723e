mod batch_function;
mod cache;
mod error;
mod loader;
mod loader_op;
mod loader_worker;
mod options;
mod registry;
mod statistics;

pub use batch_function::{BatchError, BatchFunction, TryBatchFunction};
pub use cache::{CacheStore, SharedLoad};
pub use error::{LoadError, SharedBatchError};
pub use loader::{LoadFuture, Loader};
pub use options::{CacheKeyFn, LoaderOptions};
pub use registry::Registry;
pub use statistics::Statistics;
