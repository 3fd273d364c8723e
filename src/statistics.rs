use std::ops::Add;

/// Counters collected by a loader configured with `LoaderOptions::statistics(true)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Number of keys requested through `load` and `load_many` (not necessarily unique).
    pub load_count: u64,
    /// Number of requested keys that were served from the cache.
    pub cache_hit_count: u64,
    /// Number of times a batch function was invoked.
    pub batch_invoke_count: u64,
    /// Total number of keys passed to the batch function.
    pub batch_load_count: u64,
    /// Number of keys a `TryBatchFunction` reported as failed.
    pub load_error_count: u64,
    /// Number of batch function calls that failed as a whole.
    pub batch_failure_count: u64,
}

impl Statistics {
    /// Share of requested keys that were served from the cache.
    pub fn cache_hit_ratio(&self) -> f64 {
        ratio(self.cache_hit_count, self.load_count)
    }

    /// Average number of keys per batch function call.
    pub fn average_batch_size(&self) -> f64 {
        ratio(self.batch_load_count, self.batch_invoke_count)
    }

    pub fn combine(&self, other: &Statistics) -> Statistics {
        Statistics {
            load_count: self.load_count + other.load_count,
            cache_hit_count: self.cache_hit_count + other.cache_hit_count,
            batch_invoke_count: self.batch_invoke_count + other.batch_invoke_count,
            batch_load_count: self.batch_load_count + other.batch_load_count,
            load_error_count: self.load_error_count + other.load_error_count,
            batch_failure_count: self.batch_failure_count + other.batch_failure_count,
        }
    }
}

impl Add for Statistics {
    type Output = Statistics;

    fn add(self, other: Statistics) -> Statistics {
        self.combine(&other)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Records loader activity on behalf of the worker. A disabled recorder ignores everything.
#[derive(Debug)]
pub(crate) struct StatisticsRecorder {
    /// Human readable name used to identify these statistics when they are reported.
    tag: &'static str,
    enabled: bool,
    stats: Statistics,
}

impl StatisticsRecorder {
    pub fn new(tag: &'static str, enabled: bool) -> Self {
        Self { tag, enabled, stats: Statistics::default() }
    }

    pub fn snapshot(&self) -> Statistics {
        self.stats
    }

    pub fn record_load(&mut self) {
        if self.enabled {
            self.stats.load_count += 1;
        }
    }

    pub fn record_cache_hit(&mut self) {
        if self.enabled {
            self.stats.cache_hit_count += 1;
        }
    }

    pub fn record_batch(&mut self, batch_size: usize) {
        if self.enabled {
            self.stats.batch_invoke_count += 1;
            self.stats.batch_load_count += batch_size as u64;
        }
    }

    pub fn record_load_errors(&mut self, errors: usize) {
        if self.enabled {
            self.stats.load_error_count += errors as u64;
        }
    }

    pub fn record_batch_failure(&mut self) {
        if self.enabled {
            self.stats.batch_failure_count += 1;
        }
    }
}

impl Drop for StatisticsRecorder {
    fn drop(&mut self) {
        if self.enabled {
            tracing::debug!(tag = self.tag, statistics = ?self.stats);
        }
    }
}
