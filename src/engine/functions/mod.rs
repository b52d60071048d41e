use crate::engine::collector::OutputCollector;
use crate::engine::error::Result;

pub mod jobs;
pub use jobs::{SumByKey, WordCount};

pub mod map;
pub use map::MapBolt;

pub mod reduce;
pub use reduce::ReduceBolt;

pub mod print;
pub use print::PrintBolt;

pub mod spout;
pub use spout::FileSpout;

// Re-export all built-in components for easier access
pub mod builtins {
    use super::*;
    use crate::engine::registry::ComponentRegistry;
    use std::sync::Arc;

    // Standard ids used for registering built-ins
    pub const FILE_SPOUT: &str = "file";
    pub const MAP_BOLT: &str = "map";
    pub const REDUCE_BOLT: &str = "reduce";
    pub const PRINT_BOLT: &str = "print";
    pub const WORD_COUNT_JOB: &str = "word_count";
    pub const SUM_BY_KEY_JOB: &str = "sum_by_key";

    /// Registers every built-in spout, bolt and job
    pub fn register_all(registry: &mut ComponentRegistry) {
        registry
            .register_spout(FILE_SPOUT, |config, _| Ok(Box::new(FileSpout::from_config(config))))
            .register_bolt(MAP_BOLT, |config, registry| {
                Ok(Box::new(MapBolt::from_config(config, registry)?))
            })
            .register_bolt(REDUCE_BOLT, |config, registry| {
                Ok(Box::new(ReduceBolt::from_config(config, registry)?))
            })
            .register_bolt(PRINT_BOLT, |_, _| Ok(Box::new(PrintBolt::new())))
            .register_job(WORD_COUNT_JOB, Arc::new(WordCount))
            .register_job(SUM_BY_KEY_JOB, Arc::new(SumByKey));
    }
}

/// A MapReduce job plugged into the `map` and `reduce` bolts
///
/// ## Usage
///
/// Implement this trait and register it under an id; jobs pick it up through
/// the `mapClass` and `reduceClass` configuration keys. Output goes through
/// [`OutputCollector::write`] so the job's counters stay accurate.
pub trait Job: Send + Sync {
    /// Processes one input record
    ///
    /// # Arguments
    ///
    /// * `key` - Record key
    /// * `value` - Record value
    /// * `collector` - Sink for emitted `(key, value)` pairs
    fn map(&self, key: &str, value: &str, collector: &OutputCollector) -> Result<()>;

    /// Combines every value seen for `key`, in arrival order
    fn reduce(&self, key: &str, values: &[String], collector: &OutputCollector) -> Result<()>;
}
