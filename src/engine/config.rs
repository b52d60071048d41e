//! # Configuration
//!
//! Two layers of configuration live here:
//!
//! * [`Config`] is the per-job string map shipped from the master to every
//!   worker alongside the topology. Its keys match the job submission form
//!   (`workerList`, `workerIndex`, `mapClass`, ...).
//! * [`RuntimeConfig`] holds process-level knobs for a worker: pool size,
//!   retry budgets and the status beacon interval.

use crate::engine::error::{Result, StormError};
use crate::engine::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const WORKER_LIST: &str = "workerList";
pub const WORKER_INDEX: &str = "workerIndex";
pub const JOB_ID: &str = "jobID";
pub const JOB: &str = "job";
pub const MAP_CLASS: &str = "mapClass";
pub const REDUCE_CLASS: &str = "reduceClass";
pub const SPOUT_EXECUTORS: &str = "spoutExecutors";
pub const MAP_EXECUTORS: &str = "mapExecutors";
pub const REDUCE_EXECUTORS: &str = "reduceExecutors";
pub const PRINTER_EXECUTORS: &str = "printerExecutors";
pub const STORAGE_DIRECTORY: &str = "storageDirectory";
pub const INPUT: &str = "input";
pub const INPUT_FILE: &str = "inputFile";
pub const OUTPUT: &str = "output";
pub const BATCH_SIZE: &str = "batchSize";

/// Flat job configuration, serialised as a plain JSON object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(BTreeMap<String, String>);

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of `key`, or a configuration error naming the missing key
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| StormError::config(format!("missing required key '{}'", key)))
    }

    /// Value of `key` parsed as a non-negative integer
    pub fn require_usize(&self, key: &str) -> Result<usize> {
        let raw = self.require(key)?;
        raw.trim().parse::<usize>().map_err(|_| {
            StormError::config(format!("key '{}' must be an integer, got '{}'", key, raw))
        })
    }

    /// Like [`Config::require_usize`] but falls back to `default` when the key is absent
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        if self.contains(key) {
            self.require_usize(key)
        } else {
            Ok(default)
        }
    }

    /// Worker addresses from `workerList`.
    ///
    /// The list is written as `[host:port,host:port]`; brackets are optional.
    /// Each entry gets an `http://` prefix unless it already carries a scheme.
    pub fn workers(&self) -> Result<Vec<String>> {
        let raw = self.require(WORKER_LIST)?;
        let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');

        let workers: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(|w| {
                if w.starts_with("http://") || w.starts_with("https://") {
                    w.to_string()
                } else {
                    format!("http://{}", w)
                }
            })
            .collect();

        if workers.is_empty() {
            return Err(StormError::config("workerList is empty"));
        }
        Ok(workers)
    }

    /// Index of this worker in `workerList`, checked against the list length
    pub fn worker_index(&self) -> Result<usize> {
        let index = self.require_usize(WORKER_INDEX)?;
        let count = self.workers()?.len();
        if index >= count {
            return Err(StormError::config(format!(
                "workerIndex {} out of range for {} workers",
                index, count
            )));
        }
        Ok(index)
    }

    /// Job identifier: `jobID`, falling back to `job`
    pub fn job_id(&self) -> Option<&str> {
        self.get(JOB_ID).or_else(|| self.get(JOB))
    }

    /// Tuples per remote push; 1 means one request per tuple
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.usize_or(BATCH_SIZE, 1)?.max(1))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Config(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Process-level settings for a worker's cluster runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of pool threads executing tasks
    pub pool_size: usize,
    /// Polling used by remote pushes that arrive before the stream router exists
    pub router_retry: RetryConfig,
    /// Retry policy for outbound worker-to-worker pushes
    pub push_retry: RetryConfig,
    /// Upper bound on how long an idle pool thread sleeps before rechecking for shutdown
    pub idle_wait: Duration,
    /// Period of the status beacon sent to the master
    pub status_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get().max(2),
            router_retry: RetryConfig::polling(100, 100),
            push_retry: RetryConfig::default(),
            idle_wait: Duration::from_millis(200),
            status_interval: Duration::from_secs(10),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `STORMLITE_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(size) = env_parse::<usize>("STORMLITE_POOL_SIZE") {
            config.pool_size = size.max(1);
        }
        if let Some(retries) = env_parse::<u32>("STORMLITE_ROUTER_RETRIES") {
            config.router_retry.max_retries = retries;
        }
        if let Some(secs) = env_parse::<u64>("STORMLITE_STATUS_INTERVAL_SECS") {
            config.status_interval = Duration::from_secs(secs.max(1));
        }
        config
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
