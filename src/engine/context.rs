use crate::engine::config::Config;
use crate::engine::error::{ErrorInfo, Result, StormError};
use crate::engine::task::{Signal, TaskQueue};
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Coarse progress of a job on one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobPhase {
    Init,
    Mapping,
    Reducing,
    Indexing,
    Idle,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Init => "INIT",
            JobPhase::Mapping => "MAPPING",
            JobPhase::Reducing => "REDUCING",
            JobPhase::Indexing => "INDEXING",
            JobPhase::Idle => "IDLE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Completion {
    pending: usize,
    started: bool,
    failed: bool,
}

/// Shared per-job state: phase, counters, results, failures and the task queue
pub struct TopologyContext {
    job_id: String,
    config: Config,
    phase: RwLock<JobPhase>,
    map_inputs: AtomicU64,
    map_outputs: AtomicU64,
    reduce_inputs: AtomicU64,
    reduce_outputs: AtomicU64,
    send_outputs: Mutex<BTreeMap<String, u64>>,
    results: Mutex<Vec<(String, String)>>,
    errors: Mutex<Vec<ErrorInfo>>,
    completion: Mutex<Completion>,
    completed: Condvar,
    queue: TaskQueue,
}

impl TopologyContext {
    pub fn new(job_id: impl Into<String>, config: Config, signal: Arc<Signal>) -> Self {
        Self {
            job_id: job_id.into(),
            config,
            phase: RwLock::new(JobPhase::Init),
            map_inputs: AtomicU64::new(0),
            map_outputs: AtomicU64::new(0),
            reduce_inputs: AtomicU64::new(0),
            reduce_outputs: AtomicU64::new(0),
            send_outputs: Mutex::new(BTreeMap::new()),
            results: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            completion: Mutex::new(Completion::default()),
            completed: Condvar::new(),
            queue: TaskQueue::new(signal),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn phase(&self) -> JobPhase {
        *self.phase.read()
    }

    pub fn set_phase(&self, phase: JobPhase) {
        let mut current = self.phase.write();
        // A finished job stays idle; late calls from teardown must not revive it
        if *current != JobPhase::Idle && *current != phase {
            info!("Job {} phase {} -> {}", self.job_id, *current, phase);
            *current = phase;
        }
    }

    pub fn inc_map_inputs(&self) {
        self.map_inputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_map_outputs(&self) {
        self.map_outputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reduce_inputs(&self) {
        self.reduce_inputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reduce_outputs(&self) {
        self.reduce_outputs.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a tuple received for `key`, typically a stream name
    pub fn inc_send_outputs(&self, key: &str) {
        *self.send_outputs.lock().entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn map_inputs(&self) -> u64 {
        self.map_inputs.load(Ordering::Relaxed)
    }

    pub fn map_outputs(&self) -> u64 {
        self.map_outputs.load(Ordering::Relaxed)
    }

    pub fn reduce_inputs(&self) -> u64 {
        self.reduce_inputs.load(Ordering::Relaxed)
    }

    pub fn reduce_outputs(&self) -> u64 {
        self.reduce_outputs.load(Ordering::Relaxed)
    }

    pub fn send_outputs(&self) -> BTreeMap<String, u64> {
        self.send_outputs.lock().clone()
    }

    /// Keys read and written for the current phase, as reported to the master
    pub fn progress(&self) -> (u64, u64) {
        match self.phase() {
            JobPhase::Mapping => (self.map_inputs(), self.map_outputs()),
            JobPhase::Reducing => (self.reduce_inputs(), self.reduce_outputs()),
            JobPhase::Idle => (0, self.reduce_outputs()),
            JobPhase::Init | JobPhase::Indexing => (0, 0),
        }
    }

    pub fn record_result(&self, key: impl Into<String>, value: impl Into<String>) {
        self.results.lock().push((key.into(), value.into()));
    }

    pub fn results(&self) -> Vec<(String, String)> {
        self.results.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.errors.lock().clone()
    }

    /// Number of local executors that must finish before the job is complete
    pub fn register_executors(&self, count: usize) {
        self.completion.lock().pending += count;
    }

    pub fn mark_started(&self) -> bool {
        let mut completion = self.completion.lock();
        let first = !completion.started;
        completion.started = true;
        first
    }

    pub fn is_started(&self) -> bool {
        self.completion.lock().started
    }

    /// Called once by each executor when it reaches its final state
    pub fn executor_finished(&self) {
        let mut completion = self.completion.lock();
        completion.pending = completion.pending.saturating_sub(1);
        if completion.pending == 0 {
            drop(completion);
            self.set_phase(JobPhase::Idle);
            info!("Job {} completed", self.job_id);
            self.completed.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        let completion = self.completion.lock();
        completion.started && completion.pending == 0
    }

    pub fn is_failed(&self) -> bool {
        self.completion.lock().failed
    }

    /// Marks the job failed, records the error and drops its queued tasks.
    ///
    /// Only the first failure is recorded; the same error usually surfaces
    /// again at every caller up the dispatch chain.
    pub fn fail(&self, executor_id: Option<&str>, err: &StormError) {
        {
            let mut completion = self.completion.lock();
            if completion.failed {
                debug!("Job {} already failed, ignoring: {}", self.job_id, err);
                return;
            }
            completion.failed = true;
            self.errors.lock().push(ErrorInfo::new(
                Some(self.job_id.clone()),
                executor_id.map(str::to_string),
                err,
            ));
        }
        error!("Job {} failed: {}", self.job_id, err);
        let dropped = self.queue.clear();
        if dropped > 0 {
            info!("Job {} dropped {} queued tasks", self.job_id, dropped);
        }
        self.completed.notify_all();
    }

    /// Blocks until every local executor is done, the job fails, or `timeout` passes.
    ///
    /// Returns `Ok(true)` on completion, `Ok(false)` on timeout and the first
    /// recorded error if the job failed.
    pub fn await_completion(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut completion = self.completion.lock();
        loop {
            if completion.failed {
                drop(completion);
                let message = self
                    .errors
                    .lock()
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "job failed".to_string());
                return Err(StormError::execution(
                    format!("job {}: {}", self.job_id, message),
                    None,
                ));
            }
            if completion.started && completion.pending == 0 {
                return Ok(true);
            }
            if self
                .completed
                .wait_until(&mut completion, deadline)
                .timed_out()
            {
                return Ok(completion.started && completion.pending == 0 && !completion.failed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn context() -> Arc<TopologyContext> {
        Arc::new(TopologyContext::new(
            "job",
            Config::new(),
            Arc::new(Signal::new()),
        ))
    }

    #[test]
    fn test_progress_by_phase() {
        let ctx = context();
        ctx.inc_map_inputs();
        ctx.inc_map_inputs();
        ctx.inc_map_outputs();
        ctx.inc_reduce_outputs();

        assert_eq!(ctx.progress(), (0, 0));
        ctx.set_phase(JobPhase::Mapping);
        assert_eq!(ctx.progress(), (2, 1));
        ctx.set_phase(JobPhase::Reducing);
        assert_eq!(ctx.progress(), (0, 1));
    }

    #[test]
    fn test_completion_after_all_executors_finish() {
        let ctx = context();
        ctx.register_executors(2);
        ctx.mark_started();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || ctx.await_completion(Duration::from_secs(5)))
        };

        ctx.executor_finished();
        assert!(!ctx.is_complete());
        ctx.executor_finished();

        assert!(waiter.join().unwrap().unwrap());
        assert!(ctx.is_complete());
        assert_eq!(ctx.phase(), JobPhase::Idle);

        // Idle sticks
        ctx.set_phase(JobPhase::Reducing);
        assert_eq!(ctx.phase(), JobPhase::Idle);
    }

    #[test]
    fn test_await_times_out() {
        let ctx = context();
        ctx.register_executors(1);
        ctx.mark_started();
        assert!(!ctx.await_completion(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn test_failure_is_reported() {
        let ctx = context();
        ctx.register_executors(1);
        ctx.mark_started();
        ctx.fail(
            Some("exec"),
            &StormError::ProtocolViolation {
                executor_id: "exec".to_string(),
                source_executor: "up".to_string(),
            },
        );

        assert!(ctx.is_failed());
        assert!(ctx.await_completion(Duration::from_secs(1)).is_err());
        let errors = ctx.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "PROTOCOL_VIOLATION");
        assert_eq!(errors[0].executor_id.as_deref(), Some("exec"));
    }

    #[test]
    fn test_send_outputs_per_key() {
        let ctx = context();
        ctx.inc_send_outputs("WORD_MAP");
        ctx.inc_send_outputs("WORD_MAP");
        ctx.inc_send_outputs("PRINT");
        let counts = ctx.send_outputs();
        assert_eq!(counts.get("WORD_MAP"), Some(&2));
        assert_eq!(counts.get("PRINT"), Some(&1));
    }
}
