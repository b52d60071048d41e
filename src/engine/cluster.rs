use crate::engine::component::ComponentContext;
use crate::engine::config::{Config, RuntimeConfig};
use crate::engine::context::TopologyContext;
use crate::engine::error::{Result, StormError};
use crate::engine::executor::{BoltExecutor, SpoutExecutor};
use crate::engine::registry::ComponentRegistry;
use crate::engine::router::StreamRouter;
use crate::engine::task::{Signal, Task};
use crate::engine::topology::Topology;
use crate::engine::transport::{HttpTransport, RemoteTransport, SenderBolt};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything one job owns on this worker
pub struct JobRuntime {
    topology: Topology,
    context: Arc<TopologyContext>,
    spouts: Vec<Arc<SpoutExecutor>>,
    bolts: Vec<Arc<BoltExecutor>>,
    routers: HashMap<String, Arc<StreamRouter>>,
}

impl JobRuntime {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn context(&self) -> &Arc<TopologyContext> {
        &self.context
    }

    pub fn spouts(&self) -> &[Arc<SpoutExecutor>] {
        &self.spouts
    }

    pub fn bolts(&self) -> &[Arc<BoltExecutor>] {
        &self.bolts
    }

    pub fn router(&self, stream: &str) -> Option<&Arc<StreamRouter>> {
        self.routers.get(stream)
    }

    fn teardown(&self) {
        self.context.queue().clear();
        for bolt in &self.bolts {
            bolt.cleanup();
        }
        for spout in &self.spouts {
            spout.close();
        }
    }
}

struct ClusterInner {
    jobs: RwLock<BTreeMap<String, Arc<JobRuntime>>>,
    last_job: RwLock<Option<String>>,
    signal: Arc<Signal>,
    quit: AtomicBool,
    accepting: AtomicBool,
    cursor: AtomicUsize,
    registry: ComponentRegistry,
    transport: Arc<dyn RemoteTransport>,
    settings: RuntimeConfig,
}

/// Per-process runtime that instantiates topologies and runs them on a
/// fixed pool of threads.
///
/// Spout steps are the only scheduled tasks; bolts run inline on the thread
/// that delivers a tuple to them. Several jobs may run at once, and pool
/// threads rotate across their queues.
pub struct Cluster {
    inner: Arc<ClusterInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Cluster {
    /// Creates a cluster and starts its thread pool
    ///
    /// # Arguments
    /// * `registry` - Components available to topologies
    /// * `transport` - Delivery to other workers
    /// * `settings` - Pool size, retry budgets and timings
    pub fn new(
        registry: ComponentRegistry,
        transport: Arc<dyn RemoteTransport>,
        settings: RuntimeConfig,
    ) -> Self {
        let inner = Arc::new(ClusterInner {
            jobs: RwLock::new(BTreeMap::new()),
            last_job: RwLock::new(None),
            signal: Arc::new(Signal::new()),
            quit: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            cursor: AtomicUsize::new(0),
            registry,
            transport,
            settings,
        });

        let pool_size = inner.settings.pool_size.max(1);
        let mut handles = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            let inner = Arc::clone(&inner);
            handles.push(thread::spawn(move || pool_loop(id, inner)));
        }
        info!("Cluster started with {} pool threads", pool_size);

        Self {
            inner,
            handles: Mutex::new(handles),
        }
    }

    /// Cluster talking to peers over HTTP
    pub fn with_http(registry: ComponentRegistry, settings: RuntimeConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(30), settings.push_retry.clone())?;
        Ok(Self::new(registry, Arc::new(transport), settings))
    }

    pub fn settings(&self) -> &RuntimeConfig {
        &self.inner.settings
    }

    /// Instantiates `topology` for `job_id` without starting it.
    ///
    /// Every spout and bolt is created and prepared and every stream router
    /// wired before the job becomes visible. If any step fails, what was
    /// built is torn down and the error returned.
    pub fn submit_topology(&self, job_id: &str, config: Config, topology: Topology) -> Result<()> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(StormError::ShuttingDown);
        }
        if self.inner.jobs.read().contains_key(job_id) {
            return Err(StormError::config(format!(
                "job '{}' is already defined",
                job_id
            )));
        }
        topology.validate()?;

        let workers = config.workers()?;
        let position = config.worker_index()?;
        let batch_size = config.batch_size()?;
        let context = Arc::new(TopologyContext::new(
            job_id,
            config.clone(),
            Arc::clone(&self.inner.signal),
        ));

        let mut runtime = JobRuntime {
            topology,
            context,
            spouts: Vec::new(),
            bolts: Vec::new(),
            routers: HashMap::new(),
        };

        if let Err(e) = self.build(&mut runtime, &config, &workers, position, batch_size) {
            warn!("Definition of job {} failed: {}", job_id, e);
            runtime.teardown();
            return Err(e);
        }

        runtime
            .context
            .register_executors(runtime.spouts.len() + runtime.bolts.len());
        info!(
            "Job {} defined: {} spouts, {} bolts, worker {}/{}",
            job_id,
            runtime.spouts.len(),
            runtime.bolts.len(),
            position,
            workers.len()
        );

        let mut jobs = self.inner.jobs.write();
        if jobs.contains_key(job_id) {
            drop(jobs);
            runtime.teardown();
            return Err(StormError::config(format!(
                "job '{}' is already defined",
                job_id
            )));
        }
        jobs.insert(job_id.to_string(), Arc::new(runtime));
        *self.inner.last_job.write() = Some(job_id.to_string());
        Ok(())
    }

    fn build(
        &self,
        runtime: &mut JobRuntime,
        config: &Config,
        workers: &[String],
        position: usize,
        batch_size: usize,
    ) -> Result<()> {
        let registry = &self.inner.registry;
        let topology = runtime.topology.clone();
        let mut spouts_by_node: HashMap<&str, Vec<Arc<SpoutExecutor>>> = HashMap::new();
        let mut bolts_by_node: HashMap<&str, Vec<Arc<BoltExecutor>>> = HashMap::new();

        for (name, decl) in topology.spouts() {
            for task_index in 0..decl.parallelism {
                let component = ComponentContext {
                    node: name.clone(),
                    task_index,
                    parallelism: decl.parallelism,
                    context: Arc::clone(&runtime.context),
                };
                let spout = registry.create_spout(&decl.component, config)?;
                let executor = Arc::new(SpoutExecutor::new(spout, &component)?);
                runtime.spouts.push(Arc::clone(&executor));
                spouts_by_node.entry(name).or_default().push(executor);
            }
        }

        for (name, decl) in topology.bolts() {
            let upstream = topology.parallelism(&decl.upstream).ok_or_else(|| {
                StormError::config(format!("unknown upstream '{}'", decl.upstream))
            })?;
            // Every upstream executor on every worker votes once
            let expected_votes = upstream * workers.len();

            for task_index in 0..decl.parallelism {
                let component = ComponentContext {
                    node: name.clone(),
                    task_index,
                    parallelism: decl.parallelism,
                    context: Arc::clone(&runtime.context),
                };
                let bolt = registry.create_bolt(&decl.component, config)?;
                let executor = Arc::new(BoltExecutor::new(bolt, &component, expected_votes)?);
                runtime.bolts.push(Arc::clone(&executor));
                bolts_by_node.entry(name).or_default().push(executor);
            }
        }

        for (name, decl) in topology.bolts() {
            let locals = bolts_by_node.get(name.as_str()).cloned().unwrap_or_default();
            let remotes: Vec<Arc<SenderBolt>> = workers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, address)| {
                    Arc::new(SenderBolt::new(
                        address.clone(),
                        runtime.context.job_id(),
                        name.clone(),
                        batch_size,
                        Arc::clone(&self.inner.transport),
                    ))
                })
                .collect();
            let router = Arc::new(StreamRouter::new(
                name.clone(),
                decl.grouping.clone(),
                locals,
                remotes,
                position,
            ));

            if let Some(producers) = spouts_by_node.get(decl.upstream.as_str()) {
                for producer in producers {
                    producer.collector().add_router(Arc::clone(&router));
                }
            }
            if let Some(producers) = bolts_by_node.get(decl.upstream.as_str()) {
                for producer in producers {
                    producer.collector().add_router(Arc::clone(&router));
                }
            }
            debug!(
                "Stream {} of job {}: {} slots",
                name,
                runtime.context.job_id(),
                router.slots().len()
            );
            runtime.routers.insert(name.clone(), router);
        }
        Ok(())
    }

    /// Queues one task per spout executor. Starting a running job does nothing.
    pub fn start_job(&self, job_id: &str) -> Result<()> {
        let job = self.job(job_id)?;
        if !job.context.mark_started() {
            debug!("Job {} already started", job_id);
            return Ok(());
        }
        info!("Starting job {}", job_id);
        for spout in &job.spouts {
            job.context.queue().push(Task::new(Arc::clone(spout)));
        }
        Ok(())
    }

    /// Starts every defined job that has not been started yet
    pub fn start_pending(&self) -> usize {
        let pending: Vec<String> = self
            .inner
            .jobs
            .read()
            .iter()
            .filter(|(_, job)| !job.context.is_started())
            .map(|(id, _)| id.clone())
            .collect();

        let mut started = 0;
        for job_id in pending {
            match self.start_job(&job_id) {
                Ok(()) => started += 1,
                Err(e) => warn!("Could not start job {}: {}", job_id, e),
            }
        }
        started
    }

    pub fn job(&self, job_id: &str) -> Result<Arc<JobRuntime>> {
        self.inner
            .jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| StormError::JobNotFound(job_id.to_string()))
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.inner.jobs.read().keys().cloned().collect()
    }

    /// Most recently defined job that is still known
    pub fn last_job(&self) -> Option<Arc<JobRuntime>> {
        let last = self.inner.last_job.read().clone()?;
        self.job(&last).ok()
    }

    pub fn context(&self, job_id: &str) -> Option<Arc<TopologyContext>> {
        self.job(job_id).ok().map(|job| Arc::clone(&job.context))
    }

    pub fn stream_router(&self, job_id: &str, stream: &str) -> Option<Arc<StreamRouter>> {
        self.inner
            .jobs
            .read()
            .get(job_id)
            .and_then(|job| job.routers.get(stream).cloned())
    }

    /// Waits for a job to finish on this worker; see [`TopologyContext::await_completion`]
    pub fn await_completion(&self, job_id: &str, timeout: Duration) -> Result<bool> {
        self.job(job_id)?.context.await_completion(timeout)
    }

    /// Forgets a job after closing its components
    pub fn remove_job(&self, job_id: &str) -> Result<()> {
        let job = self
            .inner
            .jobs
            .write()
            .remove(job_id)
            .ok_or_else(|| StormError::JobNotFound(job_id.to_string()))?;
        job.teardown();
        info!("Job {} removed", job_id);
        Ok(())
    }

    /// Stops the pool, then cleans up every bolt and closes every spout
    pub fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::Release);
        self.inner.quit.store(true, Ordering::Release);
        self.inner.signal.notify_all();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("Pool thread panicked");
            }
        }

        let jobs: Vec<Arc<JobRuntime>> = {
            let mut jobs = self.inner.jobs.write();
            std::mem::take(&mut *jobs).into_values().collect()
        };
        for job in &jobs {
            for bolt in &job.bolts {
                bolt.cleanup();
            }
        }
        for job in &jobs {
            for spout in &job.spouts {
                spout.close();
            }
        }
        info!("Cluster shut down");
    }

    /// Stops accepting jobs, lets started jobs finish for up to `drain`, then shuts down
    pub fn shutdown_with_timeout(&self, drain: Duration) {
        self.inner.accepting.store(false, Ordering::Release);
        let deadline = Instant::now() + drain;
        let running: Vec<Arc<JobRuntime>> = self
            .inner
            .jobs
            .read()
            .values()
            .filter(|job| job.context.is_started())
            .cloned()
            .collect();

        for job in running {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match job.context.await_completion(remaining) {
                Ok(true) => {}
                Ok(false) => warn!("Job {} still running at shutdown", job.context.job_id()),
                Err(e) => debug!("Job {} ended with error: {}", job.context.job_id(), e),
            }
        }
        self.shutdown();
    }

    /// Health check for the pool
    pub fn is_healthy(&self) -> bool {
        !self.inner.quit.load(Ordering::Acquire)
    }

    /// Number of pool threads
    pub fn thread_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pool_loop(id: usize, inner: Arc<ClusterInner>) {
    debug!("Pool thread {} started", id);
    while !inner.quit.load(Ordering::Acquire) {
        let seen = inner.signal.generation();
        match next_task(&inner) {
            Some((job, task)) => run_task(&inner, &job, task),
            None => inner
                .signal
                .wait_for_change(seen, inner.settings.idle_wait),
        }
    }
    debug!("Pool thread {} stopped", id);
}

// Rotates the starting job so one busy job cannot starve the others
fn next_task(inner: &ClusterInner) -> Option<(Arc<JobRuntime>, Task)> {
    let jobs: Vec<Arc<JobRuntime>> = inner.jobs.read().values().cloned().collect();
    if jobs.is_empty() {
        return None;
    }
    let start = inner.cursor.fetch_add(1, Ordering::Relaxed) % jobs.len();
    for offset in 0..jobs.len() {
        let job = &jobs[(start + offset) % jobs.len()];
        if job.context.is_failed() {
            continue;
        }
        if let Some(task) = job.context.queue().pop() {
            return Some((Arc::clone(job), task));
        }
    }
    None
}

fn run_task(inner: &ClusterInner, job: &JobRuntime, task: Task) {
    match task.run() {
        Ok(true) => {
            if !job.context.is_failed() && !inner.quit.load(Ordering::Acquire) {
                job.context.queue().push(task);
            }
        }
        Ok(false) => {}
        Err(e) => job.context.fail(Some(task.executor().id().as_str()), &e),
    }
}
