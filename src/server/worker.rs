use super::{STATUS_RESULT_LIMIT, WorkerStatus, error_response};
use crate::engine::cluster::Cluster;
use crate::engine::config::STORAGE_DIRECTORY;
use crate::engine::error::{Result, StormError};
use crate::engine::retry::RetryConfig;
use crate::engine::transport::WorkerJob;
use crate::engine::tuple::{ExecutorId, Tuple};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use uuid::Uuid;

/// One worker process: a cluster plus the bookkeeping behind its HTTP surface
pub struct Worker {
    cluster: Cluster,
    port: u16,
    storage_directory: Option<String>,
    router_retry: RetryConfig,
    /// Per job: `(stream, source)` pairs whose EOS has been delivered
    received_eos: Mutex<HashMap<String, HashSet<(String, ExecutorId)>>>,
    shutdown: Notify,
}

impl Worker {
    pub fn new(cluster: Cluster, port: u16, storage_directory: Option<String>) -> Self {
        let router_retry = cluster.settings().router_retry.clone();
        Self {
            cluster,
            port,
            storage_directory,
            router_retry,
            received_eos: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Instantiates the job on this worker and returns its id.
    ///
    /// The worker's storage directory is added to the job configuration
    /// unless the job brings its own.
    pub fn define_job(&self, job: WorkerJob) -> Result<String> {
        let WorkerJob {
            topology,
            mut config,
        } = job;

        if let Some(storage) = &self.storage_directory {
            if !config.contains(STORAGE_DIRECTORY) {
                config.insert(STORAGE_DIRECTORY, storage.clone());
            }
        }
        let job_id = config
            .job_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("job-{}", Uuid::now_v7()));

        self.cluster.submit_topology(&job_id, config, topology)?;
        self.received_eos.lock().remove(&job_id);
        info!("Job {} launched on port {}", job_id, self.port);
        Ok(job_id)
    }

    /// Starts `job`, or every job not yet started; returns how many were started
    pub fn run_job(&self, job: Option<&str>) -> Result<usize> {
        match job {
            Some(job_id) => {
                self.cluster.start_job(job_id)?;
                Ok(1)
            }
            None => Ok(self.cluster.start_pending()),
        }
    }

    /// Forgets `job_id` and everything recorded for it
    pub fn remove_job(&self, job_id: &str) -> Result<()> {
        self.cluster.remove_job(job_id)?;
        self.received_eos.lock().remove(job_id);
        Ok(())
    }

    /// Delivers tuples pushed by a peer worker for `stream`.
    ///
    /// Peers may start sending before this worker has defined the job, so the
    /// router lookup is retried for a bounded time. A repeated end-of-stream
    /// from the same source is dropped here before it reaches the executors;
    /// a source only counts as seen once its EOS was delivered without error.
    /// Pushes for a job that already failed here are refused with an error the
    /// sender does not retry.
    pub fn push(&self, job: Option<&str>, stream: &str, tuples: &[Tuple]) -> Result<()> {
        let job_id = self.resolve_job(job)?;
        let router = self.router_retry.run("stream router lookup", || {
            self.cluster
                .stream_router(&job_id, stream)
                .ok_or_else(|| StormError::RouterNotReady {
                    job_id: job_id.clone(),
                    stream: stream.to_string(),
                })
        })?;
        let context = self
            .cluster
            .context(&job_id)
            .ok_or_else(|| StormError::JobNotFound(job_id.clone()))?;

        if context.is_failed() {
            return Err(StormError::execution(
                format!("job {} has failed on port {}", job_id, self.port),
                None,
            ));
        }

        for tuple in tuples {
            let delivered = if tuple.is_end_of_stream() {
                let source = tuple.source_executor();
                if self.eos_seen(&job_id, stream, source) {
                    debug!("Duplicate EOS from {} on {} ignored", source, stream);
                    continue;
                }
                let delivered = router.execute_end_of_stream_locally(source);
                if delivered.is_ok() {
                    self.received_eos
                        .lock()
                        .entry(job_id.clone())
                        .or_default()
                        .insert((stream.to_string(), source.clone()));
                }
                delivered
            } else {
                context.inc_send_outputs(stream);
                router.execute_locally(tuple)
            };

            if let Err(e) = delivered {
                context.fail(None, &e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn eos_seen(&self, job_id: &str, stream: &str, source: &ExecutorId) -> bool {
        self.received_eos
            .lock()
            .get(job_id)
            .is_some_and(|seen| seen.contains(&(stream.to_string(), source.clone())))
    }

    fn resolve_job(&self, job: Option<&str>) -> Result<String> {
        match job {
            Some(job_id) => Ok(job_id.to_string()),
            None => self
                .cluster
                .last_job()
                .map(|job| job.context().job_id().to_string())
                .ok_or_else(|| StormError::JobNotFound("<latest>".to_string())),
        }
    }

    /// Status of the most recently defined job
    pub fn status(&self) -> WorkerStatus {
        let Some(job) = self.cluster.last_job() else {
            return WorkerStatus::idle(self.port);
        };
        let context = job.context();
        let (keys_read, keys_written) = context.progress();
        let mut results = context.results();
        results.truncate(STATUS_RESULT_LIMIT);

        WorkerStatus {
            port: self.port,
            status: context.phase(),
            job: context.job_id().to_string(),
            keys_read,
            keys_written,
            results,
        }
    }

    /// Asks [`serve_worker`] to stop
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}

#[derive(Debug, Default, Deserialize)]
struct JobQuery {
    job: Option<String>,
}

/// Creates the worker's HTTP router
pub fn worker_router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/definejob", post(define_job))
        .route("/runjob", post(run_job))
        .route("/pushdata/{stream}", post(push_data))
        .route("/pushbatch/{stream}", post(push_batch))
        .route("/status", get(status))
        .route("/shutdown", post(shutdown))
        .with_state(worker)
}

/// Runs `f` on the blocking pool and maps its outcome to a response
async fn blocking<T, F>(f: F, ok: impl FnOnce(T) -> Response) -> Response
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => ok(value),
        Ok(Err(e)) => error_response(&e),
        Err(e) => error_response(&StormError::execution(
            format!("worker task panicked: {e}"),
            None,
        )),
    }
}

/// `POST /definejob`
async fn define_job(State(worker): State<Arc<Worker>>, Json(job): Json<WorkerJob>) -> Response {
    blocking(move || worker.define_job(job), |_| {
        (StatusCode::OK, "Job launched").into_response()
    })
    .await
}

/// `POST /runjob`
async fn run_job(State(worker): State<Arc<Worker>>, Query(query): Query<JobQuery>) -> Response {
    blocking(
        move || worker.run_job(query.job.as_deref()),
        |_| (StatusCode::OK, "Started").into_response(),
    )
    .await
}

/// `POST /pushdata/{stream}`
async fn push_data(
    State(worker): State<Arc<Worker>>,
    Path(stream): Path<String>,
    Query(query): Query<JobQuery>,
    Json(tuple): Json<Tuple>,
) -> Response {
    blocking(
        move || worker.push(query.job.as_deref(), &stream, std::slice::from_ref(&tuple)),
        |_| (StatusCode::OK, "OK").into_response(),
    )
    .await
}

/// `POST /pushbatch/{stream}`
async fn push_batch(
    State(worker): State<Arc<Worker>>,
    Path(stream): Path<String>,
    Query(query): Query<JobQuery>,
    Json(tuples): Json<Vec<Tuple>>,
) -> Response {
    blocking(
        move || worker.push(query.job.as_deref(), &stream, &tuples),
        |_| (StatusCode::OK, "OK").into_response(),
    )
    .await
}

/// `GET /status`
async fn status(State(worker): State<Arc<Worker>>) -> impl IntoResponse {
    Json(worker.status())
}

/// `POST /shutdown`
async fn shutdown(State(worker): State<Arc<Worker>>) -> impl IntoResponse {
    info!("Shutdown requested on port {}", worker.port);
    worker.request_shutdown();
    (StatusCode::OK, "Shutting down")
}

/// Serves the worker API on `listener` until shutdown is requested.
///
/// When `master` is given, a status beacon reports to it every
/// `statusInterval`.
pub async fn serve_worker(
    worker: Arc<Worker>,
    listener: TcpListener,
    master: Option<String>,
) -> std::io::Result<()> {
    let beacon = master.map(|master| {
        let worker = Arc::clone(&worker);
        tokio::spawn(status_beacon(worker, master))
    });

    let app = worker_router(Arc::clone(&worker));
    let shutdown_worker = Arc::clone(&worker);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_worker.shutdown_requested().await })
        .await;

    if let Some(beacon) = beacon {
        beacon.abort();
    }
    served
}

async fn status_beacon(worker: Arc<Worker>, master: String) {
    let client = reqwest::Client::new();
    let master = if master.starts_with("http://") || master.starts_with("https://") {
        master
    } else {
        format!("http://{}", master)
    };
    let url = format!("{}/workerstatus", master.trim_end_matches('/'));
    let mut interval = tokio::time::interval(worker.cluster.settings().status_interval);

    loop {
        interval.tick().await;
        let beacon = worker.status().beacon();
        match client
            .get(&url)
            .query(&beacon)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("Status sent to {}", url);
            }
            Ok(response) => warn!("Master rejected status: {}", response.status()),
            Err(e) => debug!("Status beacon to {} failed: {}", url, e),
        }
    }
}
