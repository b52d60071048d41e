use super::{StatusBeacon, error_response};
use crate::engine::config::{Config, JOB, WORKER_INDEX, WORKER_LIST};
use crate::engine::error::{Result, StormError};
use crate::engine::topology::{Topology, map_reduce_topology};
use crate::engine::transport::{WorkerJob, map_request_error};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How recently a worker must have reported to count as active
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(30);

/// Latest report from one worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub address: String,
    pub beacon: StatusBeacon,
    pub last_seen: Instant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkerView {
    address: String,
    #[serde(flatten)]
    beacon: StatusBeacon,
    seconds_since_seen: u64,
}

/// Worker reports keyed by `host:port`
#[derive(Default)]
pub struct StatusBoard {
    workers: RwLock<BTreeMap<String, WorkerReport>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, address: impl Into<String>, beacon: StatusBeacon) {
        let address = address.into();
        debug!("Status from {}: {:?} {}", address, beacon.status, beacon.job);
        self.workers.write().insert(
            address.clone(),
            WorkerReport {
                address,
                beacon,
                last_seen: Instant::now(),
            },
        );
    }

    /// Reports seen within `window`, ordered by address
    pub fn active(&self, window: Duration) -> Vec<WorkerReport> {
        self.workers
            .read()
            .values()
            .filter(|report| report.last_seen.elapsed() <= window)
            .cloned()
            .collect()
    }

    /// `workerList` value built from the active workers
    pub fn worker_list(&self, window: Duration) -> Option<String> {
        let active = self.active(window);
        if active.is_empty() {
            return None;
        }
        let addresses: Vec<String> = active.into_iter().map(|r| r.address).collect();
        Some(format!("[{}]", addresses.join(",")))
    }
}

/// Defines `topology` on every worker in `workerList`, then starts it everywhere.
///
/// Each worker receives the configuration with its own `workerIndex`. The
/// first non-success response aborts the submission.
pub async fn submit_job(
    client: &reqwest::Client,
    topology: &Topology,
    config: &Config,
) -> Result<String> {
    topology.validate()?;
    let workers = config.workers()?;
    let job_id = config
        .job_id()
        .map(str::to_string)
        .unwrap_or_else(|| format!("job-{}", Uuid::now_v7()));
    let base = config.clone().with(JOB, job_id.clone());

    for (index, address) in workers.iter().enumerate() {
        let job = WorkerJob {
            topology: topology.clone(),
            config: base.clone().with(WORKER_INDEX, index.to_string()),
        };
        let response = client
            .post(format!("{}/definejob", address))
            .json(&job)
            .send()
            .await
            .map_err(map_request_error)?;
        check(address, "definejob", response).await?;
    }

    for address in &workers {
        let response = client
            .post(format!("{}/runjob", address))
            .query(&[("job", job_id.as_str())])
            .send()
            .await
            .map_err(map_request_error)?;
        check(address, "runjob", response).await?;
    }

    info!("Job {} submitted to {} workers", job_id, workers.len());
    Ok(job_id)
}

async fn check(address: &str, what: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StormError::http(
        status.as_u16(),
        format!("{} on {} failed: {}", what, address, body),
    ))
}

/// Master process state
pub struct Master {
    board: StatusBoard,
    client: reqwest::Client,
    active_window: Duration,
}

impl Master {
    pub fn new() -> Self {
        Self::with_window(ACTIVE_WINDOW)
    }

    pub fn with_window(active_window: Duration) -> Self {
        Self {
            board: StatusBoard::new(),
            client: reqwest::Client::new(),
            active_window,
        }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `POST /submitjob`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Absent means the built-in map/reduce pipeline sized from `config`
    #[serde(default)]
    pub topology: Option<Topology>,
    #[serde(default)]
    pub config: Config,
}

/// Creates the master's HTTP router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// status endpoint needs the caller's address.
pub fn master_router(master: Arc<Master>) -> Router {
    Router::new()
        .route("/workerstatus", get(worker_status))
        .route("/status", get(status))
        .route("/submitjob", post(submit))
        .with_state(master)
}

/// `GET /workerstatus`
async fn worker_status(
    State(master): State<Arc<Master>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(beacon): Query<StatusBeacon>,
) -> impl IntoResponse {
    let address = format!("{}:{}", peer.ip(), beacon.port);
    master.board.record(address, beacon);
    StatusCode::OK
}

/// `GET /status`
async fn status(State(master): State<Arc<Master>>) -> impl IntoResponse {
    let views: Vec<WorkerView> = master
        .board
        .active(master.active_window)
        .into_iter()
        .map(|report| WorkerView {
            seconds_since_seen: report.last_seen.elapsed().as_secs(),
            address: report.address,
            beacon: report.beacon,
        })
        .collect();
    Json(views)
}

/// `POST /submitjob`
async fn submit(
    State(master): State<Arc<Master>>,
    Json(submission): Json<JobSubmission>,
) -> Response {
    let JobSubmission {
        topology,
        mut config,
    } = submission;

    if !config.contains(WORKER_LIST) {
        match master.board.worker_list(master.active_window) {
            Some(list) => config.insert(WORKER_LIST, list),
            None => {
                return error_response(&StormError::config("no active workers"));
            }
        }
    }

    let topology = match topology {
        Some(topology) => topology,
        None => match map_reduce_topology(&config) {
            Ok(topology) => topology,
            Err(e) => return error_response(&e),
        },
    };

    match submit_job(&master.client, &topology, &config).await {
        Ok(job_id) => (StatusCode::OK, format!("Job {} submitted", job_id)).into_response(),
        Err(e) => error_response(&e),
    }
}
