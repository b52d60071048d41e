//! HTTP surfaces of a StormLite deployment.
//!
//! | Process | Method | Path | Description |
//! |---------|--------|------|-------------|
//! | worker | `POST` | `/definejob` | Instantiate a topology (`WorkerJob` body) |
//! | worker | `POST` | `/runjob` | Start the named job, or every pending job |
//! | worker | `POST` | `/pushdata/{stream}` | Deliver one tuple from a peer |
//! | worker | `POST` | `/pushbatch/{stream}` | Deliver a batch of tuples from a peer |
//! | worker | `GET` | `/status` | Current `WorkerStatus` |
//! | worker | `POST` | `/shutdown` | Stop serving and shut the cluster down |
//! | master | `GET` | `/workerstatus` | Status beacon sent by workers |
//! | master | `GET` | `/status` | Workers seen recently |
//! | master | `POST` | `/submitjob` | Define and run a job on every worker |

pub mod master;
pub mod worker;

pub use master::{JobSubmission, Master, StatusBoard, WorkerReport, master_router, submit_job};
pub use worker::{Worker, serve_worker, worker_router};

use crate::engine::context::JobPhase;
use crate::engine::error::StormError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Results carried in a status report
pub const STATUS_RESULT_LIMIT: usize = 100;

/// Snapshot of what a worker is doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub port: u16,
    pub status: JobPhase,
    pub job: String,
    pub keys_read: u64,
    pub keys_written: u64,
    pub results: Vec<(String, String)>,
}

impl WorkerStatus {
    /// Status of a worker with no job
    pub fn idle(port: u16) -> Self {
        Self {
            port,
            status: JobPhase::Idle,
            job: "None".to_string(),
            keys_read: 0,
            keys_written: 0,
            results: Vec::new(),
        }
    }

    /// Flattened form sent as query parameters to the master
    pub fn beacon(&self) -> StatusBeacon {
        let results = self
            .results
            .iter()
            .map(|(k, v)| format!("({}, {})", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        StatusBeacon {
            port: self.port,
            status: self.status,
            job: self.job.clone(),
            keys_read: self.keys_read,
            keys_written: self.keys_written,
            results: format!("[{}]", results),
        }
    }
}

/// Query string of `GET /workerstatus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBeacon {
    pub port: u16,
    pub status: JobPhase,
    pub job: String,
    pub keys_read: u64,
    pub keys_written: u64,
    pub results: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    error: String,
}

pub(crate) fn status_for(err: &StormError) -> StatusCode {
    match err {
        StormError::JobNotFound(_) => StatusCode::NOT_FOUND,
        StormError::RouterNotReady { .. } | StormError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        StormError::Config(_) | StormError::ComponentNotFound(_) | StormError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        }
        StormError::ProtocolViolation { .. } => StatusCode::CONFLICT,
        StormError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        StormError::Http { .. } => StatusCode::BAD_GATEWAY,
        // Not retried by the sending worker: the job has already failed here
        StormError::Execution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StormError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: &StormError) -> Response {
    (
        status_for(err),
        Json(ErrorResponse {
            code: err.code(),
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_format() {
        let status = WorkerStatus {
            port: 8001,
            status: JobPhase::Reducing,
            job: "wc".to_string(),
            keys_read: 3,
            keys_written: 2,
            results: vec![("a".into(), "2".into()), ("b".into(), "1".into())],
        };
        let beacon = status.beacon();
        assert_eq!(beacon.results, "[(a, 2), (b, 1)]");

        let json = serde_json::to_value(&beacon).unwrap();
        assert_eq!(json["status"], "REDUCING");
        assert_eq!(json["keysRead"], 3);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            status_for(&StormError::JobNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StormError::RouterNotReady {
                job_id: "j".into(),
                stream: "s".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&StormError::config("bad")),
            StatusCode::BAD_REQUEST
        );
    }
}
