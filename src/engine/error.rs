use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the dataflow runtime
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum StormError {
    /// Malformed topology or job configuration, reported before any tuple flows
    #[error("Configuration error: {0}")]
    Config(String),

    /// A spout, bolt or job id that the component registry does not know
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Data tuple delivered to an executor that already finalized
    #[error(
        "Protocol violation: executor {executor_id} received data from {source_executor} after the stream had ended"
    )]
    ProtocolViolation {
        executor_id: String,
        source_executor: String,
    },

    /// The destination worker has not wired the stream router yet
    #[error("Router for stream '{stream}' of job '{job_id}' is not registered")]
    RouterNotReady { job_id: String, stream: String },

    /// No job with this id is defined on the cluster
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// HTTP transport errors
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors (input shards, output files)
    #[error("IO error: {0}")]
    Io(String),

    /// Errors raised by spout, bolt or job logic
    #[error("Execution error: {context}")]
    Execution {
        context: String,
        #[source]
        #[serde(skip)]
        source: Option<Box<StormError>>,
    },

    /// The cluster no longer accepts work
    #[error("Cluster is shutting down")]
    ShuttingDown,
}

impl StormError {
    /// Creates a new execution error with context
    pub fn execution<S: Into<String>>(context: S, source: Option<StormError>) -> Self {
        StormError::Execution {
            context: context.into(),
            source: source.map(Box::new),
        }
    }

    /// Creates a new HTTP error
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        StormError::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        StormError::Config(message.into())
    }

    /// Convert from std::io::Error
    pub fn from_io(err: std::io::Error) -> Self {
        StormError::Io(err.to_string())
    }

    /// Convert from serde_json::Error
    pub fn from_serde(err: serde_json::Error) -> Self {
        StormError::Serialization(err.to_string())
    }

    /// Determines if this error is transient and worth retrying
    ///
    /// A destination whose topology is still being wired, overloaded peers and
    /// dropped connections are retried. Protocol and configuration errors will
    /// fail the same way every time.
    pub fn retryable(&self) -> bool {
        match self {
            StormError::RouterNotReady { .. } => true,
            StormError::Http { status, .. } => {
                // 0 means the connection itself failed
                *status >= 500 || *status == 429 || *status == 408 || *status == 0
            }
            StormError::Timeout(_) => true,
            StormError::Io(_) => true,
            StormError::Execution { source, .. } => {
                source.as_ref().map(|e| e.retryable()).unwrap_or(false)
            }

            StormError::Config(_) => false,
            StormError::ComponentNotFound(_) => false,
            StormError::ProtocolViolation { .. } => false,
            StormError::JobNotFound(_) => false,
            StormError::Serialization(_) => false,
            StormError::ShuttingDown => false,
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            StormError::Config(_) => "CONFIG_ERROR",
            StormError::ComponentNotFound(_) => "COMPONENT_NOT_FOUND",
            StormError::ProtocolViolation { .. } => "PROTOCOL_VIOLATION",
            StormError::RouterNotReady { .. } => "ROUTER_NOT_READY",
            StormError::JobNotFound(_) => "JOB_NOT_FOUND",
            StormError::Http { .. } => "HTTP_ERROR",
            StormError::Timeout(_) => "TIMEOUT_ERROR",
            StormError::Serialization(_) => "SERIALIZATION_ERROR",
            StormError::Io(_) => "IO_ERROR",
            StormError::Execution { .. } => "EXECUTION_ERROR",
            StormError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

impl From<std::io::Error> for StormError {
    fn from(err: std::io::Error) -> Self {
        StormError::from_io(err)
    }
}

impl From<serde_json::Error> for StormError {
    fn from(err: serde_json::Error) -> Self {
        StormError::from_serde(err)
    }
}

/// Type alias for Result with StormError
pub type Result<T> = std::result::Result<T, StormError>;

/// Structured record of a failure, kept on the job context and reported in worker status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (e.g., "PROTOCOL_VIOLATION", "HTTP_ERROR")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Job the failure belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Executor that raised the failure (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,

    /// Timestamp when the error occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ErrorInfo {
    /// Create an error record from a runtime error
    pub fn new(job_id: Option<String>, executor_id: Option<String>, error: &StormError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            job_id,
            executor_id,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(
            StormError::RouterNotReady {
                job_id: "job".to_string(),
                stream: "WORD_MAP".to_string()
            }
            .retryable()
        );
        assert!(StormError::http(503, "Service Unavailable").retryable());
        assert!(StormError::http(429, "Too Many Requests").retryable());
        assert!(StormError::http(0, "Connection refused").retryable());
        assert!(StormError::Timeout("push timed out".to_string()).retryable());
        assert!(StormError::Io("broken pipe".to_string()).retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!StormError::http(400, "Bad Request").retryable());
        assert!(!StormError::http(404, "Not Found").retryable());
        assert!(!StormError::Config("no workerList".to_string()).retryable());
        assert!(
            !StormError::ProtocolViolation {
                executor_id: "a".to_string(),
                source_executor: "b".to_string()
            }
            .retryable()
        );
        assert!(!StormError::ComponentNotFound("nope".to_string()).retryable());
        assert!(!StormError::ShuttingDown.retryable());
    }

    #[test]
    fn test_execution_error_retryability() {
        let transient = StormError::execution("push failed", Some(StormError::http(502, "gw")));
        let permanent = StormError::execution("bad input", Some(StormError::config("x")));
        let bare = StormError::execution("unknown", None);

        assert!(transient.retryable());
        assert!(!permanent.retryable());
        assert!(!bare.retryable());
    }

    #[test]
    fn test_error_info_from_error() {
        let error = StormError::ProtocolViolation {
            executor_id: "exec-1".to_string(),
            source_executor: "exec-0".to_string(),
        };
        let info = ErrorInfo::new(Some("job-1".to_string()), Some("exec-1".to_string()), &error);

        assert_eq!(info.code, "PROTOCOL_VIOLATION");
        assert!(info.message.contains("after the stream had ended"));
        assert_eq!(info.job_id.as_deref(), Some("job-1"));
        assert!(info.timestamp.is_some());
    }
}
