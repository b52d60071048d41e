//! # Worker-to-worker transport
//!
//! Remote destinations of a stream are [`SenderBolt`]s. They look like local
//! destinations to the router but serialise tuples as JSON and hand them to a
//! [`RemoteTransport`], which delivers them to the peer's
//! `/pushdata/{stream}` or `/pushbatch/{stream}` endpoint.

mod http;
mod sender;

pub use http::{HttpTransport, map_request_error};
pub use sender::SenderBolt;

use crate::engine::config::Config;
use crate::engine::error::Result;
use crate::engine::topology::Topology;
use crate::engine::tuple::Tuple;
use serde::{Deserialize, Serialize};

/// Delivery of tuples to another worker
pub trait RemoteTransport: Send + Sync {
    /// Sends a single tuple for `stream` of `job_id` to the worker at `address`
    fn push(&self, address: &str, job_id: &str, stream: &str, tuple: &Tuple) -> Result<()>;

    /// Sends several tuples in one request; the receiver processes them in order
    fn push_batch(&self, address: &str, job_id: &str, stream: &str, tuples: &[Tuple])
    -> Result<()>;
}

/// Body of a `/definejob` request: the topology plus the job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerJob {
    pub topology: Topology,
    pub config: Config,
}

/// Paths of the push endpoints for `stream`, with the job in the query
pub fn push_url(address: &str, stream: &str, job_id: &str, batch: bool) -> String {
    let endpoint = if batch { "pushbatch" } else { "pushdata" };
    format!(
        "{}/{}/{}?job={}",
        address.trim_end_matches('/'),
        endpoint,
        stream,
        job_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url() {
        assert_eq!(
            push_url("http://127.0.0.1:8001/", "WORD_MAP", "wc", false),
            "http://127.0.0.1:8001/pushdata/WORD_MAP?job=wc"
        );
        assert_eq!(
            push_url("http://h:1", "PRINT", "wc", true),
            "http://h:1/pushbatch/PRINT?job=wc"
        );
    }
}
