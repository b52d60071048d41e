use super::{RemoteTransport, push_url};
use crate::engine::error::{Result, StormError};
use crate::engine::retry::RetryConfig;
use crate::engine::tuple::Tuple;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

/// Blocking HTTP delivery to peer workers.
///
/// Callers are pool threads and `spawn_blocking` tasks, never async code, so
/// the blocking client is used directly.
pub struct HttpTransport {
    client: Client,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StormError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        self.retry.run(url, || {
            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .map_err(map_request_error)?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let message = response.text().unwrap_or_default();
            Err(StormError::http(status.as_u16(), message))
        })
    }
}

impl RemoteTransport for HttpTransport {
    fn push(&self, address: &str, job_id: &str, stream: &str, tuple: &Tuple) -> Result<()> {
        self.post(&push_url(address, stream, job_id, false), tuple)
    }

    fn push_batch(
        &self,
        address: &str,
        job_id: &str,
        stream: &str,
        tuples: &[Tuple],
    ) -> Result<()> {
        self.post(&push_url(address, stream, job_id, true), tuples)
    }
}

/// Maps a reqwest failure onto the runtime's error classes
pub fn map_request_error(e: reqwest::Error) -> StormError {
    if e.is_timeout() {
        StormError::Timeout(format!("HTTP request timed out: {e}"))
    } else if e.is_connect() {
        StormError::Http {
            status: 0,
            message: format!("Connection error: {e}"),
        }
    } else {
        StormError::Http {
            status: e.status().map_or(0, |s| s.as_u16()),
            message: format!("HTTP request failed: {e}"),
        }
    }
}
