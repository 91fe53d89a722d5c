//! Provisioning waiter
//!
//! State-changing Cloud API calls return `202 Accepted` together with a
//! `Location` header pointing at a request status resource. The waiter polls
//! that resource until the request is DONE or FAILED, or the timeout expires.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::client::{ProfitBricksClient, RequestStatus};

const STATUS_DONE: &str = "DONE";
const STATUS_FAILED: &str = "FAILED";

#[derive(Debug, Error)]
pub enum WaiterError {
    /// The request did not finish in time
    #[error("Timed out after {elapsed:?} waiting for request {location}")]
    Timeout { location: String, elapsed: Duration },

    /// The request finished but the API reported failure
    #[error("Request {location} failed: {message}")]
    JobFailed { location: String, message: String },

    /// The status endpoint itself returned an error code
    #[error("Request status {location} returned HTTP {status}: {body}")]
    StatusUnavailable {
        location: String,
        status: u16,
        body: String,
    },

    #[error("Malformed request status from {location}: {source}")]
    MalformedStatus {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to poll request status: {0}")]
    Http(#[from] reqwest::Error),
}

/// Polls asynchronous requests until they reach a terminal state
#[derive(Debug, Clone)]
pub struct Waiter<'a> {
    client: &'a ProfitBricksClient,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a> Waiter<'a> {
    pub fn new(client: &'a ProfitBricksClient, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            timeout,
            poll_interval,
        }
    }

    /// Block until the request at `location` is done
    ///
    /// A call that did not spawn an asynchronous request has no location and
    /// there is nothing to wait for.
    pub async fn wait_till_provisioned(&self, location: Option<&str>) -> Result<(), WaiterError> {
        let Some(location) = location else {
            log::debug!("No request location returned, nothing to wait for");
            return Ok(());
        };

        let started = Instant::now();
        loop {
            let remaining = self.timeout.saturating_sub(started.elapsed());
            let poll = tokio::time::timeout(remaining, self.client.get_request_status(location));
            let response = match poll.await {
                Ok(response) => response?,
                Err(_) => {
                    let elapsed = started.elapsed();
                    log::warn!(
                        "Status poll of request {} still pending after {:?}",
                        location,
                        elapsed
                    );
                    return Err(WaiterError::Timeout {
                        location: location.to_string(),
                        elapsed,
                    });
                }
            };
            if response.is_error() {
                return Err(WaiterError::StatusUnavailable {
                    location: location.to_string(),
                    status: response.status.as_u16(),
                    body: response.body_text(),
                });
            }

            let status: RequestStatus =
                response
                    .json()
                    .map_err(|source| WaiterError::MalformedStatus {
                        location: location.to_string(),
                        source,
                    })?;

            match status.metadata.status.as_str() {
                STATUS_DONE => {
                    log::info!("Request {} done after {:?}", location, started.elapsed());
                    return Ok(());
                }
                STATUS_FAILED => {
                    let message = status
                        .metadata
                        .message
                        .unwrap_or_else(|| "Unknown error".to_string());
                    log::warn!("Request {} failed: {}", location, message);
                    return Err(WaiterError::JobFailed {
                        location: location.to_string(),
                        message,
                    });
                }
                other => {
                    log::debug!("Request {} is {}", location, other);
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                log::warn!("Gave up on request {} after {:?}", location, elapsed);
                return Err(WaiterError::Timeout {
                    location: location.to_string(),
                    elapsed,
                });
            }
            tokio::time::sleep(self.poll_interval.min(self.timeout - elapsed)).await;
        }
    }
}
