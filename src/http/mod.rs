// Blocking HTTP plumbing shared by the upstream service clients

#[cfg(test)]
mod tests;

use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// `ureq` agents with request-scoped timeouts and retry of transient failures
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    streaming_agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
}

impl HttpClient {
    /// Create a client whose calls fail after `timeout` without progress.
    ///
    /// Each phase (connect, response headers, response body) is bounded by
    /// `timeout`. Streamed calls made through [`Self::with_streaming_retry`]
    /// leave the body unbounded so long answers are not cut off.
    #[inline]
    pub fn new(timeout: Duration, retry_attempts: u32) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_connect(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .timeout_recv_body(Some(timeout))
            .build()
            .into();
        let streaming_agent = ureq::Agent::config_builder()
            .timeout_connect(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            streaming_agent,
            retry_attempts: retry_attempts.max(1),
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Scale the exponential backoff between retries
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Run `request_fn` until it succeeds, retrying server and transport errors
    #[inline]
    pub fn with_retry<T, F>(&self, target: &str, request_fn: F) -> Result<T>
    where
        F: FnMut(&ureq::Agent) -> Result<T, ureq::Error>,
    {
        self.retry_on(&self.agent, target, request_fn)
    }

    /// Like [`Self::with_retry`], for responses whose body is read incrementally
    #[inline]
    pub fn with_streaming_retry<T, F>(&self, target: &str, request_fn: F) -> Result<T>
    where
        F: FnMut(&ureq::Agent) -> Result<T, ureq::Error>,
    {
        self.retry_on(&self.streaming_agent, target, request_fn)
    }

    fn retry_on<T, F>(&self, agent: &ureq::Agent, target: &str, mut request_fn: F) -> Result<T>
    where
        F: FnMut(&ureq::Agent) -> Result<T, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "HTTP request to {} attempt {}/{}",
                target, attempt, self.retry_attempts
            );

            match request_fn(agent) {
                Ok(value) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(value);
                }
                Err(error) => {
                    if !is_retryable(&error) {
                        warn!("Non-retryable error from {}: {}", target, error);
                        return Err(describe_error(&error));
                    }

                    warn!(
                        "Transient error from {}: {}, attempt {}/{}",
                        target, error, attempt, self.retry_attempts
                    );
                    last_error = Some(describe_error(&error));

                    if attempt < self.retry_attempts {
                        let factor = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt - 1);
                        let delay = self.backoff_unit.saturating_mul(factor);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", target);

        Err(last_error.unwrap_or_else(|| anyhow!("Request to {} failed after retries", target)))
    }
}

/// Server errors and transport failures are worth another attempt
#[inline]
pub fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500 || *status == 429,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

fn describe_error(error: &ureq::Error) -> anyhow::Error {
    match error {
        ureq::Error::StatusCode(status) => anyhow!("HTTP {}", status),
        other => anyhow!("Request error: {}", other),
    }
}
