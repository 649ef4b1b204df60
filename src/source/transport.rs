use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;

use crate::{
    cancel::CancellationToken,
    error::{ExtractError, Result},
};

const USER_AGENT: &str = concat!("fieldwork-extract/", env!("CARGO_PKG_VERSION"));

/// The request shapes the snapshot and Overpass clients need. Implementations
/// return the raw response body of a successful (2xx) response.
pub trait HttpTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Vec<u8>>;
    fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>>;
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking reqwest client shared by every request of a run, so that one
/// connection pool serves the submit, poll and download calls.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Vec<u8>> {
        send_request(self.client.post(url).json(body), url)
    }

    fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>> {
        send_request(self.client.post(url).form(fields), url)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        send_request(self.client.get(url), url)
    }
}

pub fn build_client(request_timeout: Duration) -> Result<reqwest::blocking::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(request_timeout)
        .build()
        .map_err(|err| ExtractError::config(format!("Cannot build HTTP client: {}", err)))
}

/// Sends the request and returns the body. Non-2xx statuses become
/// [`ExtractError::HttpStatus`], transport failures [`ExtractError::Network`].
pub fn send_request(request: reqwest::blocking::RequestBuilder, url: &str) -> Result<Vec<u8>> {
    let network_error = |source| ExtractError::Network {
        url: url.to_string(),
        source,
    };
    let response = request.send().map_err(network_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().map_err(network_error)?;
    Ok(body.to_vec())
}

/// Bounded exponential backoff for transient failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2*base, 4*base, ...
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the retries are
/// used up. Only errors for which [`ExtractError::is_transient`] holds are retried.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut retry = 0;
    loop {
        cancel.check()?;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay(retry);
                log::warn!(
                    "{} failed: {}. Retry {}/{} in {:?}",
                    what,
                    err,
                    retry,
                    policy.max_retries,
                    delay
                );
                cancel.sleep(delay)?;
            }
            Err(err) => return Err(err),
        }
    }
}
