//! Single-request execution for one virtual-user iteration.
//!
//! [`RequestExecutor::execute`] renders the URL template, issues one GET
//! through an [`HttpTransport`], evaluates every configured check, and folds
//! the outcome into a [`RequestResult`]. It never fails: transport errors
//! become [`ErrorKind`] values that the metrics collector counts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::loadtest::check::{Check, ResponseView};
use crate::loadtest::clock::SharedClock;
use crate::loadtest::error::ErrorKind;
use crate::loadtest::template::{TemplateParams, UrlTemplate};

/// A received HTTP response, reduced to what checks can inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, present only when requested.
    pub body: Option<String>,
}

impl TransportResponse {
    /// Response with a status and no body.
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Issues a single HTTP GET.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// GET `url`, giving up after `timeout`. The body is returned only when
    /// `read_body` is set.
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        read_body: bool,
    ) -> Result<TransportResponse, ErrorKind>;
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport on an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        read_body: bool,
    ) -> Result<TransportResponse, ErrorKind> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ErrorKind::classify_reqwest(&e))?;
        let status = response.status().as_u16();

        // Drain the body either way so the connection returns to the pool.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ErrorKind::classify_reqwest(&e))?;
        let body = read_body.then(|| String::from_utf8_lossy(&bytes).into_owned());

        Ok(TransportResponse { status, body })
    }
}

/// The per-iteration request definition. Method is always GET.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    /// Target URL pattern.
    pub url: UrlTemplate,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Pause after each iteration.
    pub iteration_sleep: Duration,
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    /// Status code, absent when no response arrived.
    pub status_code: Option<u16>,
    /// Time from request start until the response (or failure).
    pub latency: Duration,
    /// Failure classification, absent when a response arrived.
    pub error: Option<ErrorKind>,
    /// `(check name, passed)` in configuration order.
    pub check_outcomes: Vec<(String, bool)>,
}

impl RequestResult {
    /// Result for an iteration that produced no response.
    pub fn failed(error: ErrorKind, latency: Duration, checks: &[Check]) -> Self {
        Self {
            status_code: None,
            latency,
            error: Some(error),
            check_outcomes: checks.iter().map(|c| (c.name().to_string(), false)).collect(),
        }
    }

    /// Whether the iteration failed before a response arrived.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether every check passed (vacuously true with no checks and no error).
    pub fn all_checks_passed(&self) -> bool {
        !self.is_error() && self.check_outcomes.iter().all(|(_, ok)| *ok)
    }
}

/// Executes requests and evaluates checks.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    checks: Arc<[Check]>,
    clock: SharedClock,
    read_body: bool,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, checks: Arc<[Check]>, clock: SharedClock) -> Self {
        let read_body = checks.iter().any(Check::needs_body);
        Self {
            transport,
            checks,
            clock,
            read_body,
        }
    }

    /// Configured checks.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Run one request. Never panics, never returns an error.
    pub async fn execute(&self, template: &RequestTemplate, params: &TemplateParams) -> RequestResult {
        let url = match template.url.render(params) {
            Ok(url) => url,
            Err(e) => {
                return RequestResult::failed(
                    ErrorKind::InvalidTarget {
                        message: e.to_string(),
                    },
                    Duration::ZERO,
                    &self.checks,
                );
            },
        };

        let start = self.clock.now();
        let outcome = self
            .transport
            .get(&url, template.timeout, self.read_body)
            .await;
        let latency = self.clock.elapsed_since(start);

        match outcome {
            Ok(response) => {
                let view = ResponseView {
                    status: response.status,
                    body: response.body.as_deref(),
                    latency,
                };
                let check_outcomes = self
                    .checks
                    .iter()
                    .map(|check| (check.name().to_string(), check.evaluate(&view)))
                    .collect();
                RequestResult {
                    status_code: Some(response.status),
                    latency,
                    error: None,
                    check_outcomes,
                }
            },
            Err(kind) => RequestResult::failed(kind, latency, &self.checks),
        }
    }
}
