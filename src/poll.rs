//! Convergence poller
//!
//! Repeats a probe until it reports success or a deadline passes. The first
//! probe runs immediately; failed probes (including probe errors such as a
//! refused connection) are retried after `interval`. Elapsed time is measured
//! with the monotonic tokio clock, and the last sleep is clipped so the final
//! probe lands on the deadline instead of past it. Each probe is bounded by the
//! time left before the deadline (at least one interval), so a hung probe
//! cannot hold the loop past it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::common::{Error, Result};
use crate::runner::Expectation;
use crate::session::Session;

/// Interval and deadline for one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
        }
    }
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a single observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    /// The condition holds; polling stops with this value
    Converged(T),
    /// Not there yet; the value is kept for diagnostics
    Pending(T),
}

/// Poll `probe` until it converges or `spec.timeout` elapses
///
/// Returns the converged value, or `Error::ConvergenceTimeout` carrying the
/// last observed value and the elapsed time.
pub async fn poll_until<T, F, Fut>(what: &str, spec: PollSpec, mut probe: F) -> Result<T>
where
    T: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ProbeOutcome<T>>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    let mut last_observed = None;

    loop {
        attempt += 1;
        let budget = spec.timeout.saturating_sub(start.elapsed()).max(spec.interval);
        let observed = match timeout(budget, probe()).await {
            Ok(observed) => observed,
            Err(_) => Err(Error::Internal(format!("probe gave no answer within {budget:?}"))),
        };
        match observed {
            Ok(ProbeOutcome::Converged(value)) => {
                debug!(what, attempt, elapsed = ?start.elapsed(), "Converged");
                return Ok(value);
            }
            Ok(ProbeOutcome::Pending(value)) => {
                debug!(what, attempt, observed = ?value, "Not converged yet");
                last_observed = Some(format!("{value:?}"));
            }
            Err(e) => {
                debug!(what, attempt, error = %e, "Probe failed");
                last_observed = Some(format!("probe error: {e}"));
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= spec.timeout {
            return Err(Error::ConvergenceTimeout {
                what: what.to_string(),
                last_observed,
                elapsed,
            });
        }
        sleep(spec.interval.min(spec.timeout - elapsed)).await;
    }
}

/// A repeatable observation of external state
#[async_trait]
pub trait Probe: Send + Sync {
    type Output: fmt::Debug + Send;

    /// Human-readable description used in logs and timeout errors
    fn describe(&self) -> String;

    /// Observe once
    async fn probe(&self) -> Result<ProbeOutcome<Self::Output>>;
}

/// Poll a [`Probe`] until it converges
pub async fn poll_probe<P>(probe: &P, spec: PollSpec) -> Result<P::Output>
where
    P: Probe + ?Sized,
{
    poll_until(&probe.describe(), spec, || probe.probe()).await
}

/// Status and body of one HTTP response
#[derive(Clone, PartialEq, Eq)]
pub struct HttpObservation {
    pub status: u16,
    pub body: String,
}

const BODY_PREVIEW_CHARS: usize = 256;

impl fmt::Debug for HttpObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.body.chars().take(BODY_PREVIEW_CHARS).collect();
        let ellipsis = if preview.len() < self.body.len() { "..." } else { "" };
        write!(f, "HTTP {} {:?}{}", self.status, preview, ellipsis)
    }
}

/// GET a URL until it answers with the expected status
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    expected_status: u16,
    request_timeout: Option<Duration>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, expected_status: u16) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, url, expected_status))
    }

    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        expected_status: u16,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            expected_status,
            request_timeout: None,
        }
    }

    /// Bound each request so a hung connection cannot outlive the poll
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Probe for HttpProbe {
    type Output = HttpObservation;

    fn describe(&self) -> String {
        format!("GET {} (expecting {})", self.url, self.expected_status)
    }

    async fn probe(&self) -> Result<ProbeOutcome<HttpObservation>> {
        let mut request = self.client.get(&self.url);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let observed = HttpObservation { status, body };

        if status == self.expected_status {
            Ok(ProbeOutcome::Converged(observed))
        } else {
            Ok(ProbeOutcome::Pending(observed))
        }
    }
}

/// GET `url` until it returns `expected_status`, then return the body
pub async fn http_get_with_retry(
    url: &str,
    expected_status: u16,
    spec: PollSpec,
) -> Result<String> {
    let probe = HttpProbe::new(url, expected_status)?.request_timeout(spec.timeout);
    let observed = poll_probe(&probe, spec).await?;
    Ok(observed.body)
}

/// Re-run a CLI command until its output satisfies an expectation
pub struct CommandProbe {
    session: Session,
    args: Vec<String>,
    expectation: Expectation,
}

impl CommandProbe {
    /// Fails with `Error::Config` when the expectation's pattern does not compile
    pub fn new(session: Session, args: Vec<String>, expectation: Expectation) -> Result<Self> {
        expectation.matcher.evaluate("").map_err(Error::Config)?;
        Ok(Self {
            session,
            args,
            expectation,
        })
    }
}

#[async_trait]
impl Probe for CommandProbe {
    type Output = String;

    fn describe(&self) -> String {
        let binary = self.session.binary_path().display().to_string();
        format!(
            "'{}' until {}",
            crate::common::display_command(&binary, &self.args),
            self.expectation
        )
    }

    async fn probe(&self) -> Result<ProbeOutcome<String>> {
        let result = self.session.run_allowing_error(self.args.clone()).await?;
        let text = result.stream(self.expectation.stream).to_string();
        match self.expectation.matcher.evaluate(&text) {
            Ok(true) => Ok(ProbeOutcome::Converged(text)),
            Ok(false) => Ok(ProbeOutcome::Pending(text)),
            Err(reason) => Err(Error::Config(reason)),
        }
    }
}
