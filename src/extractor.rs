//! Bounded retry with exponential backoff around one extraction session.

use crate::engine::{Locator, RenderingEngine};
use crate::error::ExtractionError;
use crate::price::parse_price;
use crate::session::ExtractionSession;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One URL to extract a price from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: String,
    pub locator: Locator,
    /// Per-attempt budget for navigation and for the element to appear
    pub timeout: Duration,
    /// Always at least 1
    pub max_attempts: u32,
}

impl ExtractionRequest {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(url: impl Into<String>, locator: Locator) -> Self {
        Self {
            url: url.into(),
            locator,
            timeout: Self::DEFAULT_TIMEOUT,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Exponential backoff: `unit * 2^k` after failed attempt `k`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    unit: Duration,
    cap: Option<Duration>,
}

impl Backoff {
    pub fn new(unit: Duration, cap: Option<Duration>) -> Self {
        Self { unit, cap }
    }

    /// Delay after the `attempt`-th (1-indexed) failure.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.unit.saturating_mul(factor);

        match self.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Some(Duration::from_secs(60)))
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ElementNotFound,
    Timeout,
    NavigationError,
    ParseFailure,
    EngineFailure,
}

impl AttemptOutcome {
    /// Identifier used in logs and screenshot names.
    pub fn slug(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::ElementNotFound => "element_not_found",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::NavigationError => "navigation_error",
            AttemptOutcome::ParseFailure => "parse_failure",
            AttemptOutcome::EngineFailure => "engine_failure",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl From<&ExtractionError> for AttemptOutcome {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::ElementNotFound(_) => AttemptOutcome::ElementNotFound,
            ExtractionError::Timeout(_) => AttemptOutcome::Timeout,
            ExtractionError::NavigationError(_) => AttemptOutcome::NavigationError,
            ExtractionError::ParseFailure(_) => AttemptOutcome::ParseFailure,
            ExtractionError::EngineFailure(_) => AttemptOutcome::EngineFailure,
        }
    }
}

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-indexed
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub error: Option<ExtractionError>,
    /// Sleep scheduled before the next attempt
    pub backoff: Option<Duration>,
    /// Diagnostic screenshot, when one could be saved
    pub artifact: Option<PathBuf>,
}

/// Final result of a [`RetryingExtractor`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub url: String,
    /// `None` means "price unavailable"
    pub price: Option<f64>,
    pub attempts: Vec<AttemptRecord>,
    pub cancelled: bool,
}

impl ExtractionReport {
    pub fn is_priced(&self) -> bool {
        self.price.is_some()
    }

    /// The error of the last failed attempt, if any.
    pub fn last_error(&self) -> Option<&ExtractionError> {
        self.attempts.iter().rev().find_map(|record| record.error.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Pending,
    Attempting(u32),
    Retrying { failed: u32, delay: Duration },
    Success(f64),
    Exhausted,
    Cancelled,
}

/// Drives attempts against one session until a price is parsed, attempts
/// run out or the run is cancelled.
///
/// Failures never escape: the worst outcome is a report without a price.
pub struct RetryingExtractor<E: RenderingEngine> {
    session: ExtractionSession<E>,
    backoff: Backoff,
}

impl<E: RenderingEngine> RetryingExtractor<E> {
    pub fn new(session: ExtractionSession<E>, backoff: Backoff) -> Self {
        Self { session, backoff }
    }

    pub async fn run(
        &mut self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> ExtractionReport {
        let max_attempts = request.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut state = State::Pending;

        loop {
            debug!("{}: {:?}", request.url, state);

            state = match state {
                State::Pending => State::Attempting(1),

                State::Attempting(attempt) => {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.attempt(request) => Some(result),
                    };

                    match result {
                        None => State::Cancelled,
                        Some(Ok(price)) => {
                            info!("{}: price {} on attempt {}", request.url, price, attempt);
                            attempts.push(AttemptRecord {
                                attempt,
                                outcome: AttemptOutcome::Success,
                                error: None,
                                backoff: None,
                                artifact: None,
                            });
                            State::Success(price)
                        }
                        Some(Err(err)) => {
                            let outcome = AttemptOutcome::from(&err);
                            warn!(
                                "{}: attempt {}/{} failed: {}",
                                request.url, attempt, max_attempts, err
                            );

                            let label = format!("{}_attempt{}", outcome.slug(), attempt);
                            let artifact = self.session.capture_diagnostic(&label, &request.url).await;

                            let (backoff, next) = if attempt >= max_attempts {
                                (None, State::Exhausted)
                            } else {
                                let delay = self.backoff.delay(attempt);
                                (Some(delay), State::Retrying { failed: attempt, delay })
                            };

                            attempts.push(AttemptRecord {
                                attempt,
                                outcome,
                                error: Some(err),
                                backoff,
                                artifact,
                            });
                            next
                        }
                    }
                }

                State::Retrying { failed, delay } => {
                    debug!("{}: backing off {:?}", request.url, delay);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => State::Cancelled,
                        _ = tokio::time::sleep(delay) => State::Attempting(failed + 1),
                    }
                }

                State::Success(price) => return report(request, Some(price), attempts, false),
                State::Exhausted => {
                    warn!("{}: price unavailable after {} attempts", request.url, max_attempts);
                    return report(request, None, attempts, false);
                }
                State::Cancelled => {
                    info!("{}: cancelled", request.url);
                    return report(request, None, attempts, true);
                }
            };
        }
    }

    async fn attempt(&mut self, request: &ExtractionRequest) -> Result<f64, ExtractionError> {
        let raw = self.session.fetch_text(&request.url, &request.locator, request.timeout).await?;
        debug!("{}: raw fragment {:?}", request.url, raw);

        parse_price(&raw).ok_or_else(|| ExtractionError::ParseFailure(raw.trim().to_string()))
    }

    /// Releases the session's rendering engine.
    pub async fn close(self) {
        self.session.close().await;
    }
}

fn report(
    request: &ExtractionRequest,
    price: Option<f64>,
    attempts: Vec<AttemptRecord>,
    cancelled: bool,
) -> ExtractionReport {
    ExtractionReport { url: request.url.clone(), price, attempts, cancelled }
}
