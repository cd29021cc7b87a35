//! Concurrent fan-out of extraction requests over independent sessions.

use crate::engine::{EngineLauncher, IdentityPool};
use crate::extractor::{Backoff, ExtractionReport, ExtractionRequest, RetryingExtractor};
use crate::session::{ExtractionSession, SessionSettings};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings shared by every worker of a batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of live rendering-engine sessions
    pub concurrency: usize,
    pub backoff: Backoff,
    pub session: SessionSettings,
    pub identities: IdentityPool,
    pub proxy: Option<String>,
    pub headless: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            backoff: Backoff::default(),
            session: SessionSettings::default(),
            identities: IdentityPool::default(),
            proxy: None,
            headless: true,
        }
    }
}

/// How one URL of a batch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum EntryStatus {
    Priced,
    /// Every attempt failed
    Unavailable,
    /// The rendering engine could not be started
    SetupFailed(String),
    Cancelled,
    /// The worker task panicked
    Crashed(String),
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Priced => write!(f, "priced"),
            EntryStatus::Unavailable => write!(f, "unavailable"),
            EntryStatus::SetupFailed(reason) => write!(f, "setup failed: {}", reason),
            EntryStatus::Cancelled => write!(f, "cancelled"),
            EntryStatus::Crashed(reason) => write!(f, "crashed: {}", reason),
        }
    }
}

/// Result recorded for one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub price: Option<f64>,
    #[serde(flatten)]
    pub status: EntryStatus,
    /// Attempts actually made
    pub attempts: usize,
}

impl BatchEntry {
    fn without_price(status: EntryStatus) -> Self {
        Self { price: None, status, attempts: 0 }
    }

    fn from_report(report: &ExtractionReport) -> Self {
        let status = if report.cancelled {
            EntryStatus::Cancelled
        } else if report.is_priced() {
            EntryStatus::Priced
        } else {
            EntryStatus::Unavailable
        };

        Self { price: report.price, status, attempts: report.attempts.len() }
    }
}

/// URL to outcome map, complete once every worker has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BatchResult {
    entries: BTreeMap<String, BatchEntry>,
}

impl BatchResult {
    pub fn get(&self, url: &str) -> Option<&BatchEntry> {
        self.entries.get(url)
    }

    /// The plain url to price map.
    pub fn prices(&self) -> BTreeMap<String, Option<f64>> {
        self.entries.iter().map(|(url, entry)| (url.clone(), entry.price)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BatchEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_prices(self.entries.values().map(|entry| entry.price))
    }

    fn insert(&mut self, url: String, entry: BatchEntry) {
        self.entries.insert(url, entry);
    }
}

/// Aggregate figures over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub priced: usize,
    /// Arithmetic mean of the priced URLs; `None` without any
    pub mean: Option<f64>,
}

impl BatchSummary {
    pub fn from_prices(prices: impl IntoIterator<Item = Option<f64>>) -> Self {
        let mut total = 0;
        let mut priced = 0;
        let mut sum = 0.0;

        for price in prices {
            total += 1;
            if let Some(price) = price {
                priced += 1;
                sum += price;
            }
        }

        let mean = if priced > 0 { Some(sum / priced as f64) } else { None };
        Self { total, priced, mean }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Total: {} sites, priced: {}", self.total, self.priced)?;
        match self.mean {
            Some(mean) => write!(f, ", mean: {:.2}", mean),
            None => write!(f, ", mean: n/a"),
        }
    }
}

/// Runs one [`RetryingExtractor`] per request on a bounded pool of tasks.
pub struct ConcurrentBatchRunner<L: EngineLauncher + 'static> {
    launcher: Arc<L>,
    options: BatchOptions,
    cancel: CancellationToken,
}

impl<L: EngineLauncher + 'static> ConcurrentBatchRunner<L> {
    pub fn new(launcher: L, options: BatchOptions) -> Self {
        Self { launcher: Arc::new(launcher), options, cancel: CancellationToken::new() }
    }

    /// Uses `cancel` to abort the batch instead of a private token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts every outstanding worker when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Extracts every request and waits for all workers.
    ///
    /// Requests repeating an earlier URL are skipped.
    pub async fn run(&self, requests: Vec<ExtractionRequest>) -> BatchResult {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut seen = HashSet::new();
        let mut workers: Vec<(String, JoinHandle<BatchEntry>)> = Vec::with_capacity(requests.len());

        for request in requests {
            if !seen.insert(request.url.clone()) {
                warn!("Skipping duplicate URL {}", request.url);
                continue;
            }

            let url = request.url.clone();
            let worker = Worker {
                launcher: Arc::clone(&self.launcher),
                identity_proxy: self.options.proxy.clone(),
                headless: self.options.headless,
                identities: self.options.identities.clone(),
                settings: self.options.session.clone(),
                backoff: self.options.backoff,
                semaphore: Arc::clone(&semaphore),
                cancel: self.cancel.clone(),
            };

            workers.push((url, tokio::spawn(worker.run(request))));
        }

        info!(
            "Started {} workers (at most {} at a time)",
            workers.len(),
            self.options.concurrency.max(1)
        );

        let mut result = BatchResult::default();
        for (url, handle) in workers {
            let entry = match handle.await {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Worker for {} crashed: {}", url, e);
                    BatchEntry::without_price(EntryStatus::Crashed(e.to_string()))
                }
            };
            debug!("{}: {}", url, entry.status);
            result.insert(url, entry);
        }

        result
    }
}

/// Everything one spawned task needs.
struct Worker<L> {
    launcher: Arc<L>,
    identity_proxy: Option<String>,
    headless: bool,
    identities: IdentityPool,
    settings: SessionSettings,
    backoff: Backoff,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<L: EngineLauncher + 'static> Worker<L> {
    async fn run(self, request: ExtractionRequest) -> BatchEntry {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return BatchEntry::without_price(EntryStatus::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return BatchEntry::without_price(EntryStatus::Cancelled),
            },
        };

        let identity = self.identities.profile(self.identity_proxy.clone(), self.headless);
        let session = match ExtractionSession::open(&*self.launcher, identity, self.settings).await {
            Ok(session) => session,
            Err(e) => {
                error!("Could not start a session for {}: {}", request.url, e);
                return BatchEntry::without_price(EntryStatus::SetupFailed(e.to_string()));
            }
        };

        let mut extractor = RetryingExtractor::new(session, self.backoff);
        let report = extractor.run(&request, &self.cancel).await;
        extractor.close().await;

        BatchEntry::from_report(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{text, ScriptedLauncher, Step};
    use crate::engine::Locator;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn make_options(concurrency: usize) -> BatchOptions {
        BatchOptions {
            concurrency,
            session: SessionSettings::immediate(),
            ..BatchOptions::default()
        }
    }

    fn make_request(url: &str) -> ExtractionRequest {
        ExtractionRequest::new(url, Locator::parse("//span")).with_timeout(Duration::from_secs(1))
    }

    #[test]
    fn test_summary() {
        let summary = BatchSummary::from_prices(vec![Some(100.0), None, Some(300.0)]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.priced, 2);
        assert_eq!(summary.mean, Some(200.0));
        assert_eq!(summary.to_string(), "Total: 3 sites, priced: 2, mean: 200.00");

        let empty = BatchSummary::from_prices(vec![None, None]);
        assert_eq!(empty.mean, None);
        assert_eq!(empty.to_string(), "Total: 2 sites, priced: 0, mean: n/a");
    }

    #[test]
    fn test_entry_status_display_and_serde() {
        assert_eq!(EntryStatus::SetupFailed("no chrome".into()).to_string(), "setup failed: no chrome");

        let entry = BatchEntry { price: Some(9.5), status: EntryStatus::Priced, attempts: 1 };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "priced");
        assert_eq!(json["price"], 9.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_priced_url() {
        let launcher = ScriptedLauncher::new().with_steps("a", vec![text(" 1 999,00 ₽")]);
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(4));

        let result = runner.run(vec![make_request("a")]).await;

        assert_eq!(result.prices(), BTreeMap::from([("a".to_string(), Some(1999.0))]));
        assert_eq!(launcher.log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_url_excluded_from_mean() {
        let launcher = ScriptedLauncher::new()
            .with_steps("a", vec![Step::Missing])
            .with_steps("b", vec![text("250")]);
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(4));

        let result = runner.run(vec![make_request("a"), make_request("b")]).await;

        assert_eq!(result.get("a").unwrap().price, None);
        assert_eq!(result.get("a").unwrap().status, EntryStatus::Unavailable);
        assert_eq!(result.get("a").unwrap().attempts, 3);
        assert_eq!(result.summary(), BatchSummary { total: 2, priced: 1, mean: Some(250.0) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_is_isolated() {
        let urls = ["u1", "u2", "u3", "u4", "u5"];
        let mut launcher = ScriptedLauncher::new().failing_launch(3);
        for url in urls {
            launcher = launcher.with_steps(url, vec![text("10")]);
        }
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(5));

        let result = runner.run(urls.iter().map(|url| make_request(url)).collect()).await;

        assert_eq!(result.len(), 5);
        let failed: Vec<_> = result
            .iter()
            .filter(|(_, entry)| matches!(entry.status, EntryStatus::SetupFailed(_)))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(result.summary().priced, 4);
        assert_eq!(launcher.log.closes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_is_isolated() {
        let launcher = ScriptedLauncher::new()
            .with_steps("boom", vec![Step::Crash])
            .with_steps("fine", vec![text("5,99")]);
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(2));

        let result = runner.run(vec![make_request("boom"), make_request("fine")]).await;

        assert!(matches!(result.get("boom").unwrap().status, EntryStatus::Crashed(_)));
        assert_eq!(result.get("fine").unwrap().price, Some(5.99));
        // The crashed worker's engine is released by drop, not close
        assert_eq!(launcher.log.launches.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.log.closes.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.log.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let urls: Vec<String> = (0..6).map(|i| format!("https://shop{i}.example")).collect();
        let mut launcher = ScriptedLauncher::new();
        for url in &urls {
            launcher = launcher.with_steps(url, vec![Step::Missing]);
        }
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(2));

        let requests = urls.iter().map(|url| make_request(url).with_max_attempts(1)).collect();
        let result = runner.run(requests).await;

        assert_eq!(result.len(), 6);
        assert_eq!(launcher.log.peak_active.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.log.launches.load(Ordering::SeqCst), 6);
        assert_eq!(launcher.log.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_urls_collapse() {
        let launcher = ScriptedLauncher::new().with_steps("a", vec![text("1")]);
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(2));

        let result = runner.run(vec![make_request("a"), make_request("a")]).await;

        assert_eq!(result.len(), 1);
        assert_eq!(launcher.log.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_sessions() {
        let urls = ["a", "b", "c"];
        let mut launcher = ScriptedLauncher::new();
        for url in urls {
            launcher = launcher.with_steps(url, vec![Step::Missing]);
        }
        let runner = ConcurrentBatchRunner::new(launcher.clone(), make_options(1));

        let cancel = runner.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel.cancel();
        });

        let result = runner.run(urls.iter().map(|url| make_request(url)).collect()).await;

        assert!(result.iter().all(|(_, entry)| entry.status == EntryStatus::Cancelled));
        assert_eq!(launcher.log.launches.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.log.closes.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.log.active.load(Ordering::SeqCst), 0);
    }
}
