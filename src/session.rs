//! Extraction sessions: one rendering engine, one identity, one worker.

use crate::engine::{EngineLauncher, IdentityProfile, Locator, RenderingEngine};
use crate::error::{EngineError, ExtractionError};
use chrono::{DateTime, Local};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Randomized pause mimicking a human reading the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumanDelay {
    base: Duration,
    jitter: Duration,
}

impl HumanDelay {
    /// A delay of `base_ms` plus up to `jitter_ms` of random jitter.
    pub fn from_millis(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base: Duration::from_millis(base_ms), jitter: Duration::from_millis(jitter_ms) }
    }

    /// Draws one delay from `[base, base + jitter]`.
    pub fn sample(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 { rand::rng().random_range(0..=jitter_ms) } else { 0 };

        self.base + Duration::from_millis(jitter)
    }

    pub async fn wait(&self) {
        let delay = self.sample();
        if delay.is_zero() {
            return;
        }

        debug!("Delaying {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

/// Behaviour shared by every session of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Pause after navigation, before locating the element
    pub before_locate: HumanDelay,
    /// Pause after scrolling the element into view, before reading it
    pub after_locate: HumanDelay,
    /// How often a missing element is looked up again
    pub poll_interval: Duration,
    /// Where failure screenshots go; `None` disables them
    pub screenshot_dir: Option<PathBuf>,
}

impl SessionSettings {
    /// Settings without delays or screenshots.
    pub fn immediate() -> Self {
        Self {
            before_locate: HumanDelay::default(),
            after_locate: HumanDelay::default(),
            poll_interval: Duration::from_millis(500),
            screenshot_dir: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            before_locate: HumanDelay::from_millis(3000, 3000),
            after_locate: HumanDelay::from_millis(1000, 1000),
            poll_interval: Duration::from_millis(500),
            screenshot_dir: Some(PathBuf::from("screenshots")),
        }
    }
}

/// Owns one rendering engine for the lifetime of a worker.
pub struct ExtractionSession<E: RenderingEngine> {
    engine: E,
    identity: IdentityProfile,
    settings: SessionSettings,
}

impl<E: RenderingEngine> ExtractionSession<E> {
    /// Launches an engine presenting `identity`.
    ///
    /// A launch failure is a setup failure for the caller; nothing is retried.
    pub async fn open<L>(
        launcher: &L,
        identity: IdentityProfile,
        settings: SessionSettings,
    ) -> Result<Self, EngineError>
    where
        L: EngineLauncher<Engine = E>,
    {
        debug!(
            "Opening session (headless: {}, proxy: {}, ua: {})",
            identity.headless,
            identity.proxy.as_deref().unwrap_or("none"),
            identity.user_agent
        );

        let engine = launcher.launch(&identity).await?;
        Ok(Self::new(engine, identity, settings))
    }

    /// Wraps an already running engine.
    pub fn new(engine: E, identity: IdentityProfile, settings: SessionSettings) -> Self {
        Self { engine, identity, settings }
    }

    pub fn identity(&self) -> &IdentityProfile {
        &self.identity
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Loads `url` and returns the text of the element `locator` selects.
    ///
    /// Navigation gets `timeout`, then the element gets another `timeout` to
    /// appear with non-empty text.
    pub async fn fetch_text(
        &mut self,
        url: &str,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<String, ExtractionError> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(timeout, self.engine.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::Timeout(format!(
                    "navigation to {url} exceeded {timeout:?}"
                )))
            }
        }

        self.settings.before_locate.wait().await;

        let (element, text) = self.wait_for_text(locator, timeout).await?;

        if let Err(e) = self.engine.scroll_into_view(&element).await {
            debug!("Could not scroll {} into view: {}", locator, e);
        }

        self.settings.after_locate.wait().await;

        // Prices re-render after scrolling on some storefronts
        match self.engine.read_text(&element).await {
            Ok(settled) if !settled.trim().is_empty() => Ok(settled),
            Ok(_) => Ok(text),
            Err(e) => {
                debug!("Re-reading {} failed, keeping first read: {}", locator, e);
                Ok(text)
            }
        }
    }

    /// Polls until the element exists with non-empty text or the deadline passes.
    async fn wait_for_text(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(E::Element, String), ExtractionError> {
        let deadline = deadline_after(timeout);
        let poll_interval = self.settings.poll_interval.max(Duration::from_millis(10));
        let mut seen_empty = false;

        loop {
            let engine = &mut self.engine;
            let probe = async {
                let element = engine.find_element(locator).await?;
                let text = engine.read_text(&element).await?;
                Ok::<_, EngineError>((element, text))
            };

            match tokio::time::timeout_at(deadline, probe).await {
                Ok(Ok((element, text))) if !text.trim().is_empty() => return Ok((element, text)),
                Ok(Ok(_)) => seen_empty = true,
                Ok(Err(EngineError::NotFound(_))) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake = now.checked_add(poll_interval).map_or(deadline, |wake| wake.min(deadline));
            tokio::time::sleep_until(wake).await;
        }

        if seen_empty {
            Err(ExtractionError::Timeout(format!("{locator} stayed empty for {timeout:?}")))
        } else {
            Err(ExtractionError::ElementNotFound(locator.to_string()))
        }
    }

    /// Saves a screenshot named after `label`, `url` and the current time.
    ///
    /// Best-effort: every failure is logged and yields `None`.
    pub async fn capture_diagnostic(&mut self, label: &str, url: &str) -> Option<PathBuf> {
        let dir = self.settings.screenshot_dir.clone()?;

        let png = match self.engine.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                warn!("Screenshot for {} failed: {}", url, e);
                return None;
            }
        };

        match write_artifact(&dir, &artifact_name(label, url, Local::now()), &png).await {
            Ok(path) => {
                info!("Saved screenshot {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not save screenshot in {}: {}", dir.display(), e);
                None
            }
        }
    }

    /// Releases the engine, logging instead of failing.
    pub async fn close(mut self) {
        if let Err(e) = self.engine.close().await {
            warn!("Failed to close rendering engine: {}", e);
        }
    }
}

/// Deadline `timeout` from now, saturating at roughly thirty years out.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

async fn write_artifact(dir: &Path, name: &str, png: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, png).await?;
    Ok(path)
}

/// File name for a diagnostic screenshot.
fn artifact_name(label: &str, url: &str, at: DateTime<Local>) -> String {
    let target = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);

    let mut slug = String::with_capacity(target.len());
    for c in target.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
        if slug.len() >= 60 {
            break;
        }
    }
    let slug = slug.trim_matches('_');

    format!("{}_{}_{}.png", label, slug, at.format("%Y%m%d-%H%M%S%.3f"))
}
