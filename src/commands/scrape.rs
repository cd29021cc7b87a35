//! Single-URL extraction command.

use super::cancel_on_ctrl_c;
use crate::config::Config;
#[cfg(feature = "browser")]
use crate::engine::chromium::ChromiumLauncher;
use crate::engine::http::HttpLauncher;
use crate::engine::{EngineKind, EngineLauncher, Locator};
use crate::extractor::RetryingExtractor;
use crate::format::Formatter;
use crate::session::ExtractionSession;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Extracts the price of one URL.
pub struct ScrapeCommand {
    config: Config,
}

impl ScrapeCommand {
    /// Creates a new scrape command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the extraction with the configured engine and returns formatted output.
    pub async fn execute(&self, url: &str, locator: &str) -> Result<String> {
        let cancel = cancel_on_ctrl_c();

        match self.config.engine {
            EngineKind::Http => {
                let launcher = HttpLauncher::new(self.config.timeout());
                self.execute_with_launcher(&launcher, url, locator, &cancel).await
            }
            #[cfg(feature = "browser")]
            EngineKind::Browser => {
                let launcher = ChromiumLauncher::new(self.config.chrome_path.clone());
                self.execute_with_launcher(&launcher, url, locator, &cancel).await
            }
            #[cfg(not(feature = "browser"))]
            EngineKind::Browser => {
                anyhow::bail!("Built without the browser engine. Use --engine http.")
            }
        }
    }

    /// Runs the extraction with a provided launcher (for testing).
    pub async fn execute_with_launcher<L: EngineLauncher>(
        &self,
        launcher: &L,
        url: &str,
        locator: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let locator: Locator = locator.parse().map_err(anyhow::Error::msg)?;
        let request = self.config.request(url.trim(), locator);

        info!("Extracting {} with {} ({} attempts)", request.url, request.locator, request.max_attempts);

        let identity =
            self.config.identity_pool().profile(self.config.proxy.clone(), self.config.headless);
        let session = ExtractionSession::open(launcher, identity, self.config.session_settings())
            .await
            .context("Failed to start rendering engine")?;

        let mut extractor = RetryingExtractor::new(session, self.config.backoff());
        let report = extractor.run(&request, cancel).await;
        extractor.close().await;

        let formatter = Formatter::new(self.config.format);
        Ok(formatter.format_report(&report))
    }
}
