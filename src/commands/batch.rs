//! Batch extraction over a site list.

use super::cancel_on_ctrl_c;
use crate::batch::ConcurrentBatchRunner;
use crate::config::Config;
#[cfg(feature = "browser")]
use crate::engine::chromium::ChromiumLauncher;
use crate::engine::http::HttpLauncher;
use crate::engine::{EngineKind, EngineLauncher};
use crate::format::{Formatter, PriceRow};
use crate::sites::{load_sites, SiteEntry};
use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Extracts prices for every site in a list.
pub struct BatchCommand {
    config: Config,
}

impl BatchCommand {
    /// Creates a new batch command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Loads the site list and runs it with the configured engine.
    pub async fn execute(&self, sites_file: &Path) -> Result<String> {
        let sites = load_sites(sites_file)?;
        let cancel = cancel_on_ctrl_c();

        match self.config.engine {
            EngineKind::Http => {
                let launcher = HttpLauncher::new(self.config.timeout());
                self.execute_with_launcher(launcher, &sites, cancel).await
            }
            #[cfg(feature = "browser")]
            EngineKind::Browser => {
                let launcher = ChromiumLauncher::new(self.config.chrome_path.clone());
                self.execute_with_launcher(launcher, &sites, cancel).await
            }
            #[cfg(not(feature = "browser"))]
            EngineKind::Browser => {
                anyhow::bail!("Built without the browser engine. Use --engine http.")
            }
        }
    }

    /// Runs validated sites with a provided launcher (for testing).
    pub async fn execute_with_launcher<L: EngineLauncher + 'static>(
        &self,
        launcher: L,
        sites: &[SiteEntry],
        cancel: CancellationToken,
    ) -> Result<String> {
        let requests = sites
            .iter()
            .map(|site| site.to_request(self.config.timeout(), self.config.max_attempts))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Checking {} sites with {} engine, {} at a time",
            requests.len(),
            self.config.engine,
            self.config.concurrency
        );

        let runner = ConcurrentBatchRunner::new(launcher, self.config.batch_options())
            .with_cancellation(cancel);
        let result = runner.run(requests).await;

        let rows: Vec<PriceRow> = sites
            .iter()
            .filter_map(|site| {
                let url = site.url.trim();
                result.get(url).map(|entry| PriceRow {
                    title: site.title.clone(),
                    url: url.to_string(),
                    price: entry.price,
                    status: entry.status.to_string(),
                })
            })
            .collect();

        let summary = result.summary();
        info!("{}", summary);

        let formatter = Formatter::new(self.config.format);
        Ok(formatter.format_rows(&rows, &summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::engine::scripted::{text, ScriptedLauncher, Step};

    fn make_config() -> Config {
        Config {
            delay_ms: 0,
            delay_jitter_ms: 0,
            read_delay_ms: 0,
            read_delay_jitter_ms: 0,
            timeout_secs: 1,
            screenshots: false,
            format: OutputFormat::Csv,
            ..Config::default()
        }
    }

    fn site(title: &str, url: &str) -> SiteEntry {
        SiteEntry { title: title.to_string(), url: url.to_string(), locator: "//span".to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_rows_follow_site_order() {
        let launcher = ScriptedLauncher::new()
            .with_steps("https://b.example", vec![text("€ 19,99")])
            .with_steps("https://a.example", vec![Step::Missing]);
        let cmd = BatchCommand::new(make_config());
        let sites = vec![site("Shop B", "https://b.example"), site("Shop A", "https://a.example")];

        let output = cmd.execute_with_launcher(launcher, &sites, CancellationToken::new()).await.unwrap();

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "Shop B,https://b.example,19.99,priced");
        assert_eq!(lines[2], "Shop A,https://a.example,,unavailable");
        assert_eq!(lines[3], "# Total: 2 sites, priced: 1, mean: 19.99");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_reports_setup_failures() {
        let launcher = ScriptedLauncher::new().failing_launch(1);
        let config = Config { concurrency: 1, format: OutputFormat::Table, ..make_config() };
        let cmd = BatchCommand::new(config);

        let output = cmd
            .execute_with_launcher(launcher, &[site("Only", "https://only.example")], CancellationToken::new())
            .await
            .unwrap();

        assert!(output.contains("setup failed"));
        assert!(output.contains("Total: 1 sites, priced: 0, mean: n/a"));
    }
}
