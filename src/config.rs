//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::batch::BatchOptions;
use crate::engine::{EngineKind, IdentityPool, Locator};
use crate::extractor::{Backoff, ExtractionRequest};
use crate::session::{HumanDelay, SessionSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rendering engine adapter
    #[serde(default)]
    pub engine: EngineKind,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Attempts per URL before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Backoff time unit; the delay after attempt k is unit * 2^k
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Ceiling for a single backoff sleep (0 = no ceiling)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Maximum number of concurrent sessions in a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Base delay after navigation in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Base delay before reading the located element
    #[serde(default = "default_read_delay_ms")]
    pub read_delay_ms: u64,

    /// Random jitter added to the read delay
    #[serde(default = "default_read_delay_jitter_ms")]
    pub read_delay_jitter_ms: u64,

    /// How often a missing element is looked up again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Save a screenshot for every failed attempt
    #[serde(default = "default_screenshots")]
    pub screenshots: bool,

    /// Directory for failure screenshots
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Chrome/Chromium binary (auto-detected when unset)
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// User agents identities are drawn from (built-in pool when empty)
    #[serde(default)]
    pub user_agents: Vec<String>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_headless() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_concurrency() -> usize {
    4
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_delay_jitter_ms() -> u64 {
    3000
}

fn default_read_delay_ms() -> u64 {
    1000
}

fn default_read_delay_jitter_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_screenshots() -> bool {
    true
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            proxy: None,
            headless: default_headless(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            concurrency: default_concurrency(),
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            read_delay_ms: default_read_delay_ms(),
            read_delay_jitter_ms: default_read_delay_jitter_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            screenshots: default_screenshots(),
            screenshot_dir: default_screenshot_dir(),
            chrome_path: None,
            user_agents: Vec::new(),
            format: OutputFormat::Table,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let local_config = Path::new("price-scout.toml");
        if local_config.exists() {
            debug!("Found price-scout.toml in current directory");
            return Self::from_file(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("price-scout").join("config.toml");
            if user_config.exists() {
                debug!("Found config in user config directory");
                return Self::from_file(user_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Some(engine) = env_parse("SCOUT_ENGINE") {
            self.engine = engine;
        }

        if let Ok(proxy) = std::env::var("SCOUT_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy);
            }
        }

        if let Some(concurrency) = env_parse("SCOUT_CONCURRENCY") {
            self.concurrency = concurrency;
        }

        if let Some(timeout) = env_parse("SCOUT_TIMEOUT") {
            self.timeout_secs = timeout;
        }

        if let Some(attempts) = env_parse("SCOUT_ATTEMPTS") {
            self.max_attempts = attempts;
        }

        if let Ok(path) = std::env::var("SCOUT_CHROME_PATH") {
            self.chrome_path = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("SCOUT_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(dir);
        }

        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        let cap = (self.max_backoff_ms > 0).then(|| Duration::from_millis(self.max_backoff_ms));
        Backoff::new(Duration::from_millis(self.backoff_unit_ms), cap)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            before_locate: HumanDelay::from_millis(self.delay_ms, self.delay_jitter_ms),
            after_locate: HumanDelay::from_millis(self.read_delay_ms, self.read_delay_jitter_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            screenshot_dir: self.screenshots.then(|| self.screenshot_dir.clone()),
        }
    }

    pub fn identity_pool(&self) -> IdentityPool {
        IdentityPool::new(self.user_agents.iter().cloned())
    }

    /// Builds a request using the configured timeout and attempt count.
    pub fn request(&self, url: &str, locator: Locator) -> ExtractionRequest {
        ExtractionRequest::new(url, locator)
            .with_timeout(self.timeout())
            .with_max_attempts(self.max_attempts)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency.max(1),
            backoff: self.backoff(),
            session: self.session_settings(),
            identities: self.identity_pool(),
            proxy: self.proxy.clone(),
            headless: self.headless,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
