//! price-scout - extract prices from rendered web pages
//!
//! Bounded-retry extraction through a stealth-configured browser or a
//! browser-emulating HTTP client, with locale-aware price parsing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use price_scout::commands::{BatchCommand, ParseCommand, ScrapeCommand};
use price_scout::config::{Config, OutputFormat};
use price_scout::engine::EngineKind;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "price-scout",
    version,
    about = "Extract prices from web pages with retries and locale-aware parsing",
    long_about = "Loads pages in a fingerprint-masked browser (or a browser-emulating HTTP client), \
                  locates the price element by XPath or CSS and parses the price across currencies \
                  and separator conventions."
)]
struct Cli {
    /// Rendering engine: browser or http
    #[arg(short, long, global = true, env = "SCOUT_ENGINE")]
    engine: Option<EngineKind>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "SCOUT_PROXY")]
    proxy: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Directory for failure screenshots
    #[arg(long, global = true, env = "SCOUT_SCREENSHOT_DIR")]
    screenshot_dir: Option<PathBuf>,

    /// Do not save failure screenshots
    #[arg(long, global = true)]
    no_screenshots: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the price from one page
    #[command(alias = "s")]
    Scrape {
        /// Page URL
        url: String,

        /// XPath or CSS locator of the price element
        locator: String,

        /// Attempts before giving up
        #[arg(short, long, env = "SCOUT_ATTEMPTS")]
        attempts: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(short, long, env = "SCOUT_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Extract prices for every site in a TOML or JSON list
    #[command(alias = "b")]
    Batch {
        /// Site list file (.toml or .json)
        sites: PathBuf,

        /// Maximum concurrent sessions
        #[arg(short = 'j', long, env = "SCOUT_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Attempts per site
        #[arg(short, long, env = "SCOUT_ATTEMPTS")]
        attempts: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(short, long, env = "SCOUT_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Normalize and parse price strings without fetching anything
    #[command(alias = "p")]
    Parse {
        /// Raw price texts
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// List the user agents identities are drawn from
    Agents,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(engine) = cli.engine {
        config.engine = engine;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }
    if let Some(dir) = cli.screenshot_dir {
        config.screenshot_dir = dir;
    }
    if cli.headed {
        config.headless = false;
    }
    if cli.no_screenshots {
        config.screenshots = false;
    }

    match cli.command {
        Commands::Scrape { url, locator, attempts, timeout } => {
            if let Some(attempts) = attempts {
                config.max_attempts = attempts;
            }
            if let Some(timeout) = timeout {
                config.timeout_secs = timeout;
            }

            let cmd = ScrapeCommand::new(config);
            let output = cmd.execute(&url, &locator).await?;
            println!("{}", output);
        }

        Commands::Batch { sites, concurrency, attempts, timeout } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(attempts) = attempts {
                config.max_attempts = attempts;
            }
            if let Some(timeout) = timeout {
                config.timeout_secs = timeout;
            }

            let cmd = BatchCommand::new(config);
            let output = cmd.execute(&sites).await?;
            println!("{}", output);
        }

        Commands::Parse { texts } => {
            let cmd = ParseCommand::new(config);
            println!("{}", cmd.execute(&texts));
        }

        Commands::Agents => {
            println!("User agents in effect:\n");
            for (index, agent) in config.identity_pool().user_agents().iter().enumerate() {
                println!("{:>2}. {}", index + 1, agent);
            }
        }
    }

    Ok(())
}
