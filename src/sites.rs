//! Site lists: the `(title, url, locator)` entries a batch runs over.

use crate::engine::Locator;
use crate::extractor::ExtractionRequest;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// One site to price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteEntry {
    pub title: String,
    pub url: String,
    /// XPath or CSS expression selecting the price element
    #[serde(alias = "xpath")]
    pub locator: String,
}

impl SiteEntry {
    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("title is empty");
        }

        let url = self.url.trim();
        if url.is_empty() {
            bail!("url is empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("url must start with http:// or https://: {}", url);
        }

        self.locator.parse::<Locator>().map_err(anyhow::Error::msg)?;
        Ok(())
    }

    /// Builds the extraction request for this site.
    pub fn to_request(&self, timeout: Duration, max_attempts: u32) -> Result<ExtractionRequest> {
        let locator = self
            .locator
            .parse::<Locator>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid locator for {}", self.title))?;

        Ok(ExtractionRequest::new(self.url.trim(), locator)
            .with_timeout(timeout)
            .with_max_attempts(max_attempts))
    }
}

/// Serialization of a site list file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFormat {
    /// `[[site]]` tables
    Toml,
    /// Array of objects
    Json,
}

impl SiteFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase).as_deref() {
            Some("toml") => Ok(SiteFormat::Toml),
            Some("json") => Ok(SiteFormat::Json),
            _ => bail!("Unsupported site list format: {} (use .toml or .json)", path.display()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSites {
    #[serde(default)]
    site: Vec<SiteEntry>,
}

/// Reads and validates a site list file.
pub fn load_sites(path: impl AsRef<Path>) -> Result<Vec<SiteEntry>> {
    let path = path.as_ref();
    debug!("Loading sites from: {}", path.display());

    let format = SiteFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read site list: {}", path.display()))?;

    parse_sites(&content, format)
        .with_context(|| format!("Invalid site list: {}", path.display()))
}

/// Parses and validates site list content.
///
/// Entries repeating an earlier URL are dropped with a warning.
pub fn parse_sites(content: &str, format: SiteFormat) -> Result<Vec<SiteEntry>> {
    let entries = match format {
        SiteFormat::Toml => toml::from_str::<TomlSites>(content)?.site,
        SiteFormat::Json => serde_json::from_str::<Vec<SiteEntry>>(content)?,
    };

    let mut seen = HashSet::new();
    let mut sites = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        entry.validate().with_context(|| {
            format!("Site #{} ({:?}) is invalid", index + 1, entry.title)
        })?;

        if !seen.insert(entry.url.trim().to_string()) {
            warn!("Duplicate URL {} in site #{}, keeping the first", entry.url, index + 1);
            continue;
        }

        sites.push(entry);
    }

    debug!("Loaded {} sites", sites.len());
    Ok(sites)
}
