//! Static-page engine: HTTP fetch with TLS fingerprint emulation plus CSS lookup.
//!
//! Covers pages whose price is present in the served HTML. No JavaScript runs,
//! so XPath locators and screenshots are unsupported.

use super::{EngineLauncher, IdentityProfile, Locator, RenderingEngine};
use crate::error::EngineError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Attributes consulted, in order, when an element has no text nodes
/// (e.g. `<meta itemprop="price" content="1999">`).
const TEXT_ATTRIBUTES: &[&str] = &["content", "value", "data-price", "title"];

/// Launches [`HttpEngine`] sessions.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    timeout: Duration,
    connect_timeout: Duration,
}

impl HttpLauncher {
    /// Creates a launcher whose clients time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, connect_timeout: Duration::from_secs(10).min(timeout) }
    }
}

#[async_trait]
impl EngineLauncher for HttpLauncher {
    type Engine = HttpEngine;

    async fn launch(&self, identity: &IdentityProfile) -> Result<HttpEngine, EngineError> {
        HttpEngine::new(identity, self.timeout, self.connect_timeout)
    }
}

/// Element located in a fetched document.
#[derive(Debug, Clone, Default)]
pub struct HttpElement {
    text: String,
    attributes: Vec<String>,
}

/// HTTP client with browser impersonation, holding the last fetched page.
pub struct HttpEngine {
    client: Client,
    user_agent: String,
    document: Option<String>,
}

impl HttpEngine {
    /// Creates an engine presenting the given identity.
    pub fn new(
        identity: &IdentityProfile,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .connect_timeout(connect_timeout);

        // Configure proxy if specified
        if let Some(proxy_url) = &identity.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url)
                .map_err(|e| EngineError::Engine(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| EngineError::Engine(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, user_agent: identity.user_agent.clone(), document: None })
    }

    fn select_first(html: &str, css: &str) -> Result<Option<HttpElement>, EngineError> {
        let selector = Selector::parse(css)
            .map_err(|e| EngineError::Engine(format!("invalid CSS selector '{}': {:?}", css, e)))?;

        let document = Html::parse_document(html);
        let element = document.select(&selector).next().map(|e| HttpElement {
            text: e.text().collect::<String>(),
            attributes: TEXT_ATTRIBUTES
                .iter()
                .filter_map(|name| e.value().attr(name))
                .map(String::from)
                .collect(),
        });

        Ok(element)
    }
}

#[async_trait]
impl RenderingEngine for HttpEngine {
    type Element = HttpElement;

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        debug!("GET {}", url);
        self.document = None;

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(|e| EngineError::Navigation(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 403 || status == 429 || status == 503 {
            warn!("Blocked or rate limited ({}) by {}. Consider a proxy or longer delays.", status, url);
            return Err(EngineError::Navigation(format!("blocked with status {}", status)));
        }

        if !status.is_success() {
            return Err(EngineError::Navigation(format!("request failed with status: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to read response body: {}", e)))?;

        self.document = Some(body);
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<HttpElement, EngineError> {
        let css = match locator {
            Locator::Css(css) => css,
            Locator::XPath(_) => return Err(EngineError::Unsupported("XPath locators")),
        };

        let html = self
            .document
            .as_deref()
            .ok_or_else(|| EngineError::Engine("no page loaded".to_string()))?;

        Self::select_first(html, css)?.ok_or_else(|| EngineError::NotFound(locator.to_string()))
    }

    async fn read_text(&mut self, element: &HttpElement) -> Result<String, EngineError> {
        if !element.text.trim().is_empty() {
            return Ok(element.text.clone());
        }

        Ok(element
            .attributes
            .iter()
            .find(|value| !value.trim().is_empty())
            .cloned()
            .unwrap_or_default())
    }

    async fn scroll_into_view(&mut self, _element: &HttpElement) -> Result<(), EngineError> {
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Unsupported("screenshots"))
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.document = None;
        Ok(())
    }
}
