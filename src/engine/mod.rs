//! Rendering engine capability consumed by extraction sessions.
//!
//! An engine loads a URL, locates an element, reads its text, scrolls it into
//! view and takes screenshots. Two adapters ship: a headless Chromium driven
//! over CDP (`browser` feature) and a static HTTP fetcher with browser TLS
//! emulation.

#[cfg(feature = "browser")]
pub mod chromium;
pub mod http;
pub mod identity;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use identity::{IdentityPool, IdentityProfile};

/// Expression identifying one element within a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    XPath(String),
    Css(String),
}

impl Locator {
    /// Classifies a locator expression.
    ///
    /// `xpath:` and `css:` prefixes force the kind. Otherwise expressions
    /// starting with `/`, `./` or `(` are XPath and everything else is CSS.
    pub fn parse(expression: &str) -> Self {
        let expression = expression.trim();

        if let Some(rest) = expression.strip_prefix("xpath:") {
            return Locator::XPath(rest.trim().to_string());
        }
        if let Some(rest) = expression.strip_prefix("css:") {
            return Locator::Css(rest.trim().to_string());
        }

        if expression.starts_with('/') || expression.starts_with("./") || expression.starts_with('(')
        {
            Locator::XPath(expression.to_string())
        } else {
            Locator::Css(expression.to_string())
        }
    }

    /// Returns the raw expression without its kind.
    pub fn expression(&self) -> &str {
        match self {
            Locator::XPath(expr) | Locator::Css(expr) => expr,
        }
    }

    /// Returns true for XPath locators.
    pub fn is_xpath(&self) -> bool {
        matches!(self, Locator::XPath(_))
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let locator = Locator::parse(s);
        if locator.expression().is_empty() {
            return Err("Locator expression is empty".to_string());
        }
        Ok(locator)
    }
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath(expr) => write!(f, "xpath:{}", expr),
            Locator::Css(expr) => write!(f, "css:{}", expr),
        }
    }
}

/// One live rendering-engine session (a browser tab, an HTTP client).
///
/// Implementations are owned by exactly one extraction session and are never
/// shared across workers.
#[async_trait]
pub trait RenderingEngine: Send {
    /// Handle to a located element, valid until the next navigation.
    type Element: Send + Sync;

    /// Loads `url`, failing with [`EngineError::Navigation`] on
    /// network/DNS/TLS/HTTP errors.
    async fn navigate(&mut self, url: &str) -> Result<(), EngineError>;

    /// Locates the first element matching `locator`, failing with
    /// [`EngineError::NotFound`] when nothing matches right now.
    async fn find_element(&mut self, locator: &Locator) -> Result<Self::Element, EngineError>;

    /// Reads the element's text, falling back across text-bearing attributes
    /// when the primary text is empty.
    async fn read_text(&mut self, element: &Self::Element) -> Result<String, EngineError>;

    async fn scroll_into_view(&mut self, element: &Self::Element) -> Result<(), EngineError>;

    /// Captures the current viewport as PNG bytes.
    async fn screenshot(&mut self) -> Result<Vec<u8>, EngineError>;

    /// Releases the underlying resources. Must be safe to call twice.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Starts rendering-engine sessions for a given client identity.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    type Engine: RenderingEngine + 'static;

    async fn launch(&self, identity: &IdentityProfile) -> Result<Self::Engine, EngineError>;
}

/// Which rendering engine adapter to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Headless Chromium over CDP.
    #[default]
    Browser,
    /// Plain HTTP fetch with TLS fingerprint emulation (static pages only).
    Http,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "browser" | "chromium" | "chrome" => Ok(EngineKind::Browser),
            "http" | "static" => Ok(EngineKind::Http),
            _ => Err(format!("Unknown engine: {}. Use: browser, http", s)),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Browser => write!(f, "browser"),
            EngineKind::Http => write!(f, "http"),
        }
    }
}
