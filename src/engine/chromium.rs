//! Chromium-based engine using chromiumoxide.
//!
//! Every session launches its own browser process with a throwaway profile
//! directory, so concurrent workers never contend for a profile lock.

use super::{EngineLauncher, IdentityProfile, Locator, RenderingEngine};
use crate::error::EngineError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Flags that suppress the most common automation fingerprints.
const STEALTH_FLAGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--ignore-certificate-errors",
    "--allow-running-insecure-content",
    "--disable-extensions",
    "--lang=en-US",
];

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
Object.defineProperty(navigator, 'vendor', { get: () => 'Google Inc.', configurable: true });
Object.defineProperty(navigator, 'platform', { get: () => 'Win32', configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });
if (!window.chrome) { window.chrome = { runtime: {} }; }
(() => {
    const patch = (proto) => {
        const getParameter = proto.getParameter;
        proto.getParameter = function (parameter) {
            if (parameter === 37445) { return 'Intel Inc.'; }
            if (parameter === 37446) { return 'Intel Iris OpenGL Engine'; }
            return getParameter.call(this, parameter);
        };
    };
    if (window.WebGLRenderingContext) { patch(WebGLRenderingContext.prototype); }
    if (window.WebGL2RenderingContext) { patch(WebGL2RenderingContext.prototype); }
})();
"#;

/// Launches one Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    /// Creates a launcher. Without an explicit binary, chromiumoxide's own
    /// Chrome/Chromium detection is used.
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    fn browser_config(
        &self,
        identity: &IdentityProfile,
        profile_dir: &TempDir,
    ) -> Result<BrowserConfig, EngineError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1366, 768)
            .user_data_dir(profile_dir.path())
            .arg(format!("--user-agent={}", identity.user_agent));

        for flag in STEALTH_FLAGS {
            builder = builder.arg(*flag);
        }

        if let Some(proxy) = &identity.proxy {
            debug!("Configuring proxy: {}", proxy);
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        if !identity.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(|e| EngineError::Engine(format!("invalid browser config: {e}")))
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    type Engine = ChromiumEngine;

    async fn launch(&self, identity: &IdentityProfile) -> Result<ChromiumEngine, EngineError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("price-scout-")
            .tempdir()
            .map_err(|e| EngineError::Engine(format!("failed to create profile dir: {e}")))?;

        let config = self.browser_config(identity, &profile_dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::Engine(format!("failed to launch Chromium: {e}")))?;

        // Drive the CDP connection until the browser goes away
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let mut engine = ChromiumEngine {
            browser,
            page: None,
            handler_task,
            _profile_dir: profile_dir,
            closed: false,
        };

        match engine.open_page().await {
            Ok(()) => Ok(engine),
            Err(e) => {
                let _ = engine.close().await;
                Err(e)
            }
        }
    }
}

/// A Chromium process with a single stealth-patched tab.
pub struct ChromiumEngine {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    _profile_dir: TempDir,
    closed: bool,
}

impl ChromiumEngine {
    async fn open_page(&mut self) -> Result<(), EngineError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Engine(format!("failed to create page: {e}")))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| EngineError::Engine(format!("failed to inject stealth script: {e}")))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, EngineError> {
        self.page.as_ref().ok_or_else(|| EngineError::Engine("browser session is closed".to_string()))
    }
}

#[async_trait]
impl RenderingEngine for ChromiumEngine {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        let page = self.page()?;

        page.goto(url).await.map_err(|e| EngineError::Navigation(format!("{url}: {e}")))?;
        // Settles client-side redirects; a page that never fires load is still usable
        let _ = page.wait_for_navigation().await;

        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<Element, EngineError> {
        let page = self.page()?;

        let found = match locator {
            Locator::XPath(xpath) => page.find_xpath(xpath.as_str()).await,
            Locator::Css(css) => page.find_element(css.as_str()).await,
        };

        found.map_err(|e| {
            debug!("Lookup of {} failed: {}", locator, e);
            EngineError::NotFound(locator.to_string())
        })
    }

    async fn read_text(&mut self, element: &Element) -> Result<String, EngineError> {
        let inner = element
            .inner_text()
            .await
            .map_err(|e| EngineError::Engine(format!("failed to read innerText: {e}")))?;

        if let Some(text) = inner.filter(|t| !t.trim().is_empty()) {
            return Ok(text);
        }

        let content = element
            .property("textContent")
            .await
            .map_err(|e| EngineError::Engine(format!("failed to read textContent: {e}")))?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|t| !t.trim().is_empty());

        if let Some(text) = content {
            return Ok(text);
        }

        // <meta itemprop="price" content="..."> and similar
        let attribute = element
            .attribute("content")
            .await
            .map_err(|e| EngineError::Engine(format!("failed to read content attribute: {e}")))?;

        Ok(attribute.unwrap_or_default())
    }

    async fn scroll_into_view(&mut self, element: &Element) -> Result<(), EngineError> {
        element
            .scroll_into_view()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Engine(format!("failed to scroll element into view: {e}")))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, EngineError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();

        self.page()?
            .screenshot(params)
            .await
            .map_err(|e| EngineError::Engine(format!("screenshot failed: {e}")))
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page = None;

        let result = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("Chromium did not exit cleanly: {}", e);
        }
        self.handler_task.abort();

        result.map(|_| ()).map_err(|e| EngineError::Engine(format!("failed to close browser: {e}")))
    }
}

impl Drop for ChromiumEngine {
    fn drop(&mut self) {
        // Dropping the Browser kills a still-running child process
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_identity() -> IdentityProfile {
        IdentityProfile {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) TestAgent".to_string(),
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            headless: true,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_reads_price() {
        let launcher = ChromiumLauncher::default();
        let mut identity = make_identity();
        identity.proxy = None;

        let mut engine = launcher.launch(&identity).await.expect("failed to launch");
        engine
            .navigate("data:text/html,<span class='price'>1 999,00 ₽</span>")
            .await
            .expect("navigation failed");

        let element = engine
            .find_element(&Locator::parse("//span[@class='price']"))
            .await
            .expect("element not found");
        engine.scroll_into_view(&element).await.expect("scroll failed");
        let text = engine.read_text(&element).await.expect("read failed");
        assert_eq!(crate::price::parse_price(&text), Some(1999.0));

        let png = engine.screenshot().await.expect("screenshot failed");
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        engine.close().await.expect("close failed");
        assert!(engine.close().await.is_ok());
    }
}
