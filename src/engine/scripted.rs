//! Scripted rendering engine for unit tests.

use super::{EngineLauncher, IdentityProfile, Locator, RenderingEngine};
use crate::error::EngineError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What one page load at a URL yields. The last step for a URL repeats.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// The element exists with this text.
    Text(String),
    /// The element exists but its text stays empty.
    Empty,
    /// No element matches.
    Missing,
    /// Navigation itself fails.
    Unreachable,
    /// Navigation never completes.
    Stalled,
    /// The worker panics while locating the element.
    Crash,
}

pub(crate) fn text(value: &str) -> Step {
    Step::Text(value.to_string())
}

/// Counters shared by every engine a launcher creates.
#[derive(Debug, Default)]
pub(crate) struct EngineLog {
    pub launches: AtomicUsize,
    pub navigations: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub closes: AtomicUsize,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
}

type Script = Arc<Mutex<HashMap<String, VecDeque<Step>>>>;

pub(crate) struct ScriptedEngine {
    script: Script,
    current: Option<Step>,
    screenshots_fail: bool,
    closed: bool,
    log: Arc<EngineLog>,
}

#[async_trait]
impl RenderingEngine for ScriptedEngine {
    type Element = String;

    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        self.log.navigations.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            let steps = script.entry(url.to_string()).or_default();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };

        self.current = None;
        match step.unwrap_or(Step::Unreachable) {
            Step::Unreachable => Err(EngineError::Navigation(format!("{url} is unreachable"))),
            Step::Stalled => std::future::pending().await,
            step => {
                self.current = Some(step);
                Ok(())
            }
        }
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<String, EngineError> {
        match &self.current {
            Some(Step::Text(text)) => Ok(text.clone()),
            Some(Step::Empty) => Ok(String::new()),
            Some(Step::Crash) => panic!("scripted crash"),
            _ => Err(EngineError::NotFound(locator.to_string())),
        }
    }

    async fn read_text(&mut self, element: &String) -> Result<String, EngineError> {
        Ok(element.clone())
    }

    async fn scroll_into_view(&mut self, _element: &String) -> Result<(), EngineError> {
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, EngineError> {
        self.log.screenshots.fetch_add(1, Ordering::SeqCst);
        if self.screenshots_fail {
            return Err(EngineError::Engine("screenshot crashed".to_string()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if !self.closed {
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            self.release();
        }
        Ok(())
    }
}

impl ScriptedEngine {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// A worker that panics never reaches close()
impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Hands out [`ScriptedEngine`]s sharing one per-URL script.
#[derive(Clone, Default)]
pub(crate) struct ScriptedLauncher {
    script: Script,
    fail_launch_number: Option<usize>,
    screenshots_fail: bool,
    pub log: Arc<EngineLog>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(self, url: &str, steps: Vec<Step>) -> Self {
        self.script.lock().unwrap().insert(url.to_string(), steps.into());
        self
    }

    /// Makes the n-th launch (1-indexed) fail.
    pub fn failing_launch(mut self, n: usize) -> Self {
        self.fail_launch_number = Some(n);
        self
    }

    pub fn failing_screenshots(mut self) -> Self {
        self.screenshots_fail = true;
        self
    }

    pub fn engine(&self) -> ScriptedEngine {
        self.log.active.fetch_add(1, Ordering::SeqCst);
        ScriptedEngine {
            script: Arc::clone(&self.script),
            current: None,
            screenshots_fail: self.screenshots_fail,
            closed: false,
            log: Arc::clone(&self.log),
        }
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn launch(&self, _identity: &IdentityProfile) -> Result<ScriptedEngine, EngineError> {
        let number = self.log.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_launch_number == Some(number) {
            return Err(EngineError::Engine("browser binary missing".to_string()));
        }

        // Yield so concurrently launched workers overlap
        tokio::task::yield_now().await;

        let engine = self.engine();
        let active = self.log.active.load(Ordering::SeqCst);
        self.log.peak_active.fetch_max(active, Ordering::SeqCst);
        Ok(engine)
    }
}
