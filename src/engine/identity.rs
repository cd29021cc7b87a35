//! Randomized client identities for rendering-engine sessions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default desktop user agents a session identity is drawn from.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
];

/// Client identity a session is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// User-agent string presented to sites
    pub user_agent: String,
    /// Optional proxy URL (e.g., socks5://host:port)
    pub proxy: Option<String>,
    /// Run the rendering engine without a visible window
    pub headless: bool,
}

/// Read-only pool of candidate user agents.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    user_agents: Arc<[String]>,
}

impl IdentityPool {
    /// Creates a pool from the given user agents, falling back to the
    /// defaults when none are usable.
    pub fn new(user_agents: impl IntoIterator<Item = String>) -> Self {
        let user_agents: Vec<String> = user_agents
            .into_iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();

        if user_agents.is_empty() {
            return Self::default();
        }

        Self { user_agents: user_agents.into() }
    }

    /// Returns the candidate user agents.
    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }

    /// Draws a fresh identity with a random user agent.
    pub fn profile(&self, proxy: Option<String>, headless: bool) -> IdentityProfile {
        let index = rand::rng().random_range(0..self.user_agents.len());

        IdentityProfile { user_agent: self.user_agents[index].clone(), proxy, headless }
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self { user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool() {
        let pool = IdentityPool::default();
        assert_eq!(pool.user_agents().len(), DEFAULT_USER_AGENTS.len());
        assert!(pool.user_agents().iter().all(|ua| ua.starts_with("Mozilla/5.0")));
    }

    #[test]
    fn test_profile_draws_from_pool() {
        let pool = IdentityPool::default();
        for _ in 0..50 {
            let profile = pool.profile(None, true);
            assert!(pool.user_agents().contains(&profile.user_agent));
            assert!(profile.headless);
            assert!(profile.proxy.is_none());
        }
    }

    #[test]
    fn test_profile_carries_proxy_and_headless() {
        let pool = IdentityPool::new(vec!["TestAgent/1.0".to_string()]);
        let profile = pool.profile(Some("socks5://localhost:1080".to_string()), false);
        assert_eq!(profile.user_agent, "TestAgent/1.0");
        assert_eq!(profile.proxy.as_deref(), Some("socks5://localhost:1080"));
        assert!(!profile.headless);
    }

    #[test]
    fn test_empty_pool_falls_back_to_defaults() {
        let pool = IdentityPool::new(vec!["  ".to_string(), String::new()]);
        assert_eq!(pool.user_agents().len(), DEFAULT_USER_AGENTS.len());

        let pool = IdentityPool::new(Vec::new());
        assert_eq!(pool.user_agents().len(), DEFAULT_USER_AGENTS.len());
    }

    #[test]
    fn test_custom_pool_is_trimmed() {
        let pool = IdentityPool::new(vec![" A ".to_string(), "B".to_string()]);
        assert_eq!(pool.user_agents(), &["A".to_string(), "B".to_string()]);
    }
}
