//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which carries the hosting API and AI service credentials,
//! the webhook secret, the cache location and the timeouts applied to every remote call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').map(str::trim).collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(RepoId {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(format!("expected \"owner/repo\", got {s:?}")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Base URL of the GitHub REST API.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Token used as bearer credential for every GitHub call.
    pub github_token: String,

    /// API key for the OpenAI-compatible completion service.
    pub openai_api_key: String,

    /// Base URL of the completion service (without the `/v1/...` suffix).
    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    /// Model identifier sent with every completion request.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Shared secret used to sign webhook deliveries.
    pub github_webhook_secret: String,

    /// Organization whose repositories are offered for selection.
    pub github_org: Option<String>,

    /// Path of the SQLite file backing the content cache.
    #[serde(default = "default_cache_database")]
    pub cache_database: String,

    /// Upper bound for any single remote call, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Time to live for memoized metrics responses in seconds.
    #[serde(default = "default_metrics_cache_ttl_seconds")]
    pub metrics_cache_ttl_seconds: u64,

    /// Maximum number of memoized metrics responses.
    #[serde(default = "default_metrics_cache_max_capacity")]
    pub metrics_cache_max_capacity: u64,

    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_openai_api_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_cache_database() -> String {
    "pr_insights.db".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_metrics_cache_ttl_seconds() -> u64 {
    300
}

fn default_metrics_cache_max_capacity() -> u64 {
    100
}

fn default_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }

    pub fn metrics_cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.metrics_cache_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 6] = [
        "GITHUB_TOKEN",
        "OPENAI_API_KEY",
        "GITHUB_WEBHOOK_SECRET",
        "GITHUB_ORG",
        "REQUEST_TIMEOUT_SECONDS",
        "CACHE_DATABASE",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear();
        env::set_var("GITHUB_TOKEN", "ghp_test");
        env::set_var("OPENAI_API_KEY", "sk-test");
        env::set_var("GITHUB_WEBHOOK_SECRET", "hush");
        env::set_var("GITHUB_ORG", "acme");
        env::set_var("REQUEST_TIMEOUT_SECONDS", "5");

        let config = AppConfig::from_env().expect("Failed to load config");

        assert_eq!(config.github_token, "ghp_test");
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.github_webhook_secret, "hush");
        assert_eq!(config.github_org.as_deref(), Some("acme"));
        assert_eq!(config.request_timeout(), StdDuration::from_secs(5));
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.cache_database, "pr_insights.db");

        clear();
    }

    #[test]
    #[serial]
    fn test_config_missing_vars() {
        clear();
        env::set_var("GITHUB_TOKEN", "ghp_test");
        // Webhook secret and AI key are required.
        let result = AppConfig::from_env();
        assert!(result.is_err());
        clear();
    }

    #[test]
    fn test_repo_id_parsing() {
        let id: RepoId = "rust-lang/rust".parse().unwrap();
        assert_eq!(id.owner, "rust-lang");
        assert_eq!(id.repo, "rust");
        assert_eq!(id.to_string(), "rust-lang/rust");

        assert!("rust-lang".parse::<RepoId>().is_err());
        assert!("a/b/c".parse::<RepoId>().is_err());
        assert!("/rust".parse::<RepoId>().is_err());
    }
}
