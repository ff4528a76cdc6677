//! TOML configuration for `ghi`.
//!
//! Every section except `[db]` is optional and falls back to the values
//! the GitHub search API expects. The API token itself never lives in the
//! file: `github.token_env` names the environment variable to read it from.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_content_url")]
    pub content_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Page size sent as `per_page`. Left to the server default when unset.
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            content_url: default_content_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            token_env: default_token_env(),
            per_page: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_content_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_api_version() -> String {
    "2022-11-28".to_string()
}
fn default_user_agent() -> String {
    "curl/7.54.1".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_page_attempts")]
    pub max_page_attempts: u32,
    #[serde(default = "default_readme_branches")]
    pub readme_branches: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_page_attempts: default_max_page_attempts(),
            readme_branches: default_readme_branches(),
        }
    }
}

impl IngestConfig {
    /// Fixed pause taken between consecutive search requests.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// 30 requests per minute on the search endpoint.
fn default_delay_ms() -> u64 {
    2000
}
fn default_max_page_attempts() -> u32 {
    3
}
fn default_readme_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

impl GitHubConfig {
    /// Read the API token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("{} environment variable not set", self.token_env))?;
        if token.trim().is_empty() {
            anyhow::bail!("{} environment variable is empty", self.token_env);
        }
        Ok(token)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.max_page_attempts == 0 {
        anyhow::bail!("ingest.max_page_attempts must be >= 1");
    }

    if config.ingest.readme_branches.is_empty() {
        anyhow::bail!("ingest.readme_branches must name at least one branch");
    }

    if let Some(per_page) = config.github.per_page {
        // The search API caps pages at 100 items.
        if !(1..=100).contains(&per_page) {
            anyhow::bail!("github.per_page must be in [1, 100], got {}", per_page);
        }
    }

    for (key, url) in [
        ("github.api_url", &config.github.api_url),
        ("github.content_url", &config.github.content_url),
    ] {
        reqwest::Url::parse(url).with_context(|| format!("{} is not a valid URL: {}", key, url))?;
    }

    Ok(())
}
