//! HTTP transport for the GitHub REST API.
//!
//! The [`Transport`] trait is the seam between the ingestion loop and the
//! network. [`GitHubClient`] is the production implementation; tests drive
//! the loop with scripted transports instead.
//!
//! Responses are returned whatever their status. Callers decide whether a
//! payload is usable by parsing it, because the search API reports
//! rate-limit and validation failures as JSON bodies without `items`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use std::borrow::Cow;
use thiserror::Error;

use crate::config::GitHubConfig;

/// A transport-level failure: the request never produced a response body.
#[derive(Debug, Error)]
#[error("GET {url} failed: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

/// Status and decoded body of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests and returns the raw text.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError>;
}

/// Authenticated client for `api.github.com` and `raw.githubusercontent.com`.
///
/// No timeout and no retry: pacing and retry policy belong to the
/// ingestion loop.
pub struct GitHubClient {
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_str(&config.api_version).context("Invalid API version")?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Invalid token value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }

    /// Build a client from config, reading the token from the environment.
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        let token = config.token()?;
        Self::new(config, &token)
    }
}

#[async_trait]
impl Transport for GitHubClient {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError> {
        let fail = |e: reqwest::Error| TransportError {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.http.get(url).send().await.map_err(fail)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(fail)?;

        Ok(RawResponse {
            status,
            body: decode_text(&bytes).into_owned(),
        })
    }
}

/// Decode a response body to UTF-8.
///
/// Valid UTF-8 passes through untouched. Anything else is read as
/// ISO-8859-1, where every byte maps to the code point of the same value,
/// so no input byte is lost.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
