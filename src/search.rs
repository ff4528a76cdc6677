//! Search query construction.
//!
//! A [`SearchQuery`] is the provider query string plus an optional
//! creation-date window. Windows split a broad query into yearly slices,
//! each small enough to enumerate under the search API's result ceiling.

use anyhow::{Context, Result};
use reqwest::Url;

use crate::models::EntityKind;

/// A creation-date window `[start_year-01-01 .. end_year-01-01]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start_year: i32,
    pub end_year: i32,
}

impl DateWindow {
    /// The window covering one calendar year.
    pub fn year(year: i32) -> Self {
        Self {
            start_year: year,
            end_year: year + 1,
        }
    }

    pub fn start_date(&self) -> String {
        format!("{}-01-01", self.start_year)
    }

    pub fn end_date(&self) -> String {
        format!("{}-01-01", self.end_year)
    }

    fn qualifier(&self) -> String {
        format!("created:{}..{}", self.start_date(), self.end_date())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub window: Option<DateWindow>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            window: None,
        }
    }

    pub fn windowed(query: impl Into<String>, window: DateWindow) -> Self {
        Self {
            query: query.into(),
            window: Some(window),
        }
    }

    /// The `q` parameter as sent to the provider.
    pub fn q(&self) -> String {
        match &self.window {
            Some(w) => format!("{} {}", self.query, w.qualifier()),
            None => self.query.clone(),
        }
    }

    /// Full request URL. `page = None` is the discovery request.
    pub fn url(
        &self,
        api_url: &str,
        kind: EntityKind,
        per_page: Option<u32>,
        page: Option<u32>,
    ) -> Result<String> {
        let base = format!("{}{}", api_url.trim_end_matches('/'), kind.search_path());
        let mut url =
            Url::parse(&base).with_context(|| format!("Invalid search endpoint: {}", base))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &self.q());
            if let Some(n) = per_page {
                pairs.append_pair("per_page", &n.to_string());
            }
            if let Some(p) = page {
                pairs.append_pair("page", &p.to_string());
            }
        }
        Ok(url.to_string())
    }
}

/// Years walked by a windowed ingestion: `current_year` down to, but not
/// including, `start_year`.
pub fn window_years(start_year: i32, current_year: i32) -> impl Iterator<Item = i32> {
    ((start_year + 1)..=current_year).rev()
}
