//! Search payloads and the flat records persisted from them.
//!
//! A search page is parsed loosely: items stay as raw JSON so they can be
//! handed back to the caller untouched, and each one is then deserialized
//! into a typed record. Missing or empty optional fields become `None`;
//! only the `id` is required.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::readme::ReadmeMetrics;
use crate::store::Row;

/// Longest description persisted, in bytes.
pub const DESCRIPTION_MAX_BYTES: usize = 8192;

/// One page of `/search/*` results.
///
/// `items` is required: GitHub error bodies (rate limits, invalid queries)
/// carry a `message` but no `items`, and must not parse as an empty page.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    pub items: Vec<serde_json::Value>,
}

impl SearchPage {
    /// Parse a response body. `None` when the body is not a usable page.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// The two searchable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Repositories,
    Users,
}

impl EntityKind {
    pub fn search_path(self) -> &'static str {
        match self {
            EntityKind::Repositories => "/search/repositories",
            EntityKind::Users => "/search/users",
        }
    }
}

/// A record that can be built from one search item and stored as a row.
pub trait SearchRecord: DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    /// Name logged when the record is saved (`name` or `login`).
    fn label(&self) -> &str;

    /// Stamp the date-window partition. Kinds without a partition column
    /// ignore it.
    fn set_partition(&mut self, _year: i32) {}

    /// `(owner, repo)` whose README feeds the projection, if this kind
    /// uses one.
    fn readme_location(&self) -> Option<(&str, &str)> {
        None
    }

    /// Project to the persisted row.
    fn project(&self, readme: Option<&ReadmeMetrics>) -> Row;
}

/// Treat `""`, `null` and non-string values as absent.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Optional field that reads as `None` when the value has the wrong type.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Owner {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "non_empty")]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct License {
    #[serde(default, deserialize_with = "non_empty")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub name: Option<String>,
}

/// A repository search result, flattened for the repositories table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RepositoryRecord {
    pub id: i64,
    #[serde(default, deserialize_with = "non_empty")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub owner: Option<Owner>,
    #[serde(default, deserialize_with = "non_empty")]
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub stargazers_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub watchers_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub forks_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub open_issues_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub license: Option<License>,
    /// Partition year for date-windowed ingestion. Never sent by GitHub.
    #[serde(skip)]
    pub year: Option<i32>,
}

impl RepositoryRecord {
    pub fn owner_login(&self) -> Option<&str> {
        self.owner.as_ref().and_then(|o| o.login.as_deref())
    }

    /// Project to the persisted column set. README metrics come from a
    /// fetch done by the caller; `None` means no README could be read.
    pub fn to_row(&self, readme: Option<&ReadmeMetrics>) -> Row {
        let license = self.license.as_ref();
        let metrics = readme.copied().unwrap_or_default();

        Row::new()
            .set("id", self.id)
            .set("name", self.name.clone())
            .set("full_name", self.full_name.clone())
            .set("owner_id", self.owner.as_ref().and_then(|o| o.id))
            .set("html_url", self.html_url.clone())
            .set(
                "description",
                self.description
                    .as_deref()
                    .map(|d| clamp_bytes(d, DESCRIPTION_MAX_BYTES).to_string()),
            )
            .set("homepage", self.homepage.clone())
            .set("language", self.language.clone())
            .set("stargazers_count", self.stargazers_count)
            .set("watchers_count", self.watchers_count)
            .set("forks_count", self.forks_count)
            .set("open_issues_count", self.open_issues_count)
            .set("score", self.score)
            .set("license_key", license.and_then(|l| l.key.clone()))
            .set("license_name", license.and_then(|l| l.name.clone()))
            .set("readme_size", readme.map(|m| m.size as i64))
            .set("readme_has_images", metrics.has_images)
            .set("readme_has_icons", metrics.has_icons)
            .set("year", self.year.map(i64::from))
    }
}

impl SearchRecord for RepositoryRecord {
    const KIND: EntityKind = EntityKind::Repositories;

    fn id(&self) -> i64 {
        self.id
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }

    fn set_partition(&mut self, year: i32) {
        self.year = Some(year);
    }

    fn readme_location(&self) -> Option<(&str, &str)> {
        Some((self.owner_login()?, self.name.as_deref()?))
    }

    fn project(&self, readme: Option<&ReadmeMetrics>) -> Row {
        self.to_row(readme)
    }
}

/// A user search result, flattened for the users table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default, deserialize_with = "non_empty")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub html_url: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "non_empty")]
    pub user_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub score: Option<f64>,
}

impl UserRecord {
    pub fn to_row(&self) -> Row {
        Row::new()
            .set("id", self.id)
            .set("login", self.login.clone())
            .set("avatar_url", self.avatar_url.clone())
            .set("html_url", self.html_url.clone())
            .set("type", self.user_type.clone())
            .set("score", self.score)
    }
}

impl SearchRecord for UserRecord {
    const KIND: EntityKind = EntityKind::Users;

    fn id(&self) -> i64 {
        self.id
    }

    fn label(&self) -> &str {
        self.login.as_deref().unwrap_or("(unnamed)")
    }

    fn project(&self, _readme: Option<&ReadmeMetrics>) -> Row {
        self.to_row()
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn clamp_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
