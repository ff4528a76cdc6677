//! Paginated, rate-limited search ingestion.
//!
//! Coordinates the full flow for one query: discovery request → page
//! requests until the running item count reaches `total_count` → each
//! item converted to a record, projected, and upserted → fixed pause
//! between requests.
//!
//! Everything is sequential. Page N is fetched and all of its items are
//! persisted before page N+1 is requested.
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Discovery request unusable | [`IngestError::Discovery`], nothing persisted |
//! | Page request unusable | retried after the pause, up to `max_page_attempts` |
//! | Page still unusable | [`IngestError::PageExhausted`] carrying the earlier pages' outcome |
//! | Target table missing | [`StoreError::MissingTable`] before any request |
//! | Item without an `id` | skipped and counted |
//! | Upsert fails | logged, counted in [`IngestReport::records_failed`], batch continues |
//! | One year of a windowed run fails | logged, recorded, remaining years run |

use chrono::Datelike;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::db;
use crate::export;
use crate::models::{clamp_bytes, RepositoryRecord, SearchPage, SearchRecord, UserRecord};
use crate::readme::{fetch_readme, ReadmeMetrics};
use crate::search::{window_years, DateWindow, SearchQuery};
use crate::store::{Row, SqliteStore, StoreError, UpsertOutcome};
use crate::transport::{GitHubClient, Transport};

/// Longest slice of an unusable payload echoed into the log.
const LOGGED_PAYLOAD_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no usable search payload for query {query:?}")]
    Discovery { query: String },

    #[error("page {page} of query {query:?} had no usable payload after {attempts} attempts")]
    PageExhausted {
        query: String,
        page: u32,
        attempts: u32,
        /// Pages fetched and persisted before the failing one.
        partial: Box<IngestOutcome>,
    },

    #[error("repository {id} could not be fetched")]
    RepositoryNotFound { id: i64 },

    #[error("invalid search endpoint: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Take the work completed before a page ran out of attempts.
    pub fn take_partial(&mut self) -> Option<IngestOutcome> {
        match self {
            IngestError::PageExhausted { partial, .. } => Some(std::mem::take(partial.as_mut())),
            _ => None,
        }
    }
}

/// Knobs for one ingestion run, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub api_url: String,
    pub content_url: String,
    pub per_page: Option<u32>,
    pub delay: Duration,
    pub max_page_attempts: u32,
    pub readme_branches: Vec<String>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_url: config.github.api_url.clone(),
            content_url: config.github.content_url.clone(),
            per_page: config.github.per_page,
            delay: config.ingest.delay(),
            max_page_attempts: config.ingest.max_page_attempts,
            readme_branches: config.ingest.readme_branches.clone(),
        }
    }
}

/// Counters accumulated over one query (or over every year of a windowed run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Sum of the discovery `total_count` of every query run.
    pub total_count: u64,
    /// Every search request issued, discovery and retries included.
    pub requests: u64,
    /// Pages that returned a usable payload.
    pub pages_fetched: u64,
    pub records_persisted: u64,
    /// Subset of `records_persisted` that replaced an existing row.
    pub records_replaced: u64,
    pub records_failed: u64,
    pub items_skipped: u64,
    pub pauses: u64,
    /// Years whose windowed query failed.
    pub failed_partitions: Vec<i32>,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.total_count += other.total_count;
        self.requests += other.requests;
        self.pages_fetched += other.pages_fetched;
        self.records_persisted += other.records_persisted;
        self.records_replaced += other.records_replaced;
        self.records_failed += other.records_failed;
        self.items_skipped += other.items_skipped;
        self.pauses += other.pauses;
        self.failed_partitions.extend(other.failed_partitions);
    }
}

/// Raw items in the order they were fetched, plus the run's counters.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub items: Vec<serde_json::Value>,
    pub report: IngestReport,
}

impl IngestOutcome {
    fn absorb(&mut self, other: IngestOutcome) {
        self.items.extend(other.items);
        self.report.absorb(other.report);
    }
}

/// Drives search queries through a [`Transport`] into a [`SqliteStore`].
pub struct Ingestor<'a> {
    transport: &'a dyn Transport,
    store: &'a SqliteStore,
    settings: IngestSettings,
}

impl<'a> Ingestor<'a> {
    pub fn new(transport: &'a dyn Transport, store: &'a SqliteStore, settings: IngestSettings) -> Self {
        Self {
            transport,
            store,
            settings,
        }
    }

    /// Fetch every page of `query` and upsert each item into `table`.
    ///
    /// `partition` is stamped onto every record (repositories store it in
    /// `year`; users ignore it).
    pub async fn ingest<R: SearchRecord>(
        &self,
        query: &SearchQuery,
        table: &str,
        partition: Option<i32>,
    ) -> Result<IngestOutcome, IngestError> {
        self.store.ensure_table(table).await?;

        let mut outcome = IngestOutcome::default();
        let report = &mut outcome.report;
        let q = query.q();

        let discovery_url = self.search_url::<R>(query, None)?;
        report.requests += 1;
        let total = match self.fetch_page(&discovery_url).await {
            Ok(page) => page.total_count,
            Err(payload) => {
                tracing::error!(query = %q, payload = %payload, "No data received.");
                return Err(IngestError::Discovery { query: q });
            }
        };
        tracing::info!(query = %q, "Total count = {}", total);
        report.total_count = total;

        let mut count: u64 = 0;
        let mut page_no: u32 = 1;
        let mut attempts: u32 = 0;

        while count < total {
            let url = self.search_url::<R>(query, Some(page_no))?;
            report.requests += 1;

            let page = match self.fetch_page(&url).await {
                Ok(page) => page,
                Err(payload) => {
                    attempts += 1;
                    tracing::warn!(
                        query = %q,
                        page = page_no,
                        attempt = attempts,
                        payload = %payload,
                        "Error - no data received."
                    );
                    if attempts >= self.settings.max_page_attempts {
                        return Err(IngestError::PageExhausted {
                            query: q,
                            page: page_no,
                            attempts,
                            partial: Box::new(outcome),
                        });
                    }
                    self.pause(report).await;
                    continue;
                }
            };
            attempts = 0;
            report.pages_fetched += 1;

            if page.total_count != total {
                tracing::warn!(
                    query = %q,
                    page = page_no,
                    discovered = total,
                    reported = page.total_count,
                    "total_count changed between pages"
                );
            }

            if page.items.is_empty() {
                tracing::warn!(
                    query = %q,
                    page = page_no,
                    "empty page after {} of {} items; stopping",
                    count,
                    total
                );
                break;
            }

            for item in &page.items {
                self.persist_item::<R>(item, table, partition, report).await;
            }

            count += page.items.len() as u64;
            outcome.items.extend(page.items);
            page_no += 1;

            self.pause(report).await;
        }

        Ok(outcome)
    }

    /// Split a repository query into yearly creation-date windows, from the
    /// current year down to (not including) `start_year`.
    pub async fn ingest_since(
        &self,
        query: &str,
        table: &str,
        start_year: i32,
    ) -> Result<IngestOutcome, IngestError> {
        let current_year = chrono::Local::now().year();
        self.ingest_years(query, table, start_year, current_year).await
    }

    /// [`ingest_since`](Self::ingest_since) with an explicit current year.
    pub async fn ingest_years(
        &self,
        query: &str,
        table: &str,
        start_year: i32,
        current_year: i32,
    ) -> Result<IngestOutcome, IngestError> {
        self.store.ensure_table(table).await?;

        let mut outcome = IngestOutcome::default();

        for year in window_years(start_year, current_year) {
            let window = DateWindow::year(year);
            tracing::info!(
                "Fetching items from {} to {}",
                window.start_date(),
                window.end_date()
            );

            let windowed = SearchQuery::windowed(query, window);
            match self
                .ingest::<RepositoryRecord>(&windowed, table, Some(year))
                .await
            {
                Ok(year_outcome) => outcome.absorb(year_outcome),
                Err(mut e) => {
                    tracing::error!(year, error = %e, "windowed query failed; continuing");
                    if let Some(partial) = e.take_partial() {
                        outcome.absorb(partial);
                    }
                    outcome.report.failed_partitions.push(year);
                }
            }

            self.pause(&mut outcome.report).await;
        }

        Ok(outcome)
    }

    /// Fetch one repository by id from `/repositories/{id}` and upsert it.
    pub async fn fetch_repository(
        &self,
        id: i64,
        table: &str,
    ) -> Result<(RepositoryRecord, UpsertOutcome), IngestError> {
        self.store.ensure_table(table).await?;

        let url = format!(
            "{}/repositories/{}",
            self.settings.api_url.trim_end_matches('/'),
            id
        );

        let record = match self.transport.get(&url).await {
            Ok(response) if response.is_success() => {
                serde_json::from_str::<RepositoryRecord>(&response.body).ok()
            }
            Ok(response) => {
                tracing::error!(
                    url = %url,
                    status = response.status,
                    payload = %clamp_bytes(&response.body, LOGGED_PAYLOAD_BYTES),
                    "Error - could not fetch model"
                );
                None
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Error - could not fetch model");
                None
            }
        };
        let record = record.ok_or(IngestError::RepositoryNotFound { id })?;

        tracing::info!("Saving {}", record.label());
        let row = self.project(&record).await;
        let outcome = self.store.upsert(table, &row).await?;
        Ok((record, outcome))
    }

    /// Project a record to its row, fetching the README first when the
    /// record kind uses one.
    pub async fn project<R: SearchRecord>(&self, record: &R) -> Row {
        let metrics = match record.readme_location() {
            Some((owner, repo)) => fetch_readme(
                self.transport,
                &self.settings.content_url,
                owner,
                repo,
                &self.settings.readme_branches,
            )
            .await
            .map(|body| ReadmeMetrics::from_body(&body)),
            None => None,
        };
        record.project(metrics.as_ref())
    }

    async fn persist_item<R: SearchRecord>(
        &self,
        item: &serde_json::Value,
        table: &str,
        partition: Option<i32>,
        report: &mut IngestReport,
    ) {
        let mut record = match R::deserialize(item) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "skipping search item without usable attributes");
                report.items_skipped += 1;
                return;
            }
        };
        if let Some(year) = partition {
            record.set_partition(year);
        }

        tracing::info!("Saving {}", record.label());
        let row = self.project(&record).await;

        match self.store.upsert(table, &row).await {
            Ok(UpsertOutcome::Inserted) => report.records_persisted += 1,
            Ok(UpsertOutcome::Replaced) => {
                report.records_persisted += 1;
                report.records_replaced += 1;
            }
            Err(e) => {
                tracing::error!(id = record.id(), table, error = %e, "failed to persist record");
                report.records_failed += 1;
            }
        }
    }

    fn search_url<R: SearchRecord>(
        &self,
        query: &SearchQuery,
        page: Option<u32>,
    ) -> Result<String, IngestError> {
        query
            .url(&self.settings.api_url, R::KIND, self.settings.per_page, page)
            .map_err(|e| IngestError::Endpoint(e.to_string()))
    }

    /// GET and parse one search page. `Err` carries the payload (or the
    /// transport error) for logging.
    async fn fetch_page(&self, url: &str) -> Result<SearchPage, String> {
        match self.transport.get(url).await {
            Ok(response) => SearchPage::parse(&response.body).ok_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    response.status,
                    clamp_bytes(&response.body, LOGGED_PAYLOAD_BYTES)
                )
            }),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn pause(&self, report: &mut IngestReport) {
        report.pauses += 1;
        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }
    }
}

/// `ghi repos`: search repositories and upsert them into `table`.
///
/// With `since`, the query is split into yearly windows after `since`.
pub async fn run_repos(
    config: &Config,
    query: &str,
    table: &str,
    since: Option<i32>,
    dump: Option<&Path>,
) -> anyhow::Result<()> {
    let client = GitHubClient::from_config(&config.github)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let ingestor = Ingestor::new(&client, &store, IngestSettings::from_config(config));

    let result = match since {
        Some(start_year) => ingestor.ingest_since(query, table, start_year).await,
        None => {
            ingestor
                .ingest::<RepositoryRecord>(&SearchQuery::new(query), table, None)
                .await
        }
    };
    pool.close().await;

    finish("repos", query, result, dump)
}

/// `ghi users`: search users and upsert them into `table`.
pub async fn run_users(
    config: &Config,
    query: &str,
    table: &str,
    dump: Option<&Path>,
) -> anyhow::Result<()> {
    let client = GitHubClient::from_config(&config.github)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let ingestor = Ingestor::new(&client, &store, IngestSettings::from_config(config));

    let result = ingestor
        .ingest::<UserRecord>(&SearchQuery::new(query), table, None)
        .await;
    pool.close().await;

    finish("users", query, result, dump)
}

/// `ghi repo`: fetch one repository by id and upsert it into `table`.
pub async fn run_repo(config: &Config, id: i64, table: &str) -> anyhow::Result<()> {
    let client = GitHubClient::from_config(&config.github)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let ingestor = Ingestor::new(&client, &store, IngestSettings::from_config(config));

    let result = ingestor.fetch_repository(id, table).await;
    pool.close().await;
    let (record, outcome) = result?;

    println!("repo {}", id);
    println!("  name: {}", record.full_name.as_deref().unwrap_or(record.label()));
    match outcome {
        UpsertOutcome::Inserted => println!("  inserted into: {}", table),
        UpsertOutcome::Replaced => println!("  replaced in: {}", table),
    }
    println!("ok");
    Ok(())
}

/// Dump and summarize whatever was ingested. A run cut short by an
/// exhausted page still reports its earlier pages, then fails.
fn finish(
    command: &str,
    query: &str,
    result: Result<IngestOutcome, IngestError>,
    dump: Option<&Path>,
) -> anyhow::Result<()> {
    let (outcome, failure) = match result {
        Ok(outcome) => (outcome, None),
        Err(mut e) => match e.take_partial() {
            Some(partial) => (partial, Some(e)),
            None => return Err(e.into()),
        },
    };

    if let Some(path) = dump {
        export::write_items(path, &outcome.items)?;
    }

    print_summary(command, query, &outcome.report, failure.is_none());
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_summary(command: &str, query: &str, report: &IngestReport, complete: bool) {
    println!("{} {:?}", command, query);
    println!("  total count: {}", report.total_count);
    println!("  requests: {}", report.requests);
    println!("  pages fetched: {}", report.pages_fetched);
    println!("  records persisted: {}", report.records_persisted);
    println!("  records replaced: {}", report.records_replaced);
    if report.records_failed > 0 {
        println!("  records failed: {}", report.records_failed);
    }
    if report.items_skipped > 0 {
        println!("  items skipped: {}", report.items_skipped);
    }
    if !report.failed_partitions.is_empty() {
        let years: Vec<String> = report.failed_partitions.iter().map(|y| y.to_string()).collect();
        println!("  failed years: {}", years.join(", "));
    }
    if complete {
        println!("ok");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RawResponse, TransportError};
    use async_trait::async_trait;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies to search requests from a queue; README requests get 404.
    struct Scripted {
        replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        search_urls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                search_urls: Mutex::new(Vec::new()),
            }
        }

        fn search_urls(&self) -> Vec<String> {
            self.search_urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            if url.ends_with("README.md") {
                return Ok(RawResponse {
                    status: 404,
                    body: "404: Not Found".to_string(),
                });
            }
            self.search_urls.lock().unwrap().push(url.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request {}", url))
        }
    }

    fn ok(body: serde_json::Value) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn users_page(total: u64, ids: std::ops::Range<i64>) -> Result<RawResponse, TransportError> {
        let items: Vec<_> = ids
            .map(|id| json!({ "id": id, "login": format!("user{}", id), "type": "User", "score": 1.0 }))
            .collect();
        ok(json!({ "total_count": total, "incomplete_results": false, "items": items }))
    }

    fn settings() -> IngestSettings {
        IngestSettings {
            api_url: "https://api.test".to_string(),
            content_url: "https://raw.test".to_string(),
            per_page: None,
            delay: Duration::ZERO,
            max_page_attempts: 3,
            readme_branches: vec!["main".to_string(), "master".to_string()],
        }
    }

    async fn users_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::create_table(&pool, crate::models::EntityKind::Users, "users")
            .await
            .unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn zero_total_fetches_no_pages() {
        let transport = Scripted::new(vec![users_page(0, 0..0)]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("nobody"), "users", None)
            .await
            .unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.report.requests, 1);
        assert_eq!(outcome.report.pauses, 0);
        assert_eq!(store.count("users").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fifty_five_items_in_pages_of_thirty() {
        let transport = Scripted::new(vec![
            users_page(55, 0..30),
            users_page(55, 0..30),
            users_page(55, 30..55),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("Wisconsin"), "users", None)
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 55);
        assert_eq!(outcome.report.total_count, 55);
        assert_eq!(outcome.report.pages_fetched, 2);
        assert_eq!(outcome.report.requests, 3);
        assert_eq!(outcome.report.records_persisted, 55);
        assert_eq!(outcome.report.pauses, 2);
        assert_eq!(store.count("users").await.unwrap(), 55);

        let urls = transport.search_urls();
        assert!(!urls[0].contains("page="));
        assert!(urls[1].ends_with("&page=1"));
        assert!(urls[2].ends_with("&page=2"));
    }

    #[tokio::test]
    async fn unusable_discovery_aborts() {
        let transport = Scripted::new(vec![Ok(RawResponse {
            status: 403,
            body: r#"{"message":"API rate limit exceeded"}"#.to_string(),
        })]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let err = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("Wisconsin"), "users", None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Discovery { .. }));
        assert_eq!(transport.search_urls().len(), 1);
    }

    #[tokio::test]
    async fn failing_page_is_retried_then_succeeds() {
        let transport = Scripted::new(vec![
            users_page(2, 0..2),
            Err(TransportError {
                url: "page".to_string(),
                message: "connection reset".to_string(),
            }),
            users_page(2, 0..2),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap();

        let urls = transport.search_urls();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[1], urls[2]);
        assert_eq!(outcome.report.records_persisted, 2);
        assert_eq!(outcome.report.pauses, 2);
    }

    #[tokio::test]
    async fn persistent_page_failure_is_bounded() {
        let garbage = || {
            Ok(RawResponse {
                status: 502,
                body: "<html>Bad Gateway</html>".to_string(),
            })
        };
        let transport = Scripted::new(vec![users_page(90, 0..30), garbage(), garbage(), garbage()]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let err = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap_err();

        match err {
            IngestError::PageExhausted { page, attempts, .. } => {
                assert_eq!(page, 1);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(transport.search_urls().len(), 4);
    }

    #[tokio::test]
    async fn exhausted_page_keeps_earlier_pages() {
        let garbage = || {
            Ok(RawResponse {
                status: 422,
                body: r#"{"message":"Only the first 1000 search results are available"}"#.to_string(),
            })
        };
        let transport = Scripted::new(vec![
            users_page(60, 0..0),
            users_page(60, 0..30),
            garbage(),
            garbage(),
            garbage(),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let mut err = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::PageExhausted { page: 2, .. }));
        let partial = err.take_partial().unwrap();
        assert_eq!(partial.items.len(), 30);
        assert_eq!(partial.report.records_persisted, 30);
        assert_eq!(partial.report.pages_fetched, 1);
        assert_eq!(store.count("users").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn empty_page_short_of_total_stops() {
        let transport = Scripted::new(vec![
            users_page(1500, 0..0),
            users_page(1500, 0..30),
            users_page(1500, 0..0),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 30);
        assert_eq!(outcome.report.pages_fetched, 2);
    }

    #[tokio::test]
    async fn item_without_id_is_skipped() {
        let transport = Scripted::new(vec![
            ok(json!({ "total_count": 2, "items": [] })),
            ok(json!({ "total_count": 2, "items": [{ "login": "ghost" }, { "id": 9, "login": "real" }] })),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.report.items_skipped, 1);
        assert_eq!(outcome.report.records_persisted, 1);
        assert_eq!(store.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_stop_the_batch() {
        let transport = Scripted::new(vec![users_page(3, 0..0), users_page(3, 0..3)]);
        let store = users_store().await;
        // A trigger makes exactly one insert fail.
        sqlx::query(
            "CREATE TRIGGER reject_one BEFORE INSERT ON users WHEN NEW.id = 1 \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap();

        assert_eq!(outcome.report.records_failed, 1);
        assert_eq!(outcome.report.records_persisted, 2);
        assert_eq!(store.count("users").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_table_name_rejected_before_any_request() {
        let transport = Scripted::new(vec![]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let err = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users; DROP TABLE users", None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::InvalidIdentifier(_))));
        assert!(transport.search_urls().is_empty());
    }

    #[tokio::test]
    async fn missing_table_fails_before_any_request() {
        let transport = Scripted::new(vec![]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let err = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "never_created", None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::MissingTable(_))));

        let err = ingestor.fetch_repository(1, "never_created").await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::MissingTable(_))));

        assert!(transport.search_urls().is_empty());
    }

    #[tokio::test]
    async fn wrong_typed_fields_are_stored_as_null() {
        let transport = Scripted::new(vec![
            users_page(1, 0..0),
            ok(json!({
                "total_count": 1,
                "items": [{ "id": 5, "login": "bucky", "avatar_url": 3, "score": "1.0" }]
            })),
        ]);
        let store = users_store().await;
        let ingestor = Ingestor::new(&transport, &store, settings());

        let outcome = ingestor
            .ingest::<UserRecord>(&SearchQuery::new("q"), "users", None)
            .await
            .unwrap();

        assert_eq!(outcome.report.items_skipped, 0);
        assert_eq!(outcome.report.records_persisted, 1);
        let avatar: Option<String> = sqlx::query_scalar("SELECT avatar_url FROM users WHERE id = 5")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(avatar, None);
    }

    #[test]
    fn report_absorb_sums_counters() {
        let mut a = IngestReport {
            total_count: 10,
            requests: 2,
            records_persisted: 10,
            pauses: 1,
            ..Default::default()
        };
        a.absorb(IngestReport {
            total_count: 5,
            requests: 2,
            records_persisted: 5,
            pauses: 1,
            failed_partitions: vec![2019],
            ..Default::default()
        });
        assert_eq!(a.total_count, 15);
        assert_eq!(a.requests, 4);
        assert_eq!(a.records_persisted, 15);
        assert_eq!(a.pauses, 2);
        assert_eq!(a.failed_partitions, vec![2019]);
    }
}
