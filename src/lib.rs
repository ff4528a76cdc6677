//! # gh-ingest
//!
//! Pulls GitHub search results (repositories or users) page by page,
//! flattens each item into a fixed row, and upserts it into a SQLite table
//! keyed by the GitHub `id`.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ Transport  │──▶│  Ingestor    │──▶│ Records  │──▶│  SQLite  │
//! │ GitHub GET │   │ pages+pauses │   │ + README │   │  upsert  │
//! └────────────┘   └──────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=...
//! ghi init repositories --table repositories
//! ghi repos Wisconsin --table repositories --since 2015
//! ghi users org:UW-Madison-DSI --table users --dump ./data/users.json
//! ghi repo 592800946 --table repositories
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Table creation per entity kind |
//! | [`store`] | Parameter-bound exists/insert/delete/update/upsert |
//! | [`transport`] | Authenticated GitHub GET and body decoding |
//! | [`search`] | Query strings, date windows, request URLs |
//! | [`models`] | Search pages and typed records |
//! | [`readme`] | README lookup and heuristics |
//! | [`ingest`] | Paginated, rate-limited ingestion loop |
//! | [`export`] | Raw item dumps |

pub mod config;
pub mod db;
pub mod export;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod readme;
pub mod search;
pub mod store;
pub mod transport;
