//! # gh-ingest CLI (`ghi`)
//!
//! Fetches GitHub search results and stores them in SQLite.
//!
//! ## Usage
//!
//! ```bash
//! ghi --config ./config/gh-ingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ghi init <kind> --table T` | Create a repositories or users table |
//! | `ghi repos <query> --table T` | Ingest a repository search |
//! | `ghi users <query> --table T` | Ingest a user search |
//! | `ghi repo <id> --table T` | Fetch and upsert one repository |
//!
//! Logs go to stderr and honour `RUST_LOG`; stdout carries only the
//! command summary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gh_ingest::models::EntityKind;
use gh_ingest::{config, ingest, migrate};

/// Ingest GitHub search results into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gh-ingest.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "ghi", version, about = "Ingest GitHub search results into SQLite")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gh-ingest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the table for an entity kind.
    ///
    /// Idempotent: an existing table is left untouched.
    Init {
        kind: Kind,

        /// Table name.
        #[arg(long)]
        table: String,
    },

    /// Search repositories and upsert every result.
    Repos {
        /// GitHub search query, e.g. `Wisconsin` or `org:UW-Madison-DSI`.
        query: String,

        #[arg(long)]
        table: String,

        /// Split the search into yearly creation-date windows from the
        /// current year down to, but excluding, this year.
        #[arg(long)]
        since: Option<i32>,

        /// Also write the raw items to this JSON file.
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Search users and upsert every result.
    Users {
        query: String,

        #[arg(long)]
        table: String,

        /// Also write the raw items to this JSON file.
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Fetch one repository by numeric id and upsert it.
    Repo {
        id: i64,

        #[arg(long)]
        table: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Repositories,
    Users,
}

impl From<Kind> for EntityKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Repositories => EntityKind::Repositories,
            Kind::Users => EntityKind::Users,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gh_ingest=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { kind, table } => {
            migrate::run_init(&cfg, kind.into(), &table).await?;
        }
        Commands::Repos {
            query,
            table,
            since,
            dump,
        } => {
            ingest::run_repos(&cfg, &query, &table, since, dump.as_deref()).await?;
        }
        Commands::Users { query, table, dump } => {
            ingest::run_users(&cfg, &query, &table, dump.as_deref()).await?;
        }
        Commands::Repo { id, table } => {
            ingest::run_repo(&cfg, id, &table).await?;
        }
    }

    Ok(())
}
