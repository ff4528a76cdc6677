//! Table creation for the two entity kinds.
//!
//! Tables are named by the caller, so the DDL is assembled with a quoted,
//! validated identifier. Creation is `IF NOT EXISTS`; running it against an
//! existing table is a no-op and never alters its columns.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::EntityKind;
use crate::store::{self, quote_ident};

const REPOSITORY_COLUMNS: &str = r#"
    id INTEGER PRIMARY KEY,
    name TEXT,
    full_name TEXT,
    owner_id INTEGER,
    html_url TEXT,
    description TEXT,
    homepage TEXT,
    language TEXT,
    stargazers_count INTEGER,
    watchers_count INTEGER,
    forks_count INTEGER,
    open_issues_count INTEGER,
    score REAL,
    license_key TEXT,
    license_name TEXT,
    readme_size INTEGER,
    readme_has_images INTEGER NOT NULL DEFAULT 0,
    readme_has_icons INTEGER NOT NULL DEFAULT 0,
    year INTEGER
"#;

const USER_COLUMNS: &str = r#"
    id INTEGER PRIMARY KEY,
    login TEXT,
    avatar_url TEXT,
    html_url TEXT,
    "type" TEXT,
    score REAL
"#;

/// Create `table` with the column set of `kind` if it does not exist yet.
pub async fn create_table(pool: &SqlitePool, kind: EntityKind, table: &str) -> store::Result<()> {
    let columns = match kind {
        EntityKind::Repositories => REPOSITORY_COLUMNS,
        EntityKind::Users => USER_COLUMNS,
    };
    let ddl = format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table)?, columns);
    sqlx::query(&ddl).execute(pool).await?;

    if kind == EntityKind::Repositories {
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}(year)",
            quote_ident(&format!("idx_{}_year", table))?,
            quote_ident(table)?
        );
        sqlx::query(&index).execute(pool).await?;
    }

    tracing::debug!(table, kind = ?kind, "table ready");
    Ok(())
}

/// `ghi init`: open the configured database and create `table`.
pub async fn run_init(config: &Config, kind: EntityKind, table: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let result = create_table(&pool, kind, table).await;
    pool.close().await;
    result?;

    println!("Table {} ready in {}.", table, config.db.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepositoryRecord, UserRecord};
    use crate::store::{SqliteStore, StoreError};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
        sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn repository_table_matches_projection() {
        let pool = memory_pool().await;
        create_table(&pool, EntityKind::Repositories, "repos").await.unwrap();

        let record: RepositoryRecord = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        let row = record.to_row(None);
        let expected: Vec<String> = row.columns().map(str::to_string).collect();
        assert_eq!(column_names(&pool, "repos").await, expected);
    }

    #[tokio::test]
    async fn user_table_matches_projection() {
        let pool = memory_pool().await;
        create_table(&pool, EntityKind::Users, "people").await.unwrap();

        let record: UserRecord = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        let expected: Vec<String> = record.to_row().columns().map(str::to_string).collect();
        assert_eq!(column_names(&pool, "people").await, expected);
    }

    #[tokio::test]
    async fn create_is_idempotent_and_keeps_rows() {
        let pool = memory_pool().await;
        create_table(&pool, EntityKind::Users, "people").await.unwrap();

        let store = SqliteStore::new(pool.clone());
        let record: UserRecord = serde_json::from_str(r#"{"id": 7, "login": "a"}"#).unwrap();
        store.insert("people", &record.to_row()).await.unwrap();

        create_table(&pool, EntityKind::Users, "people").await.unwrap();
        assert_eq!(store.count("people").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hostile_name_rejected() {
        let pool = memory_pool().await;
        let err = create_table(&pool, EntityKind::Users, "x(id);--")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)));
    }
}
