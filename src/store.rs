//! Persistence primitives over a single SQLite table keyed by `id`.
//!
//! Rows are ordered column/value lists produced by record projection.
//! Every value is bound as a query parameter. Table and column names
//! cannot be bound, so they are checked against a strict identifier
//! grammar and double-quoted before being spliced into SQL.
//!
//! There are no transactions: [`SqliteStore::upsert`] is an `exists`
//! check, a `delete` and an `insert`, issued one after the other.

use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqlitePool;
use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("table {0} does not exist; create it with `ghi init`")]
    MissingTable(String),

    #[error("row for table {table} has no id")]
    MissingId { table: String },

    #[error("row for table {table} has no columns")]
    EmptyRow { table: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered column/value pairs for one table row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(&'static str, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, replacing an earlier value for the same name.
    pub fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(Value::as_i64)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(c, _)| *c)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.columns.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Whether an upsert created a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Validate and double-quote a table or column name.
pub fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Real(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
    }
}

/// Table-agnostic persistence over one [`SqlitePool`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Test whether any row in `table` has `key_column = key`.
    pub async fn exists(&self, table: &str, key_column: &str, key: &Value) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            quote_ident(table)?,
            quote_ident(key_column)?
        );
        let found = bind_value(sqlx::query(&sql), key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Check that `table` exists, so a run can fail before doing any work.
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        quote_ident(table)?;
        let found = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(StoreError::MissingTable(table.to_string())),
        }
    }

    pub async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        if row.is_empty() {
            return Err(StoreError::EmptyRow {
                table: table.to_string(),
            });
        }

        let columns = row
            .columns()
            .map(quote_ident)
            .collect::<Result<Vec<_>>>()?;
        let placeholders = vec!["?"; row.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table)?,
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Delete the row with the given `id`. Returns the number of rows removed.
    pub async fn delete(&self, table: &str, id: i64) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE \"id\" = ?", quote_ident(table)?);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Overwrite the given columns of the row with `id`. An `id` column in
    /// `row` is ignored. Returns the number of rows changed.
    pub async fn update(&self, table: &str, id: i64, row: &Row) -> Result<u64> {
        let assignments = row
            .columns()
            .filter(|c| *c != "id")
            .map(|c| quote_ident(c).map(|q| format!("{} = ?", q)))
            .collect::<Result<Vec<_>>>()?;
        if assignments.is_empty() {
            return Err(StoreError::EmptyRow {
                table: table.to_string(),
            });
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?",
            quote_ident(table)?,
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (column, value) in row.columns().zip(row.values()) {
            if column != "id" {
                query = bind_value(query, value);
            }
        }
        let result = query.bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Replace-on-conflict: delete any row with the same `id`, then insert.
    pub async fn upsert(&self, table: &str, row: &Row) -> Result<UpsertOutcome> {
        let id = row.id().ok_or_else(|| StoreError::MissingId {
            table: table.to_string(),
        })?;

        let outcome = if self.exists(table, "id", &Value::Integer(id)).await? {
            self.delete(table, id).await?;
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        };

        self.insert(table, row).await?;
        Ok(outcome)
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}
