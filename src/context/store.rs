//! `SQLite` store snapshot.
//!
//! Produces up to three resources describing the configured store: the
//! attached databases, the user tables of `main`, and a few sample rows of
//! the first table with its row count. Any failure collapses into a single
//! `store_error` resource so the chat keeps working without the store.

use std::time::Duration;

use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::models::resource::ContextResource;
use crate::{AppError, Result};

/// Upper bound on waiting for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only view over the configured store.
#[derive(Debug, Clone)]
pub struct StoreInspector {
    pool: SqlitePool,
    url: String,
    sample_rows: u32,
}

impl StoreInspector {
    /// Build an inspector whose pool connects on first use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the URL cannot be parsed.
    pub fn connect_lazy(config: &StoreConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(&config.database_url)?;
        Ok(Self::from_pool(
            pool,
            config.database_url.clone(),
            config.sample_rows,
        ))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool, url: String, sample_rows: u32) -> Self {
        Self {
            pool,
            url,
            sample_rows,
        }
    }

    /// Connection URL this inspector reads from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Snapshot resources; never fails.
    pub async fn snapshot(&self) -> Vec<ContextResource> {
        match self.try_snapshot().await {
            Ok(resources) => resources,
            Err(err) => {
                warn!(url = %self.url, %err, "store snapshot failed");
                vec![ContextResource::new(
                    "store_error",
                    "Store connection status",
                    json!({
                        "status": "disconnected",
                        "error": err.to_string(),
                        "message": format!("Unable to connect to store at {}", self.url),
                    }),
                )]
            }
        }
    }

    async fn try_snapshot(&self) -> Result<Vec<ContextResource>> {
        let mut resources = Vec::with_capacity(3);

        let databases: Vec<(i64, String, String)> = sqlx::query_as("PRAGMA database_list")
            .fetch_all(&self.pool)
            .await?;
        resources.push(ContextResource::new(
            "store_databases",
            "Available store databases",
            json!({
                "databases": databases
                    .iter()
                    .map(|(_, name, file)| json!({ "name": name, "file": file }))
                    .collect::<Vec<_>>()
            }),
        ));

        let tables: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        if tables.is_empty() {
            debug!(url = %self.url, "store has no user tables");
            return Ok(resources);
        }

        resources.push(ContextResource::new(
            "store_tables",
            "Tables in database: main",
            json!({
                "database": "main",
                "tables": tables
                    .iter()
                    .map(|(name, kind)| json!({ "name": name, "type": kind }))
                    .collect::<Vec<_>>()
            }),
        ));

        if let Some((table, _)) = tables.iter().find(|(_, kind)| kind == "table") {
            resources.push(self.sample_table(table).await?);
        }

        Ok(resources)
    }

    async fn sample_table(&self, table: &str) -> Result<ContextResource> {
        let ident = quote_ident(table);

        let rows: Vec<SqliteRow> = sqlx::query(&format!("SELECT * FROM {ident} LIMIT ?1"))
            .bind(i64::from(self.sample_rows))
            .fetch_all(&self.pool)
            .await?;
        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {ident}"))
            .fetch_one(&self.pool)
            .await?;

        Ok(ContextResource::new(
            "store_sample_data",
            format!("Sample rows from {table} table"),
            json!({
                "table": table,
                "sample_rows": rows.iter().map(row_to_json).collect::<Vec<_>>(),
                "row_count": row_count,
            }),
        ))
    }
}

/// Quote an identifier for interpolation into SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a row of unknown shape into a JSON object keyed by column name.
fn row_to_json(row: &SqliteRow) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_owned(), cell_to_json(row, idx));
    }
    Value::Object(object)
}

fn cell_to_json(row: &SqliteRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_owned(),
        Err(_) => return Value::Null,
    };

    let decoded = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(idx).map(Value::from),
        "REAL" => row.try_get::<f64, _>(idx).map(Value::from),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::from(format!("<{} bytes>", bytes.len()))),
        _ => row.try_get::<String, _>(idx).map(Value::from),
    };

    decoded.unwrap_or(Value::Null)
}

/// Map a store failure into the `/api/store-status` error text.
#[must_use]
pub fn describe_store_error(err: &AppError) -> String {
    match err {
        AppError::Db(msg) => msg.clone(),
        other => other.to_string(),
    }
}
