use duckdb::types::ValueRef;
use duckdb::Connection;
use r2d2::Pool;
use std::error::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::db::db_pool::DuckDBConnectionManager;

/// Context text returned when the warehouse has no tables yet.
pub const EMPTY_SCHEMA_CONTEXT: &str = "No tables found in the warehouse.";

const SAMPLE_ROW_LIMIT: usize = 3;

type BoxedError = Box<dyn Error + Send + Sync>;

/// Caches the textual schema description handed to the LLM as grounding.
///
/// The description is rebuilt on demand (`refresh`) or lazily on first use;
/// the admin `/refresh-schema` action forces a rebuild after warehouse
/// tables change.
pub struct SchemaManager {
    pool: Pool<DuckDBConnectionManager>,
    context_cache: RwLock<Option<String>>,
    last_refresh: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl SchemaManager {
    pub fn new(pool: Pool<DuckDBConnectionManager>) -> Self {
        Self {
            pool,
            context_cache: RwLock::new(None),
            last_refresh: RwLock::new(None),
        }
    }

    /// Returns the cached schema context, building it on first use.
    pub async fn context(&self) -> Result<String, BoxedError> {
        if let Some(cached) = self.context_cache.read().await.clone() {
            return Ok(cached);
        }
        self.refresh().await
    }

    /// Rebuilds the schema context from the warehouse and caches it.
    pub async fn refresh(&self) -> Result<String, BoxedError> {
        info!("Refreshing schema context");

        let pool = self.pool.clone();
        let context = tokio::task::spawn_blocking(move || -> Result<String, BoxedError> {
            let conn = pool.get()?;
            build_schema_context(&conn)
        })
        .await??;

        let mut cache = self.context_cache.write().await;
        *cache = Some(context.clone());

        let mut timestamp = self.last_refresh.write().await;
        *timestamp = Some(chrono::Utc::now());

        info!("Schema context refreshed ({} bytes)", context.len());
        Ok(context)
    }

    /// Number of user tables currently visible in the warehouse.
    pub async fn table_count(&self) -> Result<usize, BoxedError> {
        let pool = self.pool.clone();
        let count = tokio::task::spawn_blocking(move || -> Result<usize, BoxedError> {
            let conn = pool.get()?;
            Ok(list_tables(&conn).len())
        })
        .await??;
        Ok(count)
    }
}

/// Builds the markdown-ish schema description: one section per table with
/// its columns and a few sample rows so the model sees real value shapes.
fn build_schema_context(conn: &Connection) -> Result<String, BoxedError> {
    let tables = list_tables(conn);

    if tables.is_empty() {
        return Ok(EMPTY_SCHEMA_CONTEXT.to_string());
    }

    let mut context = String::from("# WAREHOUSE SCHEMA\n\n");

    for table_name in &tables {
        context.push_str(&format!("### Table: {}\n\n", table_name));

        let columns = match table_columns(conn, table_name) {
            Ok(columns) => columns,
            Err(e) => {
                error!("Failed to describe table {}: {}", table_name, e);
                context.push_str("Could not retrieve column information.\n\n");
                continue;
            }
        };

        if columns.is_empty() {
            context.push_str("Table has no columns.\n\n");
            continue;
        }

        context.push_str("| Column | Type | Nullable |\n");
        context.push_str("|--------|------|----------|\n");
        for (name, data_type, nullable) in &columns {
            context.push_str(&format!(
                "| {} | {} | {} |\n",
                name,
                data_type,
                if *nullable { "YES" } else { "NO" }
            ));
        }
        context.push('\n');

        match sample_rows(conn, table_name, &columns) {
            Ok(sample) if !sample.is_empty() => {
                context.push_str("Sample rows:\n\n");
                context.push_str(&sample);
                context.push('\n');
            }
            Ok(_) => {}
            Err(e) => {
                debug!("No sample rows for {}: {}", table_name, e);
            }
        }
    }

    Ok(context)
}

/// Lists user tables, preferring `sqlite_master` with a `SHOW TABLES`
/// fallback since both views exist in DuckDB depending on version.
fn list_tables(conn: &Connection) -> Vec<String> {
    let query = "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'duck_%' AND name NOT LIKE 'pg_%'";

    let mut tables = Vec::new();

    match conn.prepare(query) {
        Ok(mut stmt) => {
            if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(0)) {
                tables.extend(rows.filter_map(Result::ok));
            }
        }
        Err(e) => {
            error!("Error preparing sqlite_master query: {}", e);
        }
    }

    if tables.is_empty() {
        match conn.prepare("SHOW TABLES") {
            Ok(mut stmt) => {
                if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(0)) {
                    tables.extend(rows.filter_map(Result::ok));
                }
            }
            Err(e) => {
                error!("Error preparing SHOW TABLES query: {}", e);
            }
        }
    }

    tables.sort();
    tables
}

/// Column triples (name, type, nullable) for one table.
fn table_columns(
    conn: &Connection,
    table_name: &str,
) -> Result<Vec<(String, String, bool)>, BoxedError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table_name))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,  // name
                row.get::<_, String>(2)?,  // type
                !row.get::<_, bool>(3)?,   // notnull
            ))
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(columns)
}

/// Renders up to `SAMPLE_ROW_LIMIT` rows of a table as a markdown table.
fn sample_rows(
    conn: &Connection,
    table_name: &str,
    columns: &[(String, String, bool)],
) -> Result<String, BoxedError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM \"{}\" LIMIT {}",
        table_name, SAMPLE_ROW_LIMIT
    ))?;

    let mut out = String::new();
    out.push_str("| ");
    for (name, _, _) in columns {
        out.push_str(&format!("{} | ", name));
    }
    out.push_str("\n| ");
    for _ in columns {
        out.push_str("--- | ");
    }
    out.push('\n');

    let mut rows = stmt.query([])?;
    let mut row_count = 0usize;
    while let Some(row) = rows.next()? {
        out.push_str("| ");
        for i in 0..columns.len() {
            let value = match row.get_ref(i) {
                Ok(value_ref) => render_value(value_ref),
                Err(_) => "?".to_string(),
            };
            out.push_str(&format!("{} | ", value));
        }
        out.push('\n');
        row_count += 1;
    }

    if row_count == 0 {
        return Ok(String::new());
    }

    Ok(out)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Boolean(v) => v.to_string(),
        ValueRef::TinyInt(v) => v.to_string(),
        ValueRef::SmallInt(v) => v.to_string(),
        ValueRef::Int(v) => v.to_string(),
        ValueRef::BigInt(v) => v.to_string(),
        ValueRef::UTinyInt(v) => v.to_string(),
        ValueRef::USmallInt(v) => v.to_string(),
        ValueRef::UInt(v) => v.to_string(),
        ValueRef::UBigInt(v) => v.to_string(),
        ValueRef::Float(v) => v.to_string(),
        ValueRef::Double(v) => v.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).to_string(),
        other => format!("{:?}", other),
    }
}
