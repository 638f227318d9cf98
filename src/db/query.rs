use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use r2d2::Pool;
use regex::Regex;
use std::error::Error;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::db::db_pool::DuckDBConnectionManager;

#[derive(Debug)]
pub enum QueryError {
    PoolError(String),
    SqlError(String),
    Rejected(String),
    TaskError(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::PoolError(msg) => write!(f, "Connection pool error: {}", msg),
            QueryError::SqlError(msg) => write!(f, "SQL error: {}", msg),
            QueryError::Rejected(msg) => write!(f, "Query rejected: {}", msg),
            QueryError::TaskError(msg) => write!(f, "Query task error: {}", msg),
        }
    }
}

impl Error for QueryError {}

/// Result of one warehouse query, kept as Arrow batches so the analyzer
/// and chart renderer can work column-wise without another copy.
pub struct QueryResult {
    pub columns: Vec<String>,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// Strips decoration the model tends to leave around generated SQL.
pub fn sanitize_sql(raw: &str) -> String {
    let cleaned = raw.replace('`', "");
    cleaned.trim().to_string()
}

/// Only plain read queries reach the warehouse. Rejects DML/DDL and
/// anything that smells like a second statement.
pub fn ensure_read_only(sql: &str) -> Result<(), QueryError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();

    if trimmed.is_empty() {
        return Err(QueryError::Rejected("empty statement".to_string()));
    }

    if trimmed.contains(';') {
        return Err(QueryError::Rejected(
            "multiple statements are not allowed".to_string(),
        ));
    }

    let read_only = Regex::new(r"(?i)^(select|with)\b").expect("static regex");
    if !read_only.is_match(trimmed) {
        return Err(QueryError::Rejected(
            "only SELECT queries are allowed".to_string(),
        ));
    }

    Ok(())
}

/// Executes a read query on a pooled connection inside `spawn_blocking`
/// and collects the Arrow result batches.
pub async fn run_query(
    pool: Pool<DuckDBConnectionManager>,
    sql: String,
) -> Result<QueryResult, QueryError> {
    ensure_read_only(&sql)?;
    debug!("Executing warehouse query: {}", sql);

    let result = tokio::task::spawn_blocking(move || -> Result<QueryResult, QueryError> {
        let start_time = Instant::now();

        let conn = pool
            .get()
            .map_err(|e| QueryError::PoolError(e.to_string()))?;

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QueryError::SqlError(e.to_string()))?;

        let arrow_batch = stmt
            .query_arrow([])
            .map_err(|e| QueryError::SqlError(e.to_string()))?;

        let schema = arrow_batch.get_schema();

        let columns = schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<String>>();

        let batches = arrow_batch.collect::<Vec<RecordBatch>>();
        let row_count: usize = batches.iter().map(|batch| batch.num_rows()).sum();

        Ok(QueryResult {
            columns,
            schema,
            batches,
            row_count,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    })
    .await
    .map_err(|e| QueryError::TaskError(e.to_string()))??;

    info!(
        "Query returned {} rows across {} columns in {}ms",
        result.row_count,
        result.columns.len(),
        result.execution_time_ms
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_pool() -> Pool<DuckDBConnectionManager> {
        let manager = DuckDBConnectionManager::new(":memory:".to_string());
        Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("pool should build")
    }

    #[test]
    fn sanitize_strips_backticks() {
        assert_eq!(sanitize_sql("`select` * from `t`  "), "select * from t");
    }

    #[test]
    fn read_only_accepts_select_and_cte() {
        assert!(ensure_read_only("SELECT 1").is_ok());
        assert!(ensure_read_only("  with x as (select 1) select * from x;").is_ok());
    }

    #[test]
    fn read_only_rejects_mutations() {
        assert!(ensure_read_only("DROP TABLE users").is_err());
        assert!(ensure_read_only("INSERT INTO t VALUES (1)").is_err());
        assert!(ensure_read_only("SELECT 1; DELETE FROM t").is_err());
        assert!(ensure_read_only("   ").is_err());
    }

    #[tokio::test]
    async fn run_query_collects_rows() {
        let pool = memory_pool();
        {
            let conn = pool.get().expect("connection");
            conn.execute_batch(
                "CREATE TABLE orders (region VARCHAR, amount DOUBLE);
                 INSERT INTO orders VALUES ('north', 10.0), ('south', 32.5), ('north', 7.5);",
            )
            .expect("seed data");
        }

        let result = run_query(pool, "SELECT region, amount FROM orders".to_string())
            .await
            .expect("query should succeed");

        assert_eq!(result.row_count, 3);
        assert_eq!(result.columns, vec!["region", "amount"]);
        assert_eq!(result.schema.fields().len(), 2);
    }

    #[tokio::test]
    async fn run_query_surfaces_sql_errors() {
        let pool = memory_pool();
        let err = run_query(pool, "SELECT * FROM missing_table".to_string())
            .await
            .expect_err("query should fail");
        assert!(matches!(err, QueryError::SqlError(_)));
    }
}
