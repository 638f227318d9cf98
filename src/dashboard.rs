use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::warn;

use crate::analyze::{self, TableSummary};
use crate::viz;
use crate::viz::render::render_chart;

/// One named chart, rendered server-side and inlined as base64 PNG.
#[derive(Debug, Serialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct QueryInfo {
    pub sql: String,
    pub execution_time: chrono::DateTime<chrono::Utc>,
}

/// The aggregate response object for one question: SQL text, summary
/// statistics, and the chart list.
#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub title: String,
    pub summary: TableSummary,
    pub visualizations: Vec<Visualization>,
    pub query_info: QueryInfo,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Builds the dashboard for one query result. Chart renders that fail
/// are logged and skipped; the dashboard itself never fails.
pub fn build(title: &str, sql: &str, schema: &SchemaRef, batches: &[RecordBatch]) -> Dashboard {
    let summary = analyze::summarize(schema, batches);
    let specs = viz::recommend(schema, batches);

    let mut visualizations = Vec::new();
    for spec in &specs {
        match render_chart(spec, schema, batches) {
            Ok(image) => visualizations.push(Visualization {
                kind: spec.kind.as_str().to_string(),
                title: spec.title.clone(),
                image,
            }),
            Err(e) => {
                warn!("Skipping chart '{}': {}", spec.title, e);
            }
        }
    }

    Dashboard {
        title: title.to_string(),
        summary,
        visualizations,
        query_info: QueryInfo {
            sql: sql.to_string(),
            execution_time: chrono::Utc::now(),
        },
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn build_assembles_summary_and_query_info() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, true),
            Field::new("amount", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["north", "south"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
            ],
        )
        .expect("batch");

        let dashboard = build(
            "Analysis for: sales by region",
            "SELECT region, amount FROM sales",
            &schema,
            &[batch],
        );

        assert_eq!(dashboard.title, "Analysis for: sales by region");
        assert_eq!(dashboard.summary.row_count, 2);
        assert_eq!(dashboard.query_info.sql, "SELECT region, amount FROM sales");
    }

    #[test]
    fn visualization_serializes_with_type_key() {
        let viz = Visualization {
            kind: "bar".to_string(),
            title: "Sales".to_string(),
            image: "aGVsbG8=".to_string(),
        };
        let value = serde_json::to_value(&viz).expect("serialize");
        assert_eq!(value["type"], "bar");
        assert_eq!(value["title"], "Sales");
    }
}
