pub mod render;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::collections::HashSet;

use crate::analyze::{classify, text_column, ColumnKind};

/// Most charts one dashboard will carry.
pub const MAX_CHARTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Histogram,
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Scatter => "scatter",
            ChartKind::Histogram => "histogram",
            ChartKind::Pie => "pie",
        }
    }
}

/// One chart to render: the kind, the column(s) it draws, and its title.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: Option<String>,
    pub title: String,
}

/// Picks charts for a query result based on its column shapes.
///
/// The rules: a datetime column plus a numeric column make a time series;
/// a low-cardinality categorical column against numeric columns makes bar
/// charts and a pie; two numeric columns make a scatter; every numeric
/// column (up to three) gets a histogram.
pub fn recommend(schema: &SchemaRef, batches: &[RecordBatch]) -> Vec<ChartSpec> {
    let row_count: usize = batches.iter().map(|batch| batch.num_rows()).sum();
    if row_count == 0 {
        return Vec::new();
    }

    let mut numeric: Vec<String> = Vec::new();
    let mut categorical: Vec<(String, usize)> = Vec::new();
    let mut datetime: Vec<String> = Vec::new();

    for (index, field) in schema.fields().iter().enumerate() {
        match classify(field.data_type()) {
            ColumnKind::Numeric => numeric.push(field.name().clone()),
            ColumnKind::Categorical => {
                let unique: HashSet<String> = text_column(batches, index)
                    .into_iter()
                    .flatten()
                    .collect();
                categorical.push((field.name().clone(), unique.len()));
            }
            ColumnKind::Datetime => datetime.push(field.name().clone()),
            ColumnKind::Other => {}
        }
    }

    let mut specs = Vec::new();

    // Time series first; it is usually what the question was about
    if let (Some(dt_col), Some(num_col)) = (datetime.first(), numeric.first()) {
        specs.push(ChartSpec {
            kind: ChartKind::Line,
            x: dt_col.clone(),
            y: Some(num_col.clone()),
            title: format!("Time Series of {}", num_col),
        });
    }

    // Bar charts against the first categorical column of sensible cardinality
    let bar_category = categorical
        .iter()
        .find(|(_, unique)| (2..=15).contains(unique));
    if let (Some((cat_col, _)), Some(num_col)) = (bar_category, numeric.first()) {
        specs.push(ChartSpec {
            kind: ChartKind::Bar,
            x: cat_col.clone(),
            y: Some(num_col.clone()),
            title: format!("{} by {}", num_col, cat_col),
        });

        if let Some(second) = numeric.get(1) {
            specs.push(ChartSpec {
                kind: ChartKind::Bar,
                x: cat_col.clone(),
                y: Some(second.clone()),
                title: format!("{} by {}", second, cat_col),
            });
        }
    }

    if numeric.len() >= 2 {
        specs.push(ChartSpec {
            kind: ChartKind::Scatter,
            x: numeric[0].clone(),
            y: Some(numeric[1].clone()),
            title: format!("Relationship between {} and {}", numeric[0], numeric[1]),
        });
    }

    for num_col in numeric.iter().take(3) {
        specs.push(ChartSpec {
            kind: ChartKind::Histogram,
            x: num_col.clone(),
            y: None,
            title: format!("Distribution of {}", num_col),
        });
    }

    // Pie charts for categories that still read well as slices
    for (cat_col, unique) in &categorical {
        if !(2..=10).contains(unique) {
            continue;
        }
        match numeric.first() {
            Some(num_col) => specs.push(ChartSpec {
                kind: ChartKind::Pie,
                x: cat_col.clone(),
                y: Some(num_col.clone()),
                title: format!("{} Distribution by {}", num_col, cat_col),
            }),
            None => specs.push(ChartSpec {
                kind: ChartKind::Pie,
                x: cat_col.clone(),
                y: None,
                title: format!("Distribution of {}", cat_col),
            }),
        }
    }

    specs.truncate(MAX_CHARTS);
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch_with(
        fields: Vec<Field>,
        arrays: Vec<arrow::array::ArrayRef>,
    ) -> (SchemaRef, Vec<RecordBatch>) {
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays).expect("batch");
        (schema, vec![batch])
    }

    #[test]
    fn empty_result_recommends_nothing() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "amount",
            DataType::Float64,
            true,
        )]));
        assert!(recommend(&schema, &[]).is_empty());
    }

    #[test]
    fn datetime_and_numeric_yield_time_series() {
        let (schema, batches) = batch_with(
            vec![
                Field::new("day", DataType::Date32, true),
                Field::new("amount", DataType::Float64, true),
            ],
            vec![
                Arc::new(Date32Array::from(vec![19000, 19001])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
            ],
        );
        let specs = recommend(&schema, &batches);
        assert_eq!(specs[0].kind, ChartKind::Line);
        assert_eq!(specs[0].x, "day");
        assert_eq!(specs[0].y.as_deref(), Some("amount"));
    }

    #[test]
    fn categorical_and_numeric_yield_bar_and_pie() {
        let (schema, batches) = batch_with(
            vec![
                Field::new("region", DataType::Utf8, true),
                Field::new("amount", DataType::Float64, true),
            ],
            vec![
                Arc::new(StringArray::from(vec!["north", "south", "north"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0])),
            ],
        );
        let specs = recommend(&schema, &batches);
        let kinds: Vec<ChartKind> = specs.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&ChartKind::Bar));
        assert!(kinds.contains(&ChartKind::Pie));
        assert!(kinds.contains(&ChartKind::Histogram));
        assert!(!kinds.contains(&ChartKind::Line));
    }

    #[test]
    fn high_cardinality_category_gets_no_bar() {
        let values: Vec<String> = (0..40).map(|i| format!("cat-{}", i)).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let (schema, batches) = batch_with(
            vec![
                Field::new("label", DataType::Utf8, true),
                Field::new("amount", DataType::Float64, true),
            ],
            vec![
                Arc::new(StringArray::from(refs)),
                Arc::new(Float64Array::from((0..40).map(|i| i as f64).collect::<Vec<f64>>())),
            ],
        );
        let specs = recommend(&schema, &batches);
        assert!(specs.iter().all(|s| s.kind != ChartKind::Bar));
        assert!(specs.iter().all(|s| s.kind != ChartKind::Pie));
    }

    #[test]
    fn chart_count_is_capped() {
        let (schema, batches) = batch_with(
            vec![
                Field::new("day", DataType::Date32, true),
                Field::new("region", DataType::Utf8, true),
                Field::new("a", DataType::Float64, true),
                Field::new("b", DataType::Float64, true),
                Field::new("c", DataType::Float64, true),
                Field::new("d", DataType::Float64, true),
            ],
            vec![
                Arc::new(Date32Array::from(vec![19000, 19001])),
                Arc::new(StringArray::from(vec!["x", "y"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
            ],
        );
        let specs = recommend(&schema, &batches);
        assert!(specs.len() <= MAX_CHARTS);
    }
}
