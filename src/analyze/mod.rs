use arrow::array::{Array, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// How a result column is treated for summaries and chart selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
    Other,
}

pub fn classify(data_type: &DataType) -> ColumnKind {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ColumnKind::Numeric,
        DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _)
        | DataType::Time32(_)
        | DataType::Time64(_) => ColumnKind::Datetime,
        DataType::Boolean | DataType::Utf8 | DataType::LargeUtf8 => ColumnKind::Categorical,
        _ => ColumnKind::Other,
    }
}

#[derive(Debug, Serialize)]
pub struct ColumnTypeCounts {
    pub numeric: usize,
    pub categorical: usize,
    pub datetime: usize,
}

#[derive(Debug, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Serialize)]
pub struct CategoricalStats {
    pub unique_values: usize,
    pub top_values: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct DatetimeStats {
    pub min: String,
    pub max: String,
}

/// Shape and per-column statistics of one query result, serialized into
/// the dashboard `summary` object.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub column_types: ColumnTypeCounts,
    pub columns: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub numeric_stats: BTreeMap<String, NumericStats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub categorical_stats: BTreeMap<String, CategoricalStats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub datetime_stats: BTreeMap<String, DatetimeStats>,
}

const TOP_VALUE_LIMIT: usize = 5;

/// Summarizes a query result: column classification counts plus basic
/// descriptive statistics per column.
pub fn summarize(schema: &SchemaRef, batches: &[RecordBatch]) -> TableSummary {
    let row_count: usize = batches.iter().map(|batch| batch.num_rows()).sum();

    let mut counts = ColumnTypeCounts {
        numeric: 0,
        categorical: 0,
        datetime: 0,
    };
    let mut columns = BTreeMap::new();
    let mut numeric_stats = BTreeMap::new();
    let mut categorical_stats = BTreeMap::new();
    let mut datetime_stats = BTreeMap::new();

    for (index, field) in schema.fields().iter().enumerate() {
        let name = field.name().clone();
        columns.insert(name.clone(), field.data_type().to_string());

        match classify(field.data_type()) {
            ColumnKind::Numeric => {
                counts.numeric += 1;
                let values: Vec<f64> =
                    numeric_column(batches, index).into_iter().flatten().collect();
                if let Some(stats) = describe_numeric(&values) {
                    numeric_stats.insert(name, stats);
                }
            }
            ColumnKind::Categorical => {
                counts.categorical += 1;
                let values: Vec<String> =
                    text_column(batches, index).into_iter().flatten().collect();
                if !values.is_empty() {
                    categorical_stats.insert(name, describe_categorical(&values));
                }
            }
            ColumnKind::Datetime => {
                counts.datetime += 1;
                let values: Vec<String> =
                    text_column(batches, index).into_iter().flatten().collect();
                if let (Some(min), Some(max)) = (values.iter().min(), values.iter().max()) {
                    datetime_stats.insert(
                        name,
                        DatetimeStats {
                            min: min.clone(),
                            max: max.clone(),
                        },
                    );
                }
            }
            ColumnKind::Other => {}
        }
    }

    TableSummary {
        row_count,
        column_count: schema.fields().len(),
        column_types: counts,
        columns,
        numeric_stats,
        categorical_stats,
        datetime_stats,
    }
}

/// A column's values as `f64`, aligned row-by-row with the result
/// (`None` for nulls or uncastable cells).
pub fn numeric_column(batches: &[RecordBatch], index: usize) -> Vec<Option<f64>> {
    let mut values = Vec::new();
    for batch in batches {
        match cast(batch.column(index), &DataType::Float64) {
            Ok(casted) => match casted.as_any().downcast_ref::<Float64Array>() {
                Some(array) => {
                    for i in 0..array.len() {
                        if array.is_null(i) {
                            values.push(None);
                        } else {
                            values.push(Some(array.value(i)));
                        }
                    }
                }
                None => values.extend(std::iter::repeat(None).take(batch.num_rows())),
            },
            Err(_) => values.extend(std::iter::repeat(None).take(batch.num_rows())),
        }
    }
    values
}

/// A column's values as display strings, aligned row-by-row with the result.
pub fn text_column(batches: &[RecordBatch], index: usize) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for batch in batches {
        match cast(batch.column(index), &DataType::Utf8) {
            Ok(casted) => match casted.as_any().downcast_ref::<StringArray>() {
                Some(array) => {
                    for i in 0..array.len() {
                        if array.is_null(i) {
                            values.push(None);
                        } else {
                            values.push(Some(array.value(i).to_string()));
                        }
                    }
                }
                None => values.extend(std::iter::repeat(None).take(batch.num_rows())),
            },
            Err(_) => values.extend(std::iter::repeat(None).take(batch.num_rows())),
        }
    }
    values
}

fn describe_numeric(values: &[f64]) -> Option<NumericStats> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // Sample standard deviation, matching what a stats library reports
    let std = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Some(NumericStats {
        count,
        mean: round2(mean),
        std: round2(std),
        min: round2(min),
        max: round2(max),
    })
}

fn describe_categorical(values: &[String]) -> CategoricalStats {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }

    let unique_values = counts.len();

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let top_values = ranked
        .into_iter()
        .take(TOP_VALUE_LIMIT)
        .map(|(value, count)| (value.to_string(), count))
        .collect();

    CategoricalStats {
        unique_values,
        top_values,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn sample_batch() -> (SchemaRef, Vec<RecordBatch>) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, true),
            Field::new("amount", DataType::Float64, true),
            Field::new("day", DataType::Date32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["north", "south", "north"])),
                Arc::new(Float64Array::from(vec![Some(10.0), None, Some(20.0)])),
                Arc::new(Date32Array::from(vec![19000, 19001, 19002])),
            ],
        )
        .expect("batch should build");
        (schema, vec![batch])
    }

    #[test]
    fn classifies_arrow_types() {
        assert_eq!(classify(&DataType::Int64), ColumnKind::Numeric);
        assert_eq!(classify(&DataType::Utf8), ColumnKind::Categorical);
        assert_eq!(classify(&DataType::Date32), ColumnKind::Datetime);
        assert_eq!(
            classify(&DataType::List(Arc::new(Field::new("item", DataType::Int32, true)))),
            ColumnKind::Other
        );
    }

    #[test]
    fn summary_counts_and_stats() {
        let (schema, batches) = sample_batch();
        let summary = summarize(&schema, &batches);

        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.column_count, 3);
        assert_eq!(summary.column_types.numeric, 1);
        assert_eq!(summary.column_types.categorical, 1);
        assert_eq!(summary.column_types.datetime, 1);

        let amount = summary.numeric_stats.get("amount").expect("amount stats");
        assert_eq!(amount.count, 2);
        assert_eq!(amount.mean, 15.0);
        assert_eq!(amount.min, 10.0);
        assert_eq!(amount.max, 20.0);

        let region = summary
            .categorical_stats
            .get("region")
            .expect("region stats");
        assert_eq!(region.unique_values, 2);
        assert_eq!(region.top_values.get("north"), Some(&2));

        assert!(summary.datetime_stats.contains_key("day"));
    }

    #[test]
    fn numeric_column_preserves_row_alignment() {
        let (_, batches) = sample_batch();
        let values = numeric_column(&batches, 1);
        assert_eq!(values, vec![Some(10.0), None, Some(20.0)]);
    }

    #[test]
    fn text_column_stringifies_any_type() {
        let (_, batches) = sample_batch();
        let regions = text_column(&batches, 0);
        assert_eq!(regions[0].as_deref(), Some("north"));

        // Dates come back as ISO strings via the Utf8 cast
        let days = text_column(&batches, 2);
        assert!(days[0].as_deref().unwrap_or_default().starts_with("20"));
    }

    #[test]
    fn empty_result_summarizes_cleanly() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "amount",
            DataType::Float64,
            true,
        )]));
        let summary = summarize(&schema, &[]);
        assert_eq!(summary.row_count, 0);
        assert!(summary.numeric_stats.is_empty());
    }
}
