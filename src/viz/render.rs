use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use plotters::element::Pie;
use plotters::prelude::*;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use super::{ChartKind, ChartSpec};
use crate::analyze::{numeric_column, text_column};

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 500;

const HISTOGRAM_BINS: usize = 10;
const PIE_SLICE_LIMIT: usize = 5;

// Default series palette (tab10 order)
const SERIES_COLORS: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

#[derive(Debug)]
pub enum VizError {
    MissingColumn(String),
    EmptyData(String),
    RenderError(String),
    EncodeError(String),
}

impl fmt::Display for VizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VizError::MissingColumn(name) => write!(f, "Column not in result set: {}", name),
            VizError::EmptyData(msg) => write!(f, "No data to plot: {}", msg),
            VizError::RenderError(msg) => write!(f, "Chart rendering error: {}", msg),
            VizError::EncodeError(msg) => write!(f, "Image encoding error: {}", msg),
        }
    }
}

impl Error for VizError {}

fn draw_err<E: fmt::Display>(e: E) -> VizError {
    VizError::RenderError(e.to_string())
}

/// Renders one chart spec against a query result and returns the PNG
/// as a base64 string ready for a `data:` URI.
pub fn render_chart(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    match spec.kind {
        ChartKind::Line => render_line(spec, schema, batches),
        ChartKind::Bar => render_bar(spec, schema, batches),
        ChartKind::Scatter => render_scatter(spec, schema, batches),
        ChartKind::Histogram => render_histogram(spec, schema, batches),
        ChartKind::Pie => render_pie(spec, schema, batches),
    }
}

fn column_index(schema: &SchemaRef, name: &str) -> Result<usize, VizError> {
    schema
        .index_of(name)
        .map_err(|_| VizError::MissingColumn(name.to_string()))
}

fn value_column<'a>(spec: &'a ChartSpec) -> Result<&'a str, VizError> {
    spec.y
        .as_deref()
        .ok_or_else(|| VizError::EmptyData(format!("{} chart needs a value column", spec.kind.as_str())))
}

/// Rows where both columns are present, in result order.
fn paired<A, B>(a: Vec<Option<A>>, b: Vec<Option<B>>) -> Vec<(A, B)> {
    a.into_iter()
        .zip(b)
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect()
}

enum Agg {
    Mean,
    Sum,
}

/// Groups (label, value) pairs by label, preserving first-seen order.
fn aggregate(pairs: &[(String, f64)], mode: Agg) -> Vec<(String, f64)> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, (f64, usize)> = HashMap::new();

    for (label, value) in pairs {
        let entry = totals.entry(label.clone()).or_insert_with(|| {
            order.push(label.clone());
            (0.0, 0)
        });
        entry.0 += value;
        entry.1 += 1;
    }

    order
        .into_iter()
        .map(|label| {
            let (sum, count) = totals[&label];
            let value = match mode {
                Agg::Sum => sum,
                Agg::Mean => sum / count as f64,
            };
            (label, value)
        })
        .collect()
}

/// Y-axis range with a little headroom; degenerate inputs get a unit range.
fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if max > min {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    } else {
        (min - 0.5, min + 0.5)
    }
}

fn render_line(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    let x_index = column_index(schema, &spec.x)?;
    let y_index = column_index(schema, value_column(spec)?)?;

    let pairs = paired(text_column(batches, x_index), numeric_column(batches, y_index));
    if pairs.is_empty() {
        return Err(VizError::EmptyData(spec.title.clone()));
    }

    let labels: Vec<String> = pairs.iter().map(|(l, _)| l.clone()).collect();
    let values: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
    let (y_min, y_max) = padded_range(&values);
    let x_max = (values.len().saturating_sub(1)).max(1) as f64;

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(48)
            .y_label_area_size(56)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len().min(8))
            .x_label_formatter(&|x: &f64| {
                let index = x.round().max(0.0) as usize;
                labels.get(index).cloned().unwrap_or_default()
            })
            .y_labels(8)
            .draw()
            .map_err(draw_err)?;

        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                &SERIES_COLORS[0],
            ))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    encode_png_base64(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

fn render_bar(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    let x_index = column_index(schema, &spec.x)?;
    let y_index = column_index(schema, value_column(spec)?)?;

    let pairs = paired(text_column(batches, x_index), numeric_column(batches, y_index));
    let bars = aggregate(&pairs, Agg::Mean);
    if bars.is_empty() {
        return Err(VizError::EmptyData(spec.title.clone()));
    }

    let labels: Vec<String> = bars.iter().map(|(l, _)| l.clone()).collect();
    let values: Vec<f64> = bars.iter().map(|(_, v)| *v).collect();
    let (mut y_min, mut y_max) = padded_range(&values);
    y_min = y_min.min(0.0);
    y_max = y_max.max(0.0);

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(56)
            .y_label_area_size(56)
            .build_cartesian_2d(0f64..labels.len() as f64, y_min..y_max)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len().min(12))
            .x_label_formatter(&|x: &f64| {
                let index = x.floor().max(0.0) as usize;
                labels.get(index).cloned().unwrap_or_default()
            })
            .y_labels(8)
            .draw()
            .map_err(draw_err)?;

        chart
            .draw_series(values.iter().enumerate().map(|(i, v)| {
                Rectangle::new(
                    [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *v)],
                    SERIES_COLORS[0].mix(0.7).filled(),
                )
            }))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    encode_png_base64(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

fn render_scatter(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    let x_index = column_index(schema, &spec.x)?;
    let y_index = column_index(schema, value_column(spec)?)?;

    let points = paired(
        numeric_column(batches, x_index),
        numeric_column(batches, y_index),
    );
    if points.is_empty() {
        return Err(VizError::EmptyData(spec.title.clone()));
    }

    let xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let (x_min, x_max) = padded_range(&xs);
    let (y_min, y_max) = padded_range(&ys);

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(48)
            .y_label_area_size(56)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)
            .map_err(draw_err)?;

        chart.configure_mesh().draw().map_err(draw_err)?;

        chart
            .draw_series(
                points
                    .iter()
                    .map(|(x, y)| Circle::new((*x, *y), 4, SERIES_COLORS[0].mix(0.6).filled())),
            )
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    encode_png_base64(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

fn render_histogram(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    let x_index = column_index(schema, &spec.x)?;
    let values: Vec<f64> = numeric_column(batches, x_index)
        .into_iter()
        .flatten()
        .collect();
    if values.is_empty() {
        return Err(VizError::EmptyData(spec.title.clone()));
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if max > min {
        (min, max)
    } else {
        (min - 0.5, min + 0.5)
    };

    let bin_width = (hi - lo) / HISTOGRAM_BINS as f64;
    let mut counts = [0usize; HISTOGRAM_BINS];
    for value in &values {
        let mut bin = ((value - lo) / bin_width) as usize;
        if bin >= HISTOGRAM_BINS {
            bin = HISTOGRAM_BINS - 1;
        }
        counts[bin] += 1;
    }

    let y_max = counts.iter().copied().max().unwrap_or(1) as f64 * 1.1;

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(48)
            .y_label_area_size(56)
            .build_cartesian_2d(lo..hi, 0f64..y_max)
            .map_err(draw_err)?;

        chart.configure_mesh().disable_x_mesh().draw().map_err(draw_err)?;

        chart
            .draw_series(counts.iter().enumerate().map(|(i, count)| {
                let left = lo + i as f64 * bin_width;
                let right = left + bin_width;
                Rectangle::new(
                    [(left, 0.0), (right, *count as f64)],
                    SERIES_COLORS[2].mix(0.7).filled(),
                )
            }))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    encode_png_base64(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

fn render_pie(
    spec: &ChartSpec,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<String, VizError> {
    let cat_index = column_index(schema, &spec.x)?;

    let pairs: Vec<(String, f64)> = match spec.y.as_deref() {
        Some(value_name) => {
            let value_index = column_index(schema, value_name)?;
            paired(text_column(batches, cat_index), numeric_column(batches, value_index))
        }
        // Without a value column every row counts as one
        None => text_column(batches, cat_index)
            .into_iter()
            .flatten()
            .map(|label| (label, 1.0))
            .collect(),
    };

    let mut slices = aggregate(&pairs, Agg::Sum);
    slices.retain(|(_, value)| *value > 0.0);
    if slices.is_empty() {
        return Err(VizError::EmptyData(spec.title.clone()));
    }

    // Too many slices are unreadable; keep the biggest and fold the rest
    if slices.len() > 2 * PIE_SLICE_LIMIT {
        slices.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let rest: f64 = slices[PIE_SLICE_LIMIT..].iter().map(|(_, v)| v).sum();
        slices.truncate(PIE_SLICE_LIMIT);
        if rest > 0.0 {
            slices.push(("Other".to_string(), rest));
        }
    }

    let labels: Vec<String> = slices.iter().map(|(l, _)| l.clone()).collect();
    let sizes: Vec<f64> = slices.iter().map(|(_, v)| *v).collect();
    let colors: Vec<RGBColor> = (0..sizes.len())
        .map(|i| SERIES_COLORS[i % SERIES_COLORS.len()])
        .collect();

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let root = root
            .titled(&spec.title, ("sans-serif", 22))
            .map_err(draw_err)?;

        let center = ((CHART_WIDTH / 2) as i32, (CHART_HEIGHT / 2) as i32);
        let radius = (CHART_WIDTH.min(CHART_HEIGHT) as f64) * 0.32;

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.label_style(("sans-serif", 16).into_font().color(&BLACK));
        pie.percentages(("sans-serif", 12).into_font().color(&BLACK));
        root.draw(&pie).map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    encode_png_base64(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

/// Encodes a raw RGB framebuffer as a base64 PNG string.
pub fn encode_png_base64(rgb: &[u8], width: u32, height: u32) -> Result<String, VizError> {
    let image = image::RgbImage::from_raw(width, height, rgb.to_vec())
        .ok_or_else(|| VizError::EncodeError("framebuffer size mismatch".to_string()))?;

    let mut png_bytes: Vec<u8> = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut png_bytes);
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| VizError::EncodeError(e.to_string()))?;

    Ok(BASE64.encode(&png_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_png_payload() {
        let buffer = vec![200u8; 4 * 4 * 3];
        let encoded = encode_png_base64(&buffer, 4, 4).expect("encode");
        // Base64 of the PNG magic bytes
        assert!(encoded.starts_with("iVBORw0KGgo"));
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let buffer = vec![0u8; 5];
        assert!(encode_png_base64(&buffer, 4, 4).is_err());
    }

    #[test]
    fn aggregate_mean_preserves_order() {
        let pairs = vec![
            ("b".to_string(), 4.0),
            ("a".to_string(), 1.0),
            ("b".to_string(), 2.0),
        ];
        let agg = aggregate(&pairs, Agg::Mean);
        assert_eq!(agg, vec![("b".to_string(), 3.0), ("a".to_string(), 1.0)]);
    }

    #[test]
    fn aggregate_sum_totals_values() {
        let pairs = vec![("x".to_string(), 1.5), ("x".to_string(), 2.5)];
        let agg = aggregate(&pairs, Agg::Sum);
        assert_eq!(agg, vec![("x".to_string(), 4.0)]);
    }

    #[test]
    fn padded_range_handles_degenerate_input() {
        assert_eq!(padded_range(&[]), (0.0, 1.0));
        assert_eq!(padded_range(&[2.0]), (1.5, 2.5));
        let (lo, hi) = padded_range(&[0.0, 10.0]);
        assert!(lo < 0.0 && hi > 10.0);
    }
}
