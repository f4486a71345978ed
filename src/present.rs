//! Chart-, map- and export-ready views over aggregated and forecast data.

use std::collections::BTreeMap;

use geo::Point;
use log::warn;
use serde::Serialize;

use crate::color::ColorRamp;
use crate::data::geo::representative_point;
use crate::data::model::{CellValue, Table};
use crate::data::filter::GroupedSeries;
use crate::error::Result;
use crate::forecast::{ForecastOutcome, ForecastRecord};

// ---------------------------------------------------------------------------
// Line / bar series
// ---------------------------------------------------------------------------

/// One point of a chart series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: CellValue,
    pub y: f64,
    pub series: String,
}

/// Anything that can be drawn as labelled `(x, y)` series.
pub trait ChartSource {
    fn chart_points(&self) -> Vec<ChartPoint>;
}

impl ChartSource for GroupedSeries {
    fn chart_points(&self) -> Vec<ChartPoint> {
        self.groups
            .iter()
            .filter_map(|(key, value)| {
                Some(ChartPoint {
                    x: key.last()?.clone(),
                    y: *value,
                    series: self.category_label(key),
                })
            })
            .collect()
    }
}

impl ChartSource for [ForecastRecord] {
    fn chart_points(&self) -> Vec<ChartPoint> {
        self.iter()
            .map(|r| ChartPoint {
                x: CellValue::Integer(r.year),
                y: r.value,
                series: r.category.clone(),
            })
            .collect()
    }
}

impl ChartSource for ForecastOutcome {
    fn chart_points(&self) -> Vec<ChartPoint> {
        self.records
            .iter()
            .map(|r| ChartPoint {
                x: CellValue::Integer(r.year),
                y: r.value,
                series: format!("{} ({})", r.category, self.model),
            })
            .collect()
    }
}

pub fn to_chart_series<S: ChartSource + ?Sized>(source: &S) -> Vec<ChartPoint> {
    source.chart_points()
}

// ---------------------------------------------------------------------------
// Map points
// ---------------------------------------------------------------------------

/// A weighted map point with its legend colour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
    pub label: String,
    pub color: String,
}

/// Category label → representative point, built once per render.
#[derive(Debug, Clone, Default)]
pub struct GeometryLookup {
    points: BTreeMap<String, Point<f64>>,
}

impl GeometryLookup {
    /// Use the first geometry seen for each value of `key_column`.
    pub fn from_table(table: &Table, key_column: &str) -> Self {
        let mut points = BTreeMap::new();
        for row in &table.rows {
            let (Some(key), Some(geometry)) = (row.get(key_column), row.geometry.as_ref()) else {
                continue;
            };
            if key.is_null() {
                continue;
            }
            if let Some(point) = representative_point(geometry) {
                points.entry(key.to_string()).or_insert(point);
            }
        }
        GeometryLookup { points }
    }

    pub fn insert(&mut self, key: &str, point: Point<f64>) {
        self.points.insert(key.to_string(), point);
    }

    pub fn get(&self, key: &str) -> Option<&Point<f64>> {
        self.points.get(key)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Anything that yields one weight per category label.
pub trait MapSource {
    fn weighted_categories(&self) -> Vec<(String, f64)>;
}

impl MapSource for GroupedSeries {
    fn weighted_categories(&self) -> Vec<(String, f64)> {
        self.category_totals().into_iter().collect()
    }
}

impl MapSource for [ForecastRecord] {
    fn weighted_categories(&self) -> Vec<(String, f64)> {
        self.iter().map(|r| (r.category.clone(), r.value)).collect()
    }
}

/// Place each category's weight at its geometry.
///
/// Categories without a geometry are dropped with a warning.
pub fn to_map_points<S: MapSource + ?Sized>(source: &S, lookup: &GeometryLookup) -> Vec<MapPoint> {
    let weighted = source.weighted_categories();
    let mut unmatched = 0;
    let located: Vec<(String, Point<f64>, f64)> = weighted
        .into_iter()
        .filter_map(|(label, weight)| match lookup.get(&label) {
            Some(p) => Some((label, *p, weight)),
            None => {
                unmatched += 1;
                None
            }
        })
        .collect();
    if unmatched > 0 {
        warn!("{unmatched} categories have no geometry and were left off the map");
    }
    colourise(located)
}

/// Map points for individual rows, weighted by `measure`.
/// Rows without geometry or a numeric measure are skipped.
pub fn table_map_points(table: &Table, measure: &str, label_column: Option<&str>) -> Vec<MapPoint> {
    let located = table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let point = representative_point(row.geometry.as_ref()?)?;
            let weight = row.measure(measure)?;
            let label = label_column
                .and_then(|c| row.get(c))
                .map(CellValue::to_string)
                .unwrap_or_else(|| format!("row {i}"));
            Some((label, point, weight))
        })
        .collect();
    colourise(located)
}

fn colourise(located: Vec<(String, Point<f64>, f64)>) -> Vec<MapPoint> {
    let Some(ramp) = ColorRamp::spanning(located.iter().map(|(_, _, w)| *w)) else {
        return Vec::new();
    };
    located
        .into_iter()
        .map(|(label, p, weight)| MapPoint {
            lat: p.y(),
            lon: p.x(),
            weight,
            label,
            color: ramp.color_for(weight),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Distribution views
// ---------------------------------------------------------------------------

/// Share of one category among all rows (a pie slice).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub count: usize,
    pub fraction: f64,
}

/// Value counts of `column`, largest first. Null cells are not counted.
pub fn pie_fractions(table: &Table, column: &str) -> Vec<PieSlice> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in table.rows.iter().filter_map(|r| r.get(column)) {
        if !value.is_null() {
            *counts.entry(value.to_string()).or_default() += 1;
        }
    }
    let total: usize = counts.values().sum();
    let mut slices: Vec<PieSlice> = counts
        .into_iter()
        .map(|(label, count)| PieSlice {
            label,
            count,
            fraction: count as f64 / total as f64,
        })
        .collect();
    slices.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    slices
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram; the last bin is closed on the right.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + width * i as f64,
            upper: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

/// Descriptive statistics of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; absent for a single value.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Count, mean, sample std, min, quartiles (linear interpolation) and max.
pub fn describe(values: &[f64]) -> Option<Summary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = (n > 1).then(|| {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    });
    let quantile = |q: f64| {
        let pos = q * (n - 1) as f64;
        let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    };
    Some(Summary {
        count: n,
        mean,
        std,
        min: sorted[0],
        q25: quantile(0.25),
        median: quantile(0.5),
        q75: quantile(0.75),
        max: sorted[n - 1],
    })
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

/// Plain comma-separated serialisation of a table's current rows.
pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.column_names)?;
    for row in &table.rows {
        writer.write_record(
            table
                .column_names
                .iter()
                .map(|c| row.get(c).map(CellValue::csv_text).unwrap_or_default()),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::DashboardError::Io(e.into_error()))
}

/// Serialise typed rows (forecast records, evaluation rows) with their field names as header.
pub fn records_to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::DashboardError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::filter::{filter_and_aggregate, AggFn, FilterState};
    use crate::data::model::Record;

    fn suburb_row(suburb: &str, area: f64, lon: f64, lat: f64) -> Record {
        let mut row = Record::default();
        row.cells.insert("suburb".into(), CellValue::String(suburb.into()));
        row.cells.insert("shape_area".into(), CellValue::Float(area));
        row.geometry = Some(geo::Geometry::Point(Point::new(lon, lat)));
        row
    }

    fn housing() -> Table {
        Table::from_rows(
            vec!["suburb".into(), "shape_area".into()],
            vec![
                suburb_row("Belmont", 10.0, 144.34, -38.17),
                suburb_row("Belmont", 5.0, 144.35, -38.18),
                suburb_row("Lara", 20.0, 144.40, -38.02),
            ],
        )
    }

    #[test]
    fn map_points_drop_unknown_categories() {
        let table = housing();
        let grouped = filter_and_aggregate(
            &table,
            &FilterState::new(),
            &["suburb"],
            Some("shape_area"),
            AggFn::Sum,
        )
        .unwrap();
        let mut lookup = GeometryLookup::from_table(&table, "suburb");
        assert_eq!(lookup.len(), 2);
        lookup = {
            let mut only_lara = GeometryLookup::default();
            only_lara.insert("Lara", *lookup.get("Lara").unwrap());
            only_lara
        };

        let points = to_map_points(&grouped, &lookup);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].label, "Lara");
        assert_eq!(points[0].weight, 20.0);
        assert_abs_diff_eq!(points[0].lat, -38.02);
    }

    #[test]
    fn empty_source_gives_empty_map() {
        let records: Vec<ForecastRecord> = Vec::new();
        let points = to_map_points(records.as_slice(), &GeometryLookup::default());
        assert!(points.is_empty());
    }

    #[test]
    fn grouped_series_chart_labels() {
        let table = housing();
        let grouped = filter_and_aggregate(
            &table,
            &FilterState::new(),
            &["suburb"],
            Some("shape_area"),
            AggFn::Sum,
        )
        .unwrap();
        let points = to_chart_series(&grouped);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, CellValue::String("Belmont".into()));
        assert_eq!(points[0].y, 15.0);
        assert_eq!(points[0].series, "shape_area");
    }

    #[test]
    fn pie_orders_by_count() {
        let mut rows = Vec::new();
        for kind in ["Building", "Occupancy", "Building", "Building", "Occupancy", "Demolition"] {
            let mut r = Record::default();
            r.cells.insert("permit_certificate_type".into(), CellValue::String(kind.into()));
            rows.push(r);
        }
        let table = Table::from_rows(vec!["permit_certificate_type".into()], rows);
        let slices = pie_fractions(&table, "permit_certificate_type");
        assert_eq!(slices[0].label, "Building");
        assert_eq!(slices[0].fraction, 0.5);
        assert_eq!(slices[2].label, "Demolition");
        assert_eq!(slices.iter().map(|s| s.count).sum::<usize>(), 6);
    }

    #[test]
    fn histogram_puts_max_in_last_bin() {
        let bins = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 4);
        let counts: Vec<usize> = bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 2]);
        assert_eq!(bins[0].lower, 0.0);
        assert_eq!(bins[3].upper, 4.0);
        assert_eq!(histogram(&[7.0], 30).iter().map(|b| b.count).sum::<usize>(), 1);
    }

    #[test]
    fn describe_matches_pandas_quantiles() {
        let s = describe(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.q25, 1.75);
        assert_eq!(s.median, 2.5);
        assert_eq!(s.q75, 3.25);
        assert_abs_diff_eq!(s.std.unwrap(), 1.290_994_448_735_805_6, epsilon = 1e-12);
        assert_eq!(describe(&[5.0]).unwrap().std, None);
        assert!(describe(&[]).is_none());
    }

    #[test]
    fn csv_writes_header_and_blank_nulls() {
        let mut row = Record::default();
        row.cells.insert("year".into(), CellValue::Integer(2020));
        row.cells.insert("value".into(), CellValue::Null);
        let table = Table::from_rows(vec!["year".into(), "value".into()], vec![row]);
        let bytes = to_csv(&table).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "year,value\n2020,\n");
    }

    #[test]
    fn forecast_records_export_with_header() {
        let rows = vec![ForecastRecord {
            category: "Geelong".into(),
            year: 2015,
            value: 130.0,
        }];
        let text = String::from_utf8(records_to_csv(&rows).unwrap()).unwrap();
        assert_eq!(text, "category,year,value\nGeelong,2015,130.0\n");
    }
}
