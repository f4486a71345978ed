use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray,
};
use arrow::datatypes::DataType;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use geojson::GeoJson;
use log::{debug, trace};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::geo::{
    epsg_from_crs_member, geometry_from_json_text, point_from_lat_lon_text, resolve_crs, Reprojector,
};
use super::model::{CellValue, LoadReport, LoadedTable, Record, Table};
use crate::error::{DashboardError, Result};

/// Column reported in [`LoadReport`] for records the CSV reader could not decode.
pub const MALFORMED_RECORD: &str = "<record>";

// ---------------------------------------------------------------------------
// Schema: which columns must exist and how they are coerced
// ---------------------------------------------------------------------------

/// Where a row's geometry comes from in a tabular source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometrySource {
    /// A column holding a GeoJSON geometry object as text (`geo_shape`).
    GeoJsonText(String),
    /// A column holding `"lat, lon"` text (`Geo Point`).
    LatLonText(String),
}

/// Declared shape of a source table.
///
/// A row whose *required* field is missing or fails coercion is dropped and
/// counted in the [`LoadReport`]. Typed columns that are not required become
/// [`CellValue::Null`] on failure instead.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Name used in logs and as part of the cache key.
    pub name: String,
    pub required: Vec<String>,
    pub year_columns: Vec<String>,
    pub date_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    /// Years (and date years) outside this range fail coercion.
    pub year_range: RangeInclusive<i64>,
    pub geometry: Option<GeometrySource>,
    /// CRS of text geometries in tabular sources; GeoJSON files carry their own.
    pub source_epsg: Option<u32>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        TableSchema {
            name: name.to_string(),
            required: Vec::new(),
            year_columns: Vec::new(),
            date_columns: Vec::new(),
            numeric_columns: Vec::new(),
            year_range: 1900..=2100,
            geometry: None,
            source_epsg: None,
        }
    }

    pub fn require(mut self, columns: &[&str]) -> Self {
        self.required.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn years(mut self, columns: &[&str]) -> Self {
        self.year_columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn dates(mut self, columns: &[&str]) -> Self {
        self.date_columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn numeric<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.numeric_columns
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn year_range(mut self, range: RangeInclusive<i64>) -> Self {
        self.year_range = range;
        self
    }

    pub fn geometry(mut self, source: GeometrySource) -> Self {
        self.geometry = Some(source);
        self
    }

    fn is_required(&self, column: &str) -> bool {
        self.required.iter().any(|c| c == column)
    }

    /// Stable key distinguishing two schemas over the same file.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{:?}|{:?}..={:?}",
            self.name,
            self.required.join(","),
            self.year_columns.join(","),
            self.date_columns.join(","),
            self.numeric_columns.join(","),
            self.geometry,
            self.year_range.start(),
            self.year_range.end(),
        )
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file and coerce it against `schema`.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`      – header row, comma separated
/// * `.json`     – `[{ "column": value, ... }, ...]`
/// * `.parquet`  – flat columns
/// * `.geojson`  – feature collection; properties become columns
pub fn load_file(path: &Path, schema: &TableSchema) -> Result<LoadedTable> {
    std::fs::metadata(path).map_err(|e| DashboardError::unavailable(path, e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        "geojson" => load_geojson(path)?,
        other => {
            return Err(DashboardError::unavailable(
                path,
                format!("unsupported file extension: .{other}"),
            ))
        }
    };

    let loaded = coerce_table(raw, schema, path)?;
    debug!(
        "{}: kept {} of {} rows from {}",
        schema.name,
        loaded.report.kept_rows(),
        loaded.report.total_rows,
        path.display()
    );
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Apply `schema` to an already-read table.
///
/// `origin` only labels errors. Drops counted in `raw.report` are carried over.
pub fn coerce_table(raw: LoadedTable, schema: &TableSchema, origin: &Path) -> Result<LoadedTable> {
    let LoadedTable { table, mut report } = raw;

    for column in &schema.required {
        if !table.has_column(column) {
            return Err(DashboardError::missing_column(column, origin));
        }
    }

    let crs = resolve_crs(schema.source_epsg, origin)?;
    let mut rows = Vec::with_capacity(table.rows.len());

    'rows: for mut row in table.rows {
        for column in &schema.year_columns {
            let parsed = row.get(column).and_then(|v| parse_year(v, &schema.year_range));
            if !apply(&mut row, column, parsed.map(CellValue::Integer), schema, &mut report) {
                continue 'rows;
            }
        }
        for column in &schema.date_columns {
            let parsed = row
                .get(column)
                .and_then(parse_date)
                .filter(|d| schema.year_range.contains(&i64::from(d.year())));
            if !apply(&mut row, column, parsed.map(CellValue::Date), schema, &mut report) {
                continue 'rows;
            }
        }
        for column in &schema.numeric_columns {
            let parsed = row.get(column).and_then(parse_numeric);
            if !apply(&mut row, column, parsed.map(CellValue::Float), schema, &mut report) {
                continue 'rows;
            }
        }
        for column in &schema.required {
            if row.get(column).map_or(true, CellValue::is_null) {
                report.record_drop(column);
                continue 'rows;
            }
        }

        if let Some(source) = &schema.geometry {
            if row.geometry.is_none() {
                row.geometry = text_geometry(&row, source, &crs);
            }
        }
        rows.push(row);
    }

    Ok(LoadedTable {
        table: Table::from_rows(table.column_names, rows),
        report,
    })
}

/// Store a coerced value. Returns `false` when the row must be dropped.
fn apply(
    row: &mut Record,
    column: &str,
    parsed: Option<CellValue>,
    schema: &TableSchema,
    report: &mut LoadReport,
) -> bool {
    match parsed {
        Some(value) => {
            row.cells.insert(column.to_string(), value);
            true
        }
        None if schema.is_required(column) => {
            trace!("{}: dropping row, '{column}' failed coercion", schema.name);
            report.record_drop(column);
            false
        }
        None => {
            if row.cells.contains_key(column) {
                row.cells.insert(column.to_string(), CellValue::Null);
            }
            true
        }
    }
}

fn text_geometry(
    row: &Record,
    source: &GeometrySource,
    crs: &Reprojector,
) -> Option<geo::Geometry<f64>> {
    let (column, parsed) = match source {
        GeometrySource::GeoJsonText(column) => (
            column,
            row.get(column)
                .map(CellValue::csv_text)
                .and_then(|t| geometry_from_json_text(&t)),
        ),
        GeometrySource::LatLonText(column) => (
            column,
            row.get(column)
                .map(CellValue::csv_text)
                .and_then(|t| point_from_lat_lon_text(&t)),
        ),
    };
    if parsed.is_none() {
        debug!("row has no usable geometry in '{column}'");
    }
    parsed.and_then(|g| crs.reproject(&g))
}

/// Parse a year cell: integers, whole floats (`2019.0`) or numeric text.
pub fn parse_year(value: &CellValue, range: &RangeInclusive<i64>) -> Option<i64> {
    let year = match value {
        CellValue::String(s) => CellValue::guess(s).as_i64(),
        CellValue::Date(d) => Some(i64::from(d.year())),
        other => other.as_i64(),
    }?;
    range.contains(&year).then_some(year)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a date cell in any of the formats seen in the source files.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    let text = match value {
        CellValue::Date(d) => return Some(*d),
        CellValue::String(s) => s.trim(),
        _ => return None,
    };
    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
    {
        return Some(d);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive())
}

/// Parse a measure, stripping thousands separators and currency symbols.
pub fn parse_numeric(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::String(s) => {
            let negative = s.trim_start().starts_with('-');
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            let v: f64 = cleaned.parse().ok()?;
            Some(if negative { -v } else { v })
        }
        other => other.as_f64(),
    }
    .filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one observation per record.
/// Records the reader cannot decode are counted as dropped and skipped.
fn load_csv(path: &Path) -> Result<LoadedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| DashboardError::unavailable(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DashboardError::unavailable(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut report = LoadReport::default();
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        report.total_rows += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                trace!("CSV row {row_no} unreadable: {e}");
                report.record_drop(MALFORMED_RECORD);
                continue;
            }
        };

        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(col, value)| (col.clone(), CellValue::guess(value)))
            .collect();
        rows.push(Record {
            cells,
            geometry: None,
        });
    }

    Ok(LoadedTable {
        table: Table::from_rows(headers, rows),
        report,
    })
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "NB_YEAR_MFC_VEH": 2015, "CD_CL_FUEL_ENG": "D", "TOTAL1": 12 },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<LoadedTable> {
    let text = std::fs::read_to_string(path).map_err(|e| DashboardError::unavailable(path, e))?;
    let root: JsonValue =
        serde_json::from_str(&text).map_err(|e| DashboardError::unavailable(path, e))?;

    let records = root
        .as_array()
        .ok_or_else(|| DashboardError::unavailable(path, "expected top-level JSON array"))?;

    let mut report = LoadReport::default();
    let mut columns = ColumnOrder::default();
    let mut rows = Vec::with_capacity(records.len());

    for rec in records {
        report.total_rows += 1;
        let Some(obj) = rec.as_object() else {
            report.record_drop(MALFORMED_RECORD);
            continue;
        };
        let cells = obj
            .iter()
            .map(|(key, val)| {
                columns.see(key);
                (key.clone(), json_to_cell(val))
            })
            .collect();
        rows.push(Record {
            cells,
            geometry: None,
        });
    }

    Ok(LoadedTable {
        table: Table::from_rows(columns.into_vec(), rows),
        report,
    })
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

/// Column names in first-seen order.
#[derive(Default)]
struct ColumnOrder {
    names: Vec<String>,
    seen: BTreeSet<String>,
}

impl ColumnOrder {
    fn see(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.names.push(name.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.names
    }
}

// ---------------------------------------------------------------------------
// GeoJSON loader
// ---------------------------------------------------------------------------

/// Load a GeoJSON feature collection. Feature properties become columns and
/// geometries are reprojected to EPSG:4326 using the collection's `crs` member.
fn load_geojson(path: &Path) -> Result<LoadedTable> {
    let text = std::fs::read_to_string(path).map_err(|e| DashboardError::unavailable(path, e))?;
    let geojson = text
        .parse::<GeoJson>()
        .map_err(|e| DashboardError::unavailable(path, e))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => geojson::FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(DashboardError::unavailable(
                path,
                "expected a feature collection, found a bare geometry",
            ))
        }
    };

    let crs = resolve_crs(epsg_from_crs_member(collection.foreign_members.as_ref()), path)?;
    if !crs.is_identity() {
        debug!("{}: reprojecting from {:?} to EPSG:4326", path.display(), crs.crs());
    }

    let mut report = LoadReport::default();
    let mut columns = ColumnOrder::default();
    let mut rows = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        report.total_rows += 1;
        let cells = feature
            .properties
            .iter()
            .flatten()
            .map(|(key, val)| {
                columns.see(key);
                (key.clone(), json_to_cell(val))
            })
            .collect();
        let geometry = feature.geometry.and_then(|g| {
            geo::Geometry::<f64>::try_from(g)
                .map_err(|e| trace!("feature geometry skipped: {e}"))
                .ok()
        });
        rows.push(Record {
            cells,
            geometry: geometry.and_then(|g| crs.reproject(&g)),
        });
    }

    Ok(LoadedTable {
        table: Table::from_rows(columns.into_vec(), rows),
        report,
    })
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with flat columns (strings, ints, floats, bools, dates).
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<LoadedTable> {
    let file = std::fs::File::open(path).map_err(|e| DashboardError::unavailable(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DashboardError::unavailable(path, e))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| DashboardError::unavailable(path, e))?;

    let mut report = LoadReport::default();
    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.map_err(|e| DashboardError::unavailable(path, e))?;
        for row in 0..batch.num_rows() {
            report.total_rows += 1;
            let cells = columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), extract_cell(batch.column(i), row)))
                .collect();
            rows.push(Record {
                cells,
                geometry: None,
            });
        }
    }

    Ok(LoadedTable {
        table: Table::from_rows(columns, rows),
        report,
    })
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| CellValue::String(a.value(row).to_string())),
        DataType::LargeUtf8 => any
            .downcast_ref::<LargeStringArray>()
            .map(|a| CellValue::String(a.value(row).to_string())),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| CellValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| CellValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| CellValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| CellValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| CellValue::Bool(a.value(row))),
        DataType::Date32 => any
            .downcast_ref::<Date32Array>()
            .and_then(|a| a.value_as_date(row))
            .map(CellValue::Date),
        _ => None,
    }
    .unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn unparsable_years_are_dropped_not_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "year,value\nabc,5\n2020,7\n");
        let schema = TableSchema::new("rows").require(&["year"]).years(&["year"]);

        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.table.rows[0].get("year"), Some(&CellValue::Integer(2020)));
        assert_eq!(loaded.report.total_rows, 2);
        assert_eq!(loaded.report.dropped_rows, 1);
        assert_eq!(loaded.report.dropped_by_column["year"], 1);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = load_file(Path::new("/nonexistent/permits.csv"), &TableSchema::new("x"))
            .unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }

    #[test]
    fn missing_required_column_names_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "permits.csv", "issue_date,cost\n2020-01-01,5\n");
        let schema = TableSchema::new("permits").require(&["estimated_cost_of_works"]);
        match load_file(&path, &schema).unwrap_err() {
            DashboardError::Schema { column, .. } => assert_eq!(column, "estimated_cost_of_works"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn optional_dates_become_null_required_dates_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "permits.csv",
            "issue_date,completed_by_date,estimated_cost_of_works\n\
             2021-05-03,not a date,\"1,500\"\n\
             ,2021-01-01,20\n\
             03/02/2019,2019-04-01T10:00:00,$300\n",
        );
        let schema = TableSchema::new("permits")
            .require(&["issue_date"])
            .dates(&["issue_date", "completed_by_date"])
            .numeric(&["estimated_cost_of_works"]);

        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(loaded.table.len(), 2);
        let first = &loaded.table.rows[0];
        assert_eq!(first.get("completed_by_date"), Some(&CellValue::Null));
        assert_eq!(first.measure("estimated_cost_of_works"), Some(1500.0));
        let second = &loaded.table.rows[1];
        assert_eq!(
            second.get("issue_date"),
            Some(&CellValue::Date(NaiveDate::from_ymd_opt(2019, 2, 3).unwrap()))
        );
        assert_eq!(second.measure("estimated_cost_of_works"), Some(300.0));
    }

    #[test]
    fn years_outside_range_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "v.csv", "NB_YEAR_MFC_VEH,TOTAL1\n1066,1\n2015.0,2\n");
        let schema = TableSchema::new("v")
            .require(&["NB_YEAR_MFC_VEH"])
            .years(&["NB_YEAR_MFC_VEH"]);
        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(
            loaded.table.rows[0].get("NB_YEAR_MFC_VEH"),
            Some(&CellValue::Integer(2015))
        );
    }

    #[test]
    fn geojson_reprojects_vicgrid_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "traffic.geojson",
            r#"{
              "type": "FeatureCollection",
              "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3111" } },
              "features": [
                { "type": "Feature",
                  "geometry": { "type": "Point", "coordinates": [2500000.0, 2500000.0] },
                  "properties": { "LAST_YEAR": 2019, "AADT_ALLVE": 1200 } },
                { "type": "Feature",
                  "geometry": { "type": "Point", "coordinates": [2500100.0, 2500100.0] },
                  "properties": { "LAST_YEAR": 2019, "AADT_ALLVE": null } }
              ]
            }"#,
        );
        let schema = TableSchema::new("traffic")
            .require(&["LAST_YEAR", "AADT_ALLVE"])
            .years(&["LAST_YEAR"])
            .numeric(&["AADT_ALLVE"]);

        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.report.dropped_by_column["AADT_ALLVE"], 1);
        let geo::Geometry::Point(p) = loaded.table.rows[0].geometry.clone().unwrap() else {
            panic!("expected a point");
        };
        assert!((p.x() - 145.0).abs() < 1e-9);
        assert!((p.y() + 37.0).abs() < 1e-9);
    }

    #[test]
    fn geojson_reprojects_mga_zone_55_parcels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "parcels.geojson",
            r#"{
              "type": "FeatureCollection",
              "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::28355" } },
              "features": [
                { "type": "Feature",
                  "geometry": { "type": "Point", "coordinates": [320704.4463155, 5812911.699529] },
                  "properties": { "PFI": "5001" } }
              ]
            }"#,
        );

        let loaded = load_file(&path, &TableSchema::new("parcels")).unwrap();
        assert_eq!(loaded.table.len(), 1);
        let geo::Geometry::Point(p) = loaded.table.rows[0].geometry.clone().unwrap() else {
            panic!("expected a point");
        };
        assert!((p.x() - 144.9631).abs() < 1e-7);
        assert!((p.y() + 37.8136).abs() < 1e-7);
    }

    #[test]
    fn geo_shape_text_becomes_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "housing.csv",
            "suburb,consyear,geo_shape\n\
             Belmont,2015,\"{\"\"type\"\": \"\"Point\"\", \"\"coordinates\"\": [144.34, -38.17]}\"\n",
        );
        let schema = TableSchema::new("housing")
            .require(&["suburb", "consyear"])
            .years(&["consyear"])
            .geometry(GeometrySource::GeoJsonText("geo_shape".into()));
        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(
            loaded.table.rows[0].geometry,
            Some(geo::Geometry::Point(geo::Point::new(144.34, -38.17)))
        );
    }

    #[test]
    fn json_records_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "veh.json",
            r#"[{"NB_YEAR_MFC_VEH": 2010, "TOTAL1": 4}, {"NB_YEAR_MFC_VEH": "n/a", "TOTAL1": 1}, 7]"#,
        );
        let schema = TableSchema::new("veh")
            .require(&["NB_YEAR_MFC_VEH"])
            .years(&["NB_YEAR_MFC_VEH"]);
        let loaded = load_file(&path, &schema).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.report.total_rows, 3);
        assert_eq!(loaded.report.dropped_rows, 2);
        assert_eq!(loaded.table.column_names, vec!["NB_YEAR_MFC_VEH", "TOTAL1"]);
    }

    #[test]
    fn numeric_text_is_cleaned() {
        assert_eq!(parse_numeric(&CellValue::String("1,234.5".into())), Some(1234.5));
        assert_eq!(parse_numeric(&CellValue::String("-12".into())), Some(-12.0));
        assert_eq!(parse_numeric(&CellValue::String("n/a".into())), None);
        assert_eq!(parse_numeric(&CellValue::Integer(3)), Some(3.0));
    }
}
