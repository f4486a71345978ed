use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// CellValue – a single cell in a table column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring the dtypes found in the source
/// CSV / GeoJSON files.
/// Used as a `BTreeMap` / `BTreeSet` key downstream so `CellValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Float(v) => serializer.serialize_f64(*v),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            CellValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::guess(s)
    }
}

impl CellValue {
    /// Infer the narrowest type for a raw text cell.
    pub fn guess(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::String(s.to_string())
    }

    /// Try to interpret the value as an `f64` measure.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) if v.is_finite() => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integer view, accepting whole floats such as `2019.0`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Text written to CSV exports; empty for nulls so a reload sees a missing value.
    pub fn csv_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Record – one row of a table
// ---------------------------------------------------------------------------

/// A single observation row.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// Dynamic columns: column_name → value.
    pub cells: BTreeMap<String, CellValue>,
    /// Geometry in EPSG:4326 (lon/lat), when the source carries one.
    pub geometry: Option<geo::Geometry<f64>>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Measure value of `column`, `None` when missing or non-numeric.
    pub fn measure(&self, column: &str) -> Option<f64> {
        self.cells.get(column).and_then(CellValue::as_f64)
    }
}

// ---------------------------------------------------------------------------
// Table – the complete loaded dataset
// ---------------------------------------------------------------------------

/// A loaded table with pre-computed column indices.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// All rows.
    pub rows: Vec<Record>,
    /// Column names in source order.
    pub column_names: Vec<String>,
    /// For each column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<CellValue>>,
}

impl Table {
    /// Build column indices from the loaded rows, keeping `column_names` order.
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Record>) -> Self {
        let mut unique_values: BTreeMap<String, BTreeSet<CellValue>> = column_names
            .iter()
            .map(|c| (c.clone(), BTreeSet::new()))
            .collect();

        for row in &rows {
            for (col, val) in &row.cells {
                if let Some(set) = unique_values.get_mut(col) {
                    set.insert(val.clone());
                }
            }
        }
        Table {
            rows,
            column_names,
            unique_values,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Copy of the rows at `indices`, keeping the column set.
    pub fn select(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect();
        Table::from_rows(self.column_names.clone(), rows)
    }

    /// Return a new table with an extra column computed from each row.
    pub fn with_derived_column<F>(&self, name: &str, derive: F) -> Table
    where
        F: Fn(&Record) -> CellValue,
    {
        let mut column_names = self.column_names.clone();
        if !column_names.iter().any(|c| c == name) {
            column_names.push(name.to_string());
        }
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = r.clone();
                row.cells.insert(name.to_string(), derive(r));
                row
            })
            .collect();
        Table::from_rows(column_names, rows)
    }

    /// All finite numeric values of `column`, in row order.
    pub fn measures(&self, column: &str) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.measure(column)).collect()
    }
}

// ---------------------------------------------------------------------------
// LoadReport – drop diagnostics
// ---------------------------------------------------------------------------

/// Row-level diagnostics gathered while loading and coercing a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Rows read from the source before coercion.
    pub total_rows: usize,
    /// Rows discarded because a required field failed coercion.
    pub dropped_rows: usize,
    /// Which column caused each drop (first failing column per row).
    pub dropped_by_column: BTreeMap<String, usize>,
}

impl LoadReport {
    pub fn record_drop(&mut self, column: &str) {
        self.dropped_rows += 1;
        *self.dropped_by_column.entry(column.to_string()).or_default() += 1;
    }

    pub fn kept_rows(&self) -> usize {
        self.total_rows - self.dropped_rows
    }
}

/// A table together with the diagnostics of the load that produced it.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub report: LoadReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_picks_narrowest_type() {
        assert_eq!(CellValue::guess("2020"), CellValue::Integer(2020));
        assert_eq!(CellValue::guess("2.5"), CellValue::Float(2.5));
        assert_eq!(CellValue::guess("true"), CellValue::Bool(true));
        assert_eq!(CellValue::guess("  "), CellValue::Null);
        assert_eq!(CellValue::guess("D"), CellValue::String("D".into()));
    }

    #[test]
    fn whole_floats_read_as_years() {
        assert_eq!(CellValue::Float(2019.0).as_i64(), Some(2019));
        assert_eq!(CellValue::Float(2019.5).as_i64(), None);
        assert_eq!(CellValue::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn derived_column_is_indexed() {
        let mut row = Record::default();
        row.cells.insert("a".into(), CellValue::Integer(3));
        let table = Table::from_rows(vec!["a".into()], vec![row]);
        let derived = table.with_derived_column("double", |r| {
            CellValue::Integer(r.get("a").and_then(CellValue::as_i64).unwrap_or(0) * 2)
        });
        assert_eq!(derived.column_names, vec!["a", "double"]);
        assert!(derived.unique_values["double"].contains(&CellValue::Integer(6)));
    }

    #[test]
    fn nulls_export_as_empty_text() {
        assert_eq!(CellValue::Null.csv_text(), "");
        assert_eq!(
            CellValue::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()).csv_text(),
            "2021-03-04"
        );
    }
}
