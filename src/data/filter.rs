use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::debug;
use serde::Serialize;

use super::model::{CellValue, LoadReport, LoadedTable, Record, Table};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// A column absent from the map is unconstrained. A column present with an
/// empty set selects nothing.
pub type FilterState = BTreeMap<String, BTreeSet<CellValue>>;

/// Build a one-column selection from user-supplied labels.
/// An empty label list means "no filter" and yields an empty state.
pub fn select<S: AsRef<str>>(column: &str, labels: &[S]) -> FilterState {
    let mut state = FilterState::new();
    if !labels.is_empty() {
        state.insert(
            column.to_string(),
            labels.iter().map(|l| CellValue::guess(l.as_ref())).collect(),
        );
    }
    state
}

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
pub fn filtered_indices(table: &Table, filters: &FilterState) -> Vec<usize> {
    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            for (col, selected) in filters {
                if selected.is_empty() {
                    return false;
                }
                // All unique values selected → no effective filter
                if let Some(all_vals) = table.unique_values.get(col) {
                    if !all_vals.is_empty() && all_vals.is_subset(selected) {
                        continue;
                    }
                }
                match row.cells.get(col) {
                    Some(val) => {
                        if !selected.contains(val) {
                            return false;
                        }
                    }
                    None => {
                        if !selected.contains(&CellValue::Null) {
                            return false;
                        }
                    }
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}

/// Indices of rows whose `column` does not equal `value`.
pub fn excluding(table: &Table, indices: &[usize], column: &str, value: &CellValue) -> Vec<usize> {
    indices
        .iter()
        .copied()
        .filter(|&i| table.rows[i].get(column) != Some(value))
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// How rows sharing a group key are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    Sum,
    Mean,
    Count,
}

/// Aggregated `(group key…) → value` mapping.
///
/// The last key is conventionally the time key; the preceding keys form the
/// category. Each key tuple appears once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedSeries {
    pub keys: Vec<String>,
    pub measure: Option<String>,
    pub agg: AggFn,
    pub groups: BTreeMap<Vec<CellValue>, f64>,
    /// Matching rows left out because a key was null or the measure non-numeric.
    pub skipped_rows: usize,
}

impl GroupedSeries {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Label of the category part of a key tuple (all keys but the last).
    pub fn category_label(&self, key: &[CellValue]) -> String {
        match key.split_last() {
            Some((_, category)) if !category.is_empty() => category
                .iter()
                .map(CellValue::to_string)
                .collect::<Vec<_>>()
                .join(" / "),
            _ => self.series_name(),
        }
    }

    /// Name used for a single-key series (the measure, or `count`).
    pub fn series_name(&self) -> String {
        self.measure.clone().unwrap_or_else(|| "count".to_string())
    }

    /// Split into per-category `(year, value)` series, sorted by year.
    ///
    /// The last key must hold integer years; tuples whose time key is not an
    /// integer are skipped.
    pub fn yearly_series(&self) -> BTreeMap<String, Vec<(i64, f64)>> {
        let mut out: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
        for (key, value) in &self.groups {
            let Some(year) = key.last().and_then(CellValue::as_i64) else {
                continue;
            };
            out.entry(self.category_label(key))
                .or_default()
                .push((year, *value));
        }
        for points in out.values_mut() {
            points.sort_by_key(|(year, _)| *year);
        }
        out
    }

    /// Total per category label, used for map weights.
    pub fn category_totals(&self) -> BTreeMap<String, f64> {
        let mut out: BTreeMap<String, f64> = BTreeMap::new();
        for (key, value) in &self.groups {
            let label = match key.len() {
                1 => key[0].to_string(),
                _ => self.category_label(key),
            };
            *out.entry(label).or_default() += value;
        }
        out
    }
}

/// Filter `table` and aggregate `measure` by `group_keys`.
///
/// `measure` may be `None` only for [`AggFn::Count`]. Zero matching rows
/// yields an empty series, not an error; unknown columns are a schema error.
pub fn filter_and_aggregate(
    table: &Table,
    filters: &FilterState,
    group_keys: &[&str],
    measure: Option<&str>,
    agg: AggFn,
) -> Result<GroupedSeries> {
    let indices = filtered_indices(table, filters);
    aggregate_rows(table, &indices, group_keys, measure, agg)
}

/// Aggregate the rows at `indices`.
pub fn aggregate_rows(
    table: &Table,
    indices: &[usize],
    group_keys: &[&str],
    measure: Option<&str>,
    agg: AggFn,
) -> Result<GroupedSeries> {
    for column in group_keys.iter().copied().chain(measure) {
        if !table.has_column(column) {
            return Err(DashboardError::missing_column(column, Path::new("<table>")));
        }
    }
    if measure.is_none() && agg != AggFn::Count {
        return Err(DashboardError::InvalidInput(format!(
            "{agg:?} aggregation needs a measure column"
        )));
    }

    let mut sums: BTreeMap<Vec<CellValue>, (f64, usize)> = BTreeMap::new();
    let mut skipped_rows = 0;

    'rows: for &i in indices {
        let row = &table.rows[i];
        let mut key = Vec::with_capacity(group_keys.len());
        for column in group_keys {
            match row.get(column) {
                Some(v) if !v.is_null() => key.push(v.clone()),
                _ => {
                    skipped_rows += 1;
                    continue 'rows;
                }
            }
        }
        let value = match (agg, measure) {
            (AggFn::Count, _) => 0.0,
            (_, Some(m)) => match row.measure(m) {
                Some(v) => v,
                None => {
                    skipped_rows += 1;
                    continue;
                }
            },
            (_, None) => continue,
        };
        let slot = sums.entry(key).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }

    let groups = sums
        .into_iter()
        .map(|(key, (sum, n))| {
            let value = match agg {
                AggFn::Sum => sum,
                AggFn::Mean => sum / n as f64,
                AggFn::Count => n as f64,
            };
            (key, value)
        })
        .collect();

    if skipped_rows > 0 {
        debug!("aggregation by {group_keys:?} skipped {skipped_rows} rows");
    }

    Ok(GroupedSeries {
        keys: group_keys.iter().map(|k| k.to_string()).collect(),
        measure: measure.map(str::to_string),
        agg,
        groups,
        skipped_rows,
    })
}

// ---------------------------------------------------------------------------
// Reshaping
// ---------------------------------------------------------------------------

/// Unpivot a wide table: every column not in `id_columns` becomes a row with
/// `var_name` = the column header and `value_name` = the cell.
///
/// The result still needs coercing (e.g. `var_name` to a year column).
pub fn melt(table: &Table, id_columns: &[&str], var_name: &str, value_name: &str) -> LoadedTable {
    let value_columns: Vec<&String> = table
        .column_names
        .iter()
        .filter(|c| !id_columns.contains(&c.as_str()))
        .collect();

    let mut rows = Vec::with_capacity(table.len() * value_columns.len());
    for row in &table.rows {
        for column in &value_columns {
            let mut cells: BTreeMap<String, CellValue> = id_columns
                .iter()
                .filter_map(|id| row.get(id).map(|v| (id.to_string(), v.clone())))
                .collect();
            cells.insert(var_name.to_string(), CellValue::String(column.to_string()));
            cells.insert(
                value_name.to_string(),
                row.get(column).cloned().unwrap_or(CellValue::Null),
            );
            rows.push(Record {
                cells,
                geometry: row.geometry.clone(),
            });
        }
    }

    let mut column_names: Vec<String> = id_columns.iter().map(|c| c.to_string()).collect();
    column_names.push(var_name.to_string());
    column_names.push(value_name.to_string());

    let report = LoadReport {
        total_rows: rows.len(),
        ..LoadReport::default()
    };
    LoadedTable {
        table: Table::from_rows(column_names, rows),
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, CellValue)]) -> Record {
        Record {
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            geometry: None,
        }
    }

    fn vehicles() -> Table {
        use CellValue::*;
        Table::from_rows(
            vec!["year".into(), "fuel".into(), "total".into()],
            vec![
                row(&[("year", Integer(2019)), ("fuel", String("D".into())), ("total", Float(5.0))]),
                row(&[("year", Integer(2019)), ("fuel", String("G".into())), ("total", Float(7.0))]),
                row(&[("year", Integer(2020)), ("fuel", String("D".into())), ("total", Float(3.0))]),
                row(&[("year", Integer(2020)), ("fuel", String("E".into())), ("total", Float(11.0))]),
                row(&[("year", Integer(2020)), ("fuel", String("D".into())), ("total", Null)]),
            ],
        )
    }

    #[test]
    fn sums_match_matching_raw_rows() {
        let table = vehicles();
        let filters = select("fuel", &["D", "G"]);
        let series =
            filter_and_aggregate(&table, &filters, &["fuel", "year"], Some("total"), AggFn::Sum)
                .unwrap();

        let categories: BTreeSet<String> =
            series.groups.keys().map(|k| series.category_label(k)).collect();
        assert_eq!(categories, BTreeSet::from(["D".to_string(), "G".to_string()]));
        assert_eq!(series.groups.values().sum::<f64>(), 5.0 + 7.0 + 3.0);
        assert_eq!(series.skipped_rows, 1);
    }

    #[test]
    fn empty_filter_means_everything() {
        let table = vehicles();
        let series =
            filter_and_aggregate(&table, &FilterState::new(), &["year"], Some("total"), AggFn::Sum)
                .unwrap();
        let yearly = series.yearly_series();
        assert_eq!(yearly["total"], vec![(2019, 12.0), (2020, 14.0)]);
    }

    #[test]
    fn explicitly_empty_selection_matches_nothing() {
        let table = vehicles();
        let mut filters = FilterState::new();
        filters.insert("fuel".into(), BTreeSet::new());
        let series =
            filter_and_aggregate(&table, &filters, &["year"], Some("total"), AggFn::Sum).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn mean_and_count() {
        let table = vehicles();
        let mean = filter_and_aggregate(&table, &FilterState::new(), &["year"], Some("total"), AggFn::Mean)
            .unwrap();
        assert_eq!(mean.groups[&vec![CellValue::Integer(2020)]], 7.0);

        let count =
            filter_and_aggregate(&table, &FilterState::new(), &["fuel"], None, AggFn::Count).unwrap();
        assert_eq!(count.groups[&vec![CellValue::String("D".into())]], 3.0);
    }

    #[test]
    fn unknown_group_key_is_schema_error() {
        let err = filter_and_aggregate(&vehicles(), &FilterState::new(), &["suburb"], None, AggFn::Count)
            .unwrap_err();
        assert!(matches!(err, DashboardError::Schema { .. }));
    }

    #[test]
    fn excluding_drops_one_value() {
        let table = vehicles();
        let all: Vec<usize> = (0..table.len()).collect();
        let kept = excluding(&table, &all, "year", &CellValue::Integer(2020));
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn melt_unpivots_year_columns() {
        use CellValue::*;
        let wide = Table::from_rows(
            vec!["Sex".into(), "Age".into(), "2001".into(), "2002".into()],
            vec![row(&[
                ("Sex", String("Male".into())),
                ("Age", Integer(20)),
                ("2001", String("1,200".into())),
                ("2002", Integer(1300)),
            ])],
        );
        let long = melt(&wide, &["Sex", "Age"], "Year", "Population");
        assert_eq!(long.table.len(), 2);
        assert_eq!(long.table.column_names, vec!["Sex", "Age", "Year", "Population"]);
        assert_eq!(long.table.rows[1].get("Year"), Some(&String("2002".into())));
        assert_eq!(long.table.rows[1].get("Population"), Some(&Integer(1300)));
    }
}
