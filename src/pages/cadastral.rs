//! Cadastral parcels: simplified outlines for the map, the view centre and a
//! per-column description.

use std::collections::BTreeMap;

use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::data::geo::{mean_centroid, simplify, vertex_count};
use crate::data::loader::TableSchema;
use crate::data::model::{CellValue, Table};
use crate::error::{DashboardError, Result};
use crate::pipeline::Notice;
use crate::present::{describe, records_to_csv, Summary};

#[derive(Debug, Clone, Default)]
pub struct CadastralParams {
    /// Overrides the configured simplification tolerance.
    pub tolerance: Option<f64>,
}

/// `describe`-style view of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub unique: usize,
    /// Most frequent value.
    pub top: Option<String>,
    pub freq: Option<usize>,
    /// Present when every non-null value is numeric.
    pub numeric: Option<Summary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewCentre {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cadastral {
    pub parcels: usize,
    pub tolerance: f64,
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub centre: Option<ViewCentre>,
    pub columns: Vec<ColumnSummary>,
    pub geojson: FeatureCollection,
    pub notices: Vec<Notice>,
}

impl PageOutput for Cadastral {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The column description table.
    fn export_csv(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Row<'a> {
            column: &'a str,
            count: usize,
            unique: usize,
            top: Option<&'a str>,
            freq: Option<usize>,
            mean: Option<f64>,
            std: Option<f64>,
            min: Option<f64>,
            max: Option<f64>,
        }
        let rows: Vec<Row> = self
            .columns
            .iter()
            .map(|c| Row {
                column: &c.column,
                count: c.count,
                unique: c.unique,
                top: c.top.as_deref(),
                freq: c.freq,
                mean: c.numeric.as_ref().map(|s| s.mean),
                std: c.numeric.as_ref().and_then(|s| s.std),
                min: c.numeric.as_ref().map(|s| s.min),
                max: c.numeric.as_ref().map(|s| s.max),
            })
            .collect();
        records_to_csv(&rows)
    }
}

pub fn render(ctx: &PageContext, params: &CadastralParams) -> Result<Cadastral> {
    let tolerance = params
        .tolerance
        .unwrap_or(ctx.config.cadastral.simplify_tolerance);
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(DashboardError::InvalidInput(format!(
            "simplification tolerance {tolerance} must be a non-negative number"
        )));
    }

    let loaded = ctx.cache.get_or_load(
        &ctx.source(&ctx.config.sources.cadastral),
        &TableSchema::new("cadastral parcels"),
    )?;
    let table = &loaded.table;
    let mut notices = Vec::new();
    if table.is_empty() {
        notices.push(Notice::info("the parcel file has no features"));
    }

    let simplified: Vec<Option<geo::Geometry<f64>>> = table
        .rows
        .iter()
        .map(|r| r.geometry.as_ref().map(|g| simplify(g, tolerance)))
        .collect();
    let vertices_before = table
        .rows
        .iter()
        .filter_map(|r| r.geometry.as_ref())
        .map(vertex_count)
        .sum();
    let vertices_after = simplified.iter().flatten().map(vertex_count).sum();
    let missing = simplified.iter().filter(|g| g.is_none()).count();
    if missing > 0 {
        notices.push(Notice::warning(format!("{missing} parcels have no geometry")));
    }

    let centre = mean_centroid(simplified.iter().flatten()).map(|p| ViewCentre {
        lat: p.y(),
        lon: p.x(),
    });

    Ok(Cadastral {
        parcels: table.len(),
        tolerance,
        vertices_before,
        vertices_after,
        centre,
        columns: column_summaries(table),
        geojson: feature_collection(table, &simplified)?,
        notices,
    })
}

fn column_summaries(table: &Table) -> Vec<ColumnSummary> {
    table
        .column_names
        .iter()
        .map(|column| {
            let values: Vec<&CellValue> = table
                .rows
                .iter()
                .filter_map(|r| r.get(column))
                .filter(|v| !v.is_null())
                .collect();
            let mut counts: BTreeMap<&CellValue, usize> = BTreeMap::new();
            for v in &values {
                *counts.entry(*v).or_default() += 1;
            }
            let top = counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(v, n)| (v.to_string(), *n));
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            let numeric = if !numbers.is_empty() && numbers.len() == values.len() {
                describe(&numbers)
            } else {
                None
            };
            ColumnSummary {
                column: column.clone(),
                count: values.len(),
                unique: counts.len(),
                top: top.as_ref().map(|(v, _)| v.clone()),
                freq: top.map(|(_, n)| n),
                numeric,
            }
        })
        .collect()
}

fn feature_collection(
    table: &Table,
    geometries: &[Option<geo::Geometry<f64>>],
) -> Result<FeatureCollection> {
    let features = table
        .rows
        .iter()
        .zip(geometries)
        .map(|(row, geometry)| -> Result<Feature> {
            let mut properties = JsonObject::new();
            for (column, value) in &row.cells {
                properties.insert(column.clone(), serde_json::to_value(value)?);
            }
            Ok(Feature {
                bbox: None,
                geometry: geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<Feature>>>()?;
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}
