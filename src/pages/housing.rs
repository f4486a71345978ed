//! Housing development per suburb: historical developments up to the last
//! construction year, linear projections of area and dwellings after it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::color::{ColorRamp, LegendEntry};
use crate::data::filter::{aggregate_rows, AggFn, GroupedSeries};
use crate::data::loader::{GeometrySource, TableSchema};
use crate::data::model::{CellValue, Table};
use crate::error::{DashboardError, Result};
use crate::forecast::{ForecastRecord, Strategy};
use crate::pipeline::{Notice, Pipeline, PipelineSpec};
use crate::present::{records_to_csv, to_map_points, GeometryLookup, MapPoint};

const SUBURB: &str = "suburb";
const YEAR: &str = "consyear";
const AREA: &str = "shape_area";
const DWELLINGS: &str = "dwelling_c";
const GEO_SHAPE: &str = "geo_shape";

/// Projections run up to this year.
pub const LAST_FORECAST_YEAR: i64 = 2040;

#[derive(Debug, Clone)]
pub struct HousingParams {
    pub year: i64,
}

impl Default for HousingParams {
    fn default() -> Self {
        HousingParams { year: 2018 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuburbDevelopment {
    pub suburb: String,
    pub shape_area: Option<f64>,
    pub dwelling_c: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Housing {
    pub year: i64,
    /// Whether `suburbs` holds projections rather than recorded developments.
    pub forecast: bool,
    pub suburbs: Vec<SuburbDevelopment>,
    /// Suburb centroids weighted by development area.
    pub heatmap: Vec<MapPoint>,
    pub legend: Vec<LegendEntry>,
    pub notices: Vec<Notice>,
}

impl PageOutput for Housing {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    fn export_csv(&self) -> Result<Vec<u8>> {
        records_to_csv(&self.suburbs)
    }
}

pub fn render(ctx: &PageContext, params: &HousingParams) -> Result<Housing> {
    let year = ctx.bounds().validate_year(params.year)?;
    if year > LAST_FORECAST_YEAR {
        return Err(DashboardError::InvalidInput(format!(
            "housing projections end in {LAST_FORECAST_YEAR}"
        )));
    }

    let schema = TableSchema::new("housing development")
        .require(&[SUBURB, YEAR])
        .years(&[YEAR])
        .numeric(&[AREA, DWELLINGS])
        .geometry(GeometrySource::GeoJsonText(GEO_SHAPE.into()));
    let spec = PipelineSpec::new(ctx.source(&ctx.config.sources.housing_development), schema)
        .group_by(&[SUBURB, YEAR])
        .measure(AREA, AggFn::Mean);
    let pipeline = Pipeline::<Strategy>::new(ctx.cache);
    let out = pipeline.run(&spec)?;
    let mut notices = out.notices;
    let lookup = GeometryLookup::from_table(&out.loaded.table, SUBURB);

    let last_recorded = out
        .series
        .values()
        .filter_map(|points| points.last().map(|(y, _)| *y))
        .max();

    let (forecast, suburbs, heatmap) = match last_recorded {
        None => (false, Vec::new(), Vec::new()),
        Some(last) if year <= last => {
            let (suburbs, area) = recorded(&out.selected, year)?;
            if suburbs.is_empty() {
                notices.push(Notice::info(format!("no housing developments recorded in {year}")));
            }
            (false, suburbs, to_map_points(&area, &lookup))
        }
        Some(_) => {
            let all: Vec<usize> = (0..out.selected.len()).collect();
            let dwellings =
                aggregate_rows(&out.selected, &all, &[SUBURB, YEAR], Some(DWELLINGS), AggFn::Mean)?;
            let horizon = out
                .series
                .values()
                .filter_map(|points| points.last().map(|(y, _)| year - y))
                .max()
                .unwrap_or(0)
                .max(1) as usize;

            let (area, skipped) = pipeline.project_with(AREA, &out.series, &Strategy::Linear, horizon)?;
            notices.extend(skipped);
            let (dwellings, skipped) =
                pipeline.project_with(DWELLINGS, &dwellings.yearly_series(), &Strategy::Linear, horizon)?;
            notices.extend(skipped);

            let area = area.for_year(year);
            let suburbs = projected(&area, &dwellings.for_year(year));
            (true, suburbs, to_map_points(area.as_slice(), &lookup))
        }
    };

    let legend = ColorRamp::spanning(heatmap.iter().map(|p| p.weight))
        .map(|ramp| ramp.legend_entries(5))
        .unwrap_or_default();

    Ok(Housing {
        year,
        forecast,
        suburbs,
        heatmap,
        legend,
        notices,
    })
}

/// Developments completed in `year`, summed per suburb.
fn recorded(table: &Table, year: i64) -> Result<(Vec<SuburbDevelopment>, GroupedSeries)> {
    let target = CellValue::Integer(year);
    let in_year: Vec<usize> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.get(YEAR) == Some(&target))
        .map(|(i, _)| i)
        .collect();
    let area = aggregate_rows(table, &in_year, &[SUBURB], Some(AREA), AggFn::Sum)?;
    let dwellings = aggregate_rows(table, &in_year, &[SUBURB], Some(DWELLINGS), AggFn::Sum)?;

    let area_totals = area.category_totals();
    let dwelling_totals = dwellings.category_totals();
    let suburbs = merge(&area_totals, &dwelling_totals);
    Ok((suburbs, area))
}

fn projected(area: &[ForecastRecord], dwellings: &[ForecastRecord]) -> Vec<SuburbDevelopment> {
    let by_suburb = |records: &[ForecastRecord]| -> BTreeMap<String, f64> {
        records.iter().map(|r| (r.category.clone(), r.value)).collect()
    };
    merge(&by_suburb(area), &by_suburb(dwellings))
}

fn merge(area: &BTreeMap<String, f64>, dwellings: &BTreeMap<String, f64>) -> Vec<SuburbDevelopment> {
    let mut suburbs: Vec<&String> = area.keys().chain(dwellings.keys()).collect();
    suburbs.sort();
    suburbs.dedup();
    suburbs
        .into_iter()
        .map(|suburb| SuburbDevelopment {
            suburb: suburb.clone(),
            shape_area: area.get(suburb).copied(),
            dwelling_c: dwellings.get(suburb).copied(),
        })
        .collect()
}
