//! Population forecasting by LGA and age group, with a model evaluation
//! matrix and a population map for one year.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::color::{ColorRamp, LegendEntry};
use crate::data::filter::{select, AggFn};
use crate::data::loader::{GeometrySource, TableSchema};
use crate::data::model::CellValue;
use crate::error::{DashboardError, Result};
use crate::forecast::{evaluation_matrix, EvaluationRow, ForecastOutcome, Forecaster, Strategy};
use crate::pipeline::{MeltColumns, MeltSpec, Notice, Pipeline, PipelineSpec};
use crate::present::{records_to_csv, to_chart_series, to_map_points, ChartPoint, GeometryLookup, MapPoint};

const LGA: &str = "LGA";
const LGA_CODE: &str = "LGA_CODE";
const YEAR: &str = "Year";
const TOTAL: &str = "Total Population";
const GEO_POINT: &str = "Geo Point";
const AGE_GROUP: &str = "Age Group";
const POPULATION: &str = "Population";

#[derive(Debug, Clone)]
pub struct PopulationForecastParams {
    pub lga: String,
    /// Age-group column headers, e.g. `0-4`.
    pub age_groups: Vec<String>,
    pub horizon: usize,
    /// Year drawn on the population map; `None` skips the map.
    pub map_year: Option<i64>,
}

impl Default for PopulationForecastParams {
    fn default() -> Self {
        PopulationForecastParams {
            lga: String::new(),
            age_groups: vec!["0-4".into(), "20-24".into()],
            horizon: 5,
            map_year: Some(2021),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationForecast {
    pub lga: String,
    pub history: Vec<ChartPoint>,
    pub seasonal: ForecastOutcome,
    pub arima: ForecastOutcome,
    pub evaluation: Vec<EvaluationRow>,
    pub map: Vec<MapPoint>,
    pub legend: Vec<LegendEntry>,
    pub notices: Vec<Notice>,
}

impl PageOutput for PopulationForecast {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The evaluation matrix.
    fn export_csv(&self) -> Result<Vec<u8>> {
        records_to_csv(&self.evaluation)
    }
}

pub fn render(ctx: &PageContext, params: &PopulationForecastParams) -> Result<PopulationForecast> {
    let horizon = ctx.bounds().validate_horizon(params.horizon)?;
    if params.age_groups.is_empty() {
        return Err(DashboardError::InvalidInput(
            "select at least one age group".into(),
        ));
    }
    let map_year = params
        .map_year
        .map(|y| ctx.bounds().validate_year(y))
        .transpose()?;

    let seasonal = ctx.config.forecast.seasonal();
    let arima = ctx.config.forecast.arima();
    let source = ctx.source(&ctx.config.sources.lga_population);

    let mut required = vec![LGA, YEAR];
    required.extend(params.age_groups.iter().map(String::as_str));
    let schema = TableSchema::new("LGA population")
        .require(&required)
        .years(&[YEAR])
        .numeric(&params.age_groups);

    let spec = PipelineSpec::new(&source, schema)
        .filters(select(LGA, &[params.lga.as_str()]))
        .melt(MeltSpec {
            columns: MeltColumns::Values(params.age_groups.clone()),
            var_name: AGE_GROUP.into(),
            value_name: POPULATION.into(),
            coerce: None,
        })
        .group_by(&[AGE_GROUP, YEAR])
        .measure(POPULATION, AggFn::Sum)
        .horizon(horizon);

    let pipeline = Pipeline::new(ctx.cache).with_forecaster(&seasonal);
    let out = pipeline.run(&spec)?;
    let mut notices = out.notices;

    let seasonal_outcome = out.forecast.unwrap_or_else(|| empty_outcome(&seasonal));
    let arima_outcome = if out.series.is_empty() {
        empty_outcome(&arima)
    } else {
        let (outcome, skipped) = pipeline.project_with("LGA population", &out.series, &arima, horizon)?;
        notices.extend(skipped);
        outcome
    };

    let evaluation = match holdout(&out.series, horizon) {
        Some(holdout) => {
            let (rows, skipped) =
                evaluation_matrix(&out.series, &[&seasonal as &dyn Forecaster, &arima], holdout);
            notices.extend(skipped.into_iter().map(|s| {
                Notice::warning(format!("cannot evaluate {}: {}", s.category, s.reason))
            }));
            rows
        }
        None => Vec::new(),
    };

    let (map, legend) = match map_year {
        Some(year) => population_map(ctx, year, &mut notices)?,
        None => (Vec::new(), Vec::new()),
    };

    Ok(PopulationForecast {
        lga: params.lga.clone(),
        history: to_chart_series(&out.grouped),
        seasonal: seasonal_outcome,
        arima: arima_outcome,
        evaluation,
        map,
        legend,
        notices,
    })
}

fn empty_outcome(strategy: &Strategy) -> ForecastOutcome {
    ForecastOutcome {
        model: strategy.name().to_string(),
        ..ForecastOutcome::default()
    }
}

/// Points held out for evaluation: the horizon, capped so every series keeps
/// at least one training point.
fn holdout(series: &BTreeMap<String, Vec<(i64, f64)>>, horizon: usize) -> Option<usize> {
    let shortest = series.values().map(Vec::len).min()?;
    let holdout = horizon.min(shortest.saturating_sub(1));
    (holdout > 0).then_some(holdout)
}

/// `Total Population` of every LGA in `year`, placed at its `Geo Point`.
fn population_map(
    ctx: &PageContext,
    year: i64,
    notices: &mut Vec<Notice>,
) -> Result<(Vec<MapPoint>, Vec<LegendEntry>)> {
    let coordinates_schema = TableSchema::new("LGA coordinates")
        .require(&[LGA_CODE, GEO_POINT])
        .geometry(GeometrySource::LatLonText(GEO_POINT.into()));
    let coordinates = ctx.cache.get_or_load(
        &ctx.source(&ctx.config.sources.lga_coordinates),
        &coordinates_schema,
    )?;
    let lookup = GeometryLookup::from_table(&coordinates.table, LGA_CODE);

    let totals_schema = TableSchema::new("LGA population totals")
        .require(&[LGA_CODE, YEAR, TOTAL])
        .years(&[YEAR])
        .numeric(&[TOTAL]);
    let spec = PipelineSpec::new(ctx.source(&ctx.config.sources.lga_population), totals_schema)
        .filters(select(YEAR, &[year.to_string()]))
        .group_by(&[LGA_CODE])
        .measure(TOTAL, AggFn::Sum);
    let out = Pipeline::<Strategy>::new(ctx.cache).run(&spec)?;
    notices.extend(out.notices);

    let names: BTreeMap<String, String> = out
        .selected
        .rows
        .iter()
        .filter_map(|r| Some((r.get(LGA_CODE)?.to_string(), r.get(LGA)?.to_string())))
        .collect();
    let mut points = to_map_points(&out.grouped, &lookup);
    for point in &mut points {
        if let Some(name) = names.get(&point.label) {
            point.label = format!("{name} ({})", point.label);
        }
    }
    let unmatched = out.grouped.len() - points.len();
    if unmatched > 0 {
        notices.push(Notice::warning(format!(
            "{unmatched} LGAs have no coordinates for {year}"
        )));
    }

    let legend = ColorRamp::spanning(points.iter().map(|p| p.weight))
        .map(|ramp| ramp.legend_entries(5))
        .unwrap_or_default();
    Ok((points, legend))
}

/// Distinct LGA names, for the selector.
pub fn lga_options(ctx: &PageContext) -> Result<Vec<CellValue>> {
    let schema = TableSchema::new("LGA names").require(&[LGA]);
    let loaded = ctx
        .cache
        .get_or_load(&ctx.source(&ctx.config.sources.lga_population), &schema)?;
    Ok(loaded
        .table
        .unique_values
        .get(LGA)
        .map(|values| values.iter().cloned().collect())
        .unwrap_or_default())
}
