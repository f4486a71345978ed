//! Vehicle registrations by year of manufacture, with an ARIMA forecast.

use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::data::filter::{select, AggFn};
use crate::data::loader::TableSchema;
use crate::data::model::CellValue;
use crate::error::Result;
use crate::forecast::{evaluate, ForecastMetrics, ForecastOutcome, ForecastRecord, Forecaster};
use crate::pipeline::{Notice, Pipeline, PipelineSpec};
use crate::present::{records_to_csv, to_chart_series, ChartPoint};

const FUEL: &str = "CD_CL_FUEL_ENG";
const YEAR: &str = "NB_YEAR_MFC_VEH";
const TOTAL: &str = "TOTAL1";

/// Registrations for the current year are incomplete and left out.
const INCOMPLETE_YEAR: i64 = 2024;

/// Fuel code → description, as shown next to the fuel filter.
pub const FUEL_TYPES: &[(&str, &str)] = &[
    ("D", "Diesel"),
    ("G", "Gasoline"),
    ("O", "Other"),
    ("M", "Methanol"),
    ("P", "Propane"),
    ("R", "Electric"),
    ("S", "Hybrid"),
    ("E", "Ethanol"),
];

pub fn fuel_description(code: &str) -> Option<&'static str> {
    FUEL_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, description)| *description)
}

#[derive(Debug, Clone)]
pub struct VehicleForecastParams {
    /// Fuel codes to include; empty means all.
    pub fuel_types: Vec<String>,
    pub horizon: usize,
}

impl Default for VehicleForecastParams {
    fn default() -> Self {
        VehicleForecastParams {
            fuel_types: Vec::new(),
            horizon: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct YearTotal {
    pub year: i64,
    pub total_registrations: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuelLegend {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleForecast {
    pub history: Vec<YearTotal>,
    pub chart: Vec<ChartPoint>,
    pub forecast: ForecastOutcome,
    /// Retrodiction error over the last `min(horizon, n - 1)` years.
    pub evaluation: Option<ForecastMetrics>,
    pub fuel_legend: Vec<FuelLegend>,
    pub notices: Vec<Notice>,
}

impl PageOutput for VehicleForecast {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Yearly totals followed by the predicted years.
    fn export_csv(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Row {
            year: i64,
            total_registrations: Option<f64>,
            predicted_registrations: Option<f64>,
        }
        let rows: Vec<Row> = self
            .history
            .iter()
            .map(|h| Row {
                year: h.year,
                total_registrations: Some(h.total_registrations),
                predicted_registrations: None,
            })
            .chain(self.forecast.records.iter().map(|r: &ForecastRecord| Row {
                year: r.year,
                total_registrations: None,
                predicted_registrations: Some(r.value),
            }))
            .collect();
        records_to_csv(&rows)
    }
}

pub fn render(ctx: &PageContext, params: &VehicleForecastParams) -> Result<VehicleForecast> {
    let horizon = ctx.bounds().validate_horizon(params.horizon)?;
    let arima = ctx.config.forecast.arima();

    let schema = TableSchema::new("vehicle registrations")
        .require(&[YEAR, FUEL])
        .years(&[YEAR])
        .numeric(&[TOTAL]);
    let spec = PipelineSpec::new(ctx.source(&ctx.config.sources.vehicle_registrations), schema)
        .filters(select(FUEL, &params.fuel_types))
        .exclude(YEAR, CellValue::Integer(INCOMPLETE_YEAR))
        .group_by(&[YEAR])
        .measure(TOTAL, AggFn::Sum)
        .horizon(horizon);

    let out = Pipeline::new(ctx.cache).with_forecaster(&arima).run(&spec)?;
    let mut notices = out.notices;

    let points = out.series.get(TOTAL).cloned().unwrap_or_default();
    let evaluation = if points.len() > 1 {
        let holdout = horizon.min(points.len() - 1);
        match evaluate(&arima, TOTAL, &points, holdout) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                notices.push(Notice::from_error(e)?);
                None
            }
        }
    } else {
        None
    };

    let fuel_legend = FUEL_TYPES
        .iter()
        .map(|(code, description)| FuelLegend {
            code: code.to_string(),
            description: description.to_string(),
        })
        .collect();

    Ok(VehicleForecast {
        history: points
            .iter()
            .map(|&(year, total_registrations)| YearTotal {
                year,
                total_registrations,
            })
            .collect(),
        chart: to_chart_series(&out.grouped),
        forecast: out.forecast.unwrap_or_else(|| ForecastOutcome {
            model: arima.name().to_string(),
            ..ForecastOutcome::default()
        }),
        evaluation,
        fuel_legend,
        notices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::FileCache;
    use crate::pages::fixtures::DataDir;

    fn data_dir(years: std::ops::Range<i64>) -> DataDir {
        let data = DataDir::new();
        let mut body = String::from("NB_YEAR_MFC_VEH,CD_CL_FUEL_ENG,TOTAL1\n");
        for year in years {
            let step = (year - 2000) as f64;
            body.push_str(&format!("{year},D,{}\n", 100.0 + 10.0 * step));
            body.push_str(&format!("{year},R,{}\n", 1.0 + step * step));
        }
        body.push_str("2024,D,5\nunknown,D,7\n");
        data.write(&data.config.sources.vehicle_registrations, &body);
        data
    }

    #[test]
    fn sums_selected_fuels_and_drops_incomplete_year() {
        let data = data_dir(2000..2020);
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &VehicleForecastParams {
                fuel_types: vec!["D".into()],
                horizon: 3,
            },
        )
        .unwrap();

        assert_eq!(page.history.len(), 20);
        assert_eq!(page.history[0].year, 2000);
        assert_eq!(page.history[0].total_registrations, 100.0);
        assert!(page.history.iter().all(|h| h.year != INCOMPLETE_YEAR));
        let years: Vec<i64> = page.forecast.records.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2020, 2021, 2022]);
        let metrics = page.evaluation.unwrap();
        assert_eq!(metrics.points, 3);
        assert!(metrics.mae < 1e-6);
    }

    #[test]
    fn all_fuels_when_none_selected() {
        let data = data_dir(2000..2020);
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &VehicleForecastParams::default()).unwrap();
        assert_eq!(page.history[1].total_registrations, 110.0 + 2.0);
        assert_eq!(page.fuel_legend.len(), 8);
    }

    #[test]
    fn short_history_skips_forecast_with_notice() {
        let data = data_dir(2015..2020);
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &VehicleForecastParams::default()).unwrap();
        assert_eq!(page.history.len(), 5);
        assert!(page.forecast.records.is_empty());
        assert_eq!(page.forecast.skipped.len(), 1);
        assert!(page.evaluation.is_none());
        assert_eq!(page.notices.len(), 2);
    }

    #[test]
    fn export_lists_history_then_predictions() {
        let data = data_dir(2000..2020);
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &VehicleForecastParams {
                fuel_types: vec!["D".into()],
                horizon: 2,
            },
        )
        .unwrap();
        let csv = String::from_utf8(page.export_csv().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "year,total_registrations,predicted_registrations");
        assert_eq!(lines[1], "2000,100.0,");
        assert_eq!(lines.len(), 1 + 20 + 2);
        assert!(lines[21].starts_with("2020,,"));
    }

    #[test]
    fn fuel_codes_have_descriptions() {
        assert_eq!(fuel_description("R"), Some("Electric"));
        assert_eq!(fuel_description("X"), None);
    }
}
