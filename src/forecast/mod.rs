//! Forecasting layer: fit a model to a short yearly series and project it.
//!
//! ```text
//!  GroupedSeries ──► yearly_series() ──► per-category [(year, value)]
//!                                               │
//!                                               ▼
//!                                     ┌───────────────────┐
//!                                     │  dyn Forecaster    │  linear / arima / seasonal
//!                                     └───────────────────┘
//!                                               │
//!                                               ▼
//!                                 ForecastOutcome { records, skipped }
//! ```

pub mod arima;
pub mod linear;
pub mod lstsq;
pub mod seasonal;

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;

pub use arima::Arima;
pub use linear::LinearTrend;
pub use seasonal::SeasonalCurve;

use crate::error::{DashboardError, Result};

/// Minimum distinct years any strategy is attempted on.
pub const MIN_POINTS: usize = 2;

// ---------------------------------------------------------------------------
// Strategy interface
// ---------------------------------------------------------------------------

/// One fit/project capability.
///
/// `history` is sorted by year with distinct years. Implementations return
/// exactly `horizon` values for the years following the last observed one.
pub trait Forecaster {
    /// Label used in evaluation tables.
    fn name(&self) -> &'static str;

    /// Fewest points the strategy can fit.
    fn min_history(&self) -> usize;

    /// Project `horizon` steps past the end of `history`.
    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>>;
}

/// The built-in strategies, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Strategy {
    Linear,
    Arima { p: usize, d: usize },
    Seasonal { period: f64, harmonics: usize },
}

impl Strategy {
    fn as_forecaster(&self) -> Box<dyn Forecaster> {
        match *self {
            Strategy::Linear => Box::new(LinearTrend),
            Strategy::Arima { p, d } => Box::new(Arima::new(p, d)),
            Strategy::Seasonal { period, harmonics } => {
                Box::new(SeasonalCurve::new(period, harmonics))
            }
        }
    }
}

impl Forecaster for Strategy {
    fn name(&self) -> &'static str {
        self.as_forecaster().name()
    }

    fn min_history(&self) -> usize {
        self.as_forecaster().min_history()
    }

    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>> {
        self.as_forecaster().fit_project(history, horizon)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A projected value for one category and future year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub category: String,
    pub year: i64,
    pub value: f64,
}

/// A category that could not be forecast, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCategory {
    pub category: String,
    pub reason: String,
}

/// Result of forecasting every category of a series.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ForecastOutcome {
    pub model: String,
    pub records: Vec<ForecastRecord>,
    pub skipped: Vec<SkippedCategory>,
}

impl ForecastOutcome {
    /// Records projected for `year`, one per category at most.
    pub fn for_year(&self, year: i64) -> Vec<ForecastRecord> {
        self.records
            .iter()
            .filter(|r| r.year == year)
            .cloned()
            .collect()
    }

    pub fn for_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ForecastRecord> {
        self.records.iter().filter(move |r| r.category == category)
    }
}

// ---------------------------------------------------------------------------
// Driving a forecaster over many categories
// ---------------------------------------------------------------------------

/// Sort by year, drop non-finite values and keep the last value of a
/// duplicated year.
pub fn prepare_history(points: &[(i64, f64)]) -> Vec<(i64, f64)> {
    let by_year: BTreeMap<i64, f64> = points
        .iter()
        .filter(|(_, v)| v.is_finite())
        .copied()
        .collect();
    by_year.into_iter().collect()
}

/// Forecast every category of `series` `horizon` years ahead.
///
/// Categories with fewer than two distinct years, or fewer than the model
/// needs, are skipped and logged. `horizon == 0` is rejected.
pub fn fit_and_project(
    series: &BTreeMap<String, Vec<(i64, f64)>>,
    forecaster: &dyn Forecaster,
    horizon: usize,
) -> Result<ForecastOutcome> {
    if horizon == 0 {
        return Err(DashboardError::InvalidInput(
            "forecast horizon must be at least one year".into(),
        ));
    }

    let mut outcome = ForecastOutcome {
        model: forecaster.name().to_string(),
        ..ForecastOutcome::default()
    };

    for (category, points) in series {
        match forecast_category(category, points, forecaster, horizon) {
            Ok(records) => outcome.records.extend(records),
            Err(e) if !e.is_fatal() => {
                warn!("{}: skipping '{category}': {e}", forecaster.name());
                outcome.skipped.push(SkippedCategory {
                    category: category.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}

fn forecast_category(
    category: &str,
    points: &[(i64, f64)],
    forecaster: &dyn Forecaster,
    horizon: usize,
) -> Result<Vec<ForecastRecord>> {
    let history = prepare_history(points);
    let needed = forecaster.min_history().max(MIN_POINTS);
    if history.len() < needed {
        return Err(DashboardError::InsufficientHistory {
            key: category.to_string(),
            needed,
            got: history.len(),
        });
    }
    let Some(&(last_year, _)) = history.last() else {
        return Ok(Vec::new());
    };

    let values = forecaster.fit_project(&history, horizon)?;
    Ok(values
        .into_iter()
        .zip(1..)
        .map(|(value, step)| ForecastRecord {
            category: category.to_string(),
            year: last_year + step,
            value,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Error of a retrodiction against held-out history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Number of compared points after truncation.
    pub points: usize,
}

/// One row of an evaluation matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRow {
    pub category: String,
    pub model: String,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
}

/// MAE / MSE / RMSE between `actual` and `predicted`.
///
/// Arrays of different length are truncated to the shorter one, never padded.
/// Returns `None` when nothing is left to compare.
pub fn error_metrics(actual: &[f64], predicted: &[f64]) -> Option<ForecastMetrics> {
    let n = actual.len().min(predicted.len());
    if actual.len() != predicted.len() {
        debug!(
            "truncating evaluation to {n} points ({} actual, {} predicted)",
            actual.len(),
            predicted.len()
        );
    }
    if n == 0 {
        return None;
    }
    let (abs, sq) = actual[..n]
        .iter()
        .zip(&predicted[..n])
        .fold((0.0, 0.0), |(abs, sq), (a, p)| {
            let e = a - p;
            (abs + e.abs(), sq + e * e)
        });
    let mse = sq / n as f64;
    Some(ForecastMetrics {
        mae: abs / n as f64,
        mse,
        rmse: mse.sqrt(),
        points: n,
    })
}

/// Fit on all but the last `holdout` points and score the projection against them.
pub fn evaluate(
    forecaster: &dyn Forecaster,
    category: &str,
    points: &[(i64, f64)],
    holdout: usize,
) -> Result<ForecastMetrics> {
    let history = prepare_history(points);
    if holdout == 0 || holdout >= history.len() {
        return Err(DashboardError::InsufficientHistory {
            key: category.to_string(),
            needed: holdout.max(1) + MIN_POINTS,
            got: history.len(),
        });
    }
    let (train, test) = history.split_at(history.len() - holdout);
    let predicted = forecast_category(category, train, forecaster, holdout)?;
    let actual: Vec<f64> = test.iter().map(|(_, v)| *v).collect();
    let predicted: Vec<f64> = predicted.into_iter().map(|r| r.value).collect();
    error_metrics(&actual, &predicted).ok_or_else(|| {
        DashboardError::Model(format!("no overlapping points to evaluate '{category}'"))
    })
}

/// Evaluate every category against every forecaster. Failing pairs are
/// returned as skips rather than rows.
pub fn evaluation_matrix(
    series: &BTreeMap<String, Vec<(i64, f64)>>,
    forecasters: &[&dyn Forecaster],
    holdout: usize,
) -> (Vec<EvaluationRow>, Vec<SkippedCategory>) {
    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for (category, points) in series {
        for forecaster in forecasters {
            match evaluate(*forecaster, category, points, holdout) {
                Ok(m) => rows.push(EvaluationRow {
                    category: category.clone(),
                    model: forecaster.name().to_string(),
                    mae: m.mae,
                    mse: m.mse,
                    rmse: m.rmse,
                }),
                Err(e) => {
                    warn!("{}: cannot evaluate '{category}': {e}", forecaster.name());
                    skipped.push(SkippedCategory {
                        category: format!("{category} ({})", forecaster.name()),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
    (rows, skipped)
}
