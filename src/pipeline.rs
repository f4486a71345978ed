//! The per-page pipeline: load → filter/aggregate → forecast.
//!
//! Pages configure one [`PipelineSpec`] per dataset instead of re-implementing
//! the sequence; everything past forecasting is presentation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::data::cache::FileCache;
use crate::data::filter::{
    aggregate_rows, excluding, filtered_indices, melt, AggFn, FilterState, GroupedSeries,
};
use crate::data::loader::{coerce_table, TableSchema};
use crate::data::model::{CellValue, LoadReport, LoadedTable, Record, Table};
use crate::error::{DashboardError, Result};
use crate::forecast::{fit_and_project, ForecastOutcome, Forecaster};

// ---------------------------------------------------------------------------
// Notices – non-fatal problems surfaced to the page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// A user-visible message that does not stop the render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Turn a non-fatal error into a notice; fatal errors are handed back.
    pub fn from_error(err: DashboardError) -> Result<Self> {
        match err {
            DashboardError::EmptySelection(_) => Ok(Notice::info(err.to_string())),
            e if !e.is_fatal() => Ok(Notice::warning(e.to_string())),
            e => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A column computed from each selected row.
pub type Derivation = fn(&Record) -> CellValue;

/// Which columns stay fixed when a wide table is unpivoted.
#[derive(Debug, Clone)]
pub enum MeltColumns {
    /// These columns are identifiers; every other column is melted.
    Ids(Vec<String>),
    /// Only these columns are melted; every other column is an identifier.
    Values(Vec<String>),
}

/// Wide → long reshaping applied to the selected rows.
#[derive(Debug, Clone)]
pub struct MeltSpec {
    pub columns: MeltColumns,
    pub var_name: String,
    pub value_name: String,
    /// Coercion of the long table (e.g. header text → year).
    pub coerce: Option<TableSchema>,
}

/// Declarative description of one dataset's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub source: PathBuf,
    pub schema: TableSchema,
    pub filters: FilterState,
    /// Rows whose column equals the value are removed after filtering.
    pub exclude: Vec<(String, CellValue)>,
    pub derived: Vec<(String, Derivation)>,
    pub melt: Option<MeltSpec>,
    /// Category keys followed by the time key.
    pub group_keys: Vec<String>,
    pub measure: Option<String>,
    pub agg: AggFn,
    pub horizon: usize,
}

impl PipelineSpec {
    pub fn new(source: impl Into<PathBuf>, schema: TableSchema) -> Self {
        PipelineSpec {
            source: source.into(),
            schema,
            filters: FilterState::new(),
            exclude: Vec::new(),
            derived: Vec::new(),
            melt: None,
            group_keys: Vec::new(),
            measure: None,
            agg: AggFn::Sum,
            horizon: 0,
        }
    }

    pub fn filters(mut self, filters: FilterState) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn exclude(mut self, column: &str, value: CellValue) -> Self {
        self.exclude.push((column.to_string(), value));
        self
    }

    pub fn derive(mut self, column: &str, derivation: Derivation) -> Self {
        self.derived.push((column.to_string(), derivation));
        self
    }

    pub fn melt(mut self, melt: MeltSpec) -> Self {
        self.melt = Some(melt);
        self
    }

    pub fn group_by(mut self, keys: &[&str]) -> Self {
        self.group_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn measure(mut self, measure: &str, agg: AggFn) -> Self {
        self.measure = Some(measure.to_string());
        self.agg = agg;
        self
    }

    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }
}

/// Everything a page needs from one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub loaded: Arc<LoadedTable>,
    /// Rows that survived filtering and exclusion, after derivation and melting.
    pub selected: Table,
    pub grouped: GroupedSeries,
    pub series: BTreeMap<String, Vec<(i64, f64)>>,
    pub forecast: Option<ForecastOutcome>,
    pub notices: Vec<Notice>,
}

impl PipelineOutput {
    pub fn report(&self) -> &LoadReport {
        &self.loaded.report
    }
}

/// A pipeline bound to a cache and a forecasting strategy.
pub struct Pipeline<'c, F: Forecaster + ?Sized> {
    cache: &'c FileCache,
    forecaster: Option<&'c F>,
}

impl<'c, F: Forecaster + ?Sized> Pipeline<'c, F> {
    pub fn new(cache: &'c FileCache) -> Self {
        Pipeline {
            cache,
            forecaster: None,
        }
    }

    pub fn with_forecaster(mut self, forecaster: &'c F) -> Self {
        self.forecaster = Some(forecaster);
        self
    }

    /// Run `spec` top to bottom.
    ///
    /// Fatal errors (missing file or column) are returned. An empty selection
    /// or skipped forecasts become notices on the output.
    pub fn run(&self, spec: &PipelineSpec) -> Result<PipelineOutput> {
        let loaded = self.cache.get_or_load(&spec.source, &spec.schema)?;
        let mut notices = Vec::new();
        if loaded.report.dropped_rows > 0 {
            info!(
                "{}: {} of {} rows dropped during load",
                spec.schema.name, loaded.report.dropped_rows, loaded.report.total_rows
            );
        }

        let table = &loaded.table;
        let filtered_columns = spec.filters.keys().chain(spec.exclude.iter().map(|(c, _)| c));
        for column in filtered_columns {
            if !table.has_column(column) {
                return Err(DashboardError::missing_column(column, &spec.source));
            }
        }
        let mut indices = filtered_indices(table, &spec.filters);
        for (column, value) in &spec.exclude {
            indices = excluding(table, &indices, column, value);
        }
        let mut selected = table.select(&indices);
        for (column, derivation) in &spec.derived {
            selected = selected.with_derived_column(column, *derivation);
        }
        if let Some(melt_spec) = &spec.melt {
            selected = unpivot(selected, melt_spec, spec)?;
        }

        let keys: Vec<&str> = spec.group_keys.iter().map(String::as_str).collect();
        let all: Vec<usize> = (0..selected.len()).collect();
        let grouped = aggregate_rows(&selected, &all, &keys, spec.measure.as_deref(), spec.agg)?;
        if grouped.is_empty() {
            notices.push(Notice::from_error(DashboardError::EmptySelection(format!(
                "{} has no rows for the selected filters",
                spec.schema.name
            )))?);
        }

        let series = grouped.yearly_series();
        let forecast = match self.forecaster {
            Some(forecaster) if spec.horizon > 0 && !series.is_empty() => {
                let (outcome, skipped) =
                    self.project_with(&spec.schema.name, &series, forecaster, spec.horizon)?;
                notices.extend(skipped);
                Some(outcome)
            }
            _ => None,
        };

        Ok(PipelineOutput {
            loaded,
            selected,
            grouped,
            series,
            forecast,
            notices,
        })
    }

    /// Forecast `series` with a forecaster other than the bound one, or with a
    /// horizon only known once the data is loaded. Skipped categories come back
    /// as warnings.
    pub fn project_with<G: Forecaster + ?Sized>(
        &self,
        name: &str,
        series: &BTreeMap<String, Vec<(i64, f64)>>,
        forecaster: &G,
        horizon: usize,
    ) -> Result<(ForecastOutcome, Vec<Notice>)> {
        let outcome = fit_and_project(series, &ForecasterRef(forecaster), horizon)?;
        let notices = outcome
            .skipped
            .iter()
            .map(|skip| {
                warn!("{name}: {}", skip.reason);
                Notice::warning(format!(
                    "{} forecast skipped for {}: {}",
                    outcome.model, skip.category, skip.reason
                ))
            })
            .collect();
        Ok((outcome, notices))
    }
}

/// Lets unsized forecasters (`dyn Forecaster`) pass through `&dyn Forecaster`.
struct ForecasterRef<'a, G: ?Sized>(&'a G);

impl<G: Forecaster + ?Sized> Forecaster for ForecasterRef<'_, G> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn min_history(&self) -> usize {
        self.0.min_history()
    }

    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>> {
        self.0.fit_project(history, horizon)
    }
}

fn unpivot(table: Table, melt_spec: &MeltSpec, spec: &PipelineSpec) -> Result<Table> {
    let ids: Vec<String> = match &melt_spec.columns {
        MeltColumns::Ids(ids) => ids.clone(),
        MeltColumns::Values(values) => {
            for column in values {
                if !table.has_column(column) {
                    return Err(DashboardError::missing_column(column, &spec.source));
                }
            }
            table
                .column_names
                .iter()
                .filter(|c| !values.contains(c))
                .cloned()
                .collect()
        }
    };
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let long = melt(&table, &id_refs, &melt_spec.var_name, &melt_spec.value_name);
    let long = match &melt_spec.coerce {
        Some(schema) => coerce_table(long, schema, &spec.source)?,
        None => long,
    };
    if long.report.dropped_rows > 0 {
        debug!(
            "{}: {} melted rows dropped during coercion",
            spec.schema.name, long.report.dropped_rows
        );
    }
    Ok(long.table)
}
