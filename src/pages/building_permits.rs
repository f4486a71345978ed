//! Building permit costs by year and month, permit types and the cost
//! distribution.

use chrono::Datelike;
use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::data::filter::{aggregate_rows, select, AggFn};
use crate::data::loader::TableSchema;
use crate::data::model::{CellValue, Record, Table};
use crate::error::Result;
use crate::forecast::Strategy;
use crate::pipeline::{Notice, Pipeline, PipelineSpec};
use crate::present::{
    describe, histogram, pie_fractions, to_chart_series, to_csv, ChartPoint, HistogramBin,
    PieSlice, Summary,
};

const ISSUE_DATE: &str = "issue_date";
const COMMENCE_BY: &str = "commence_by_date";
const COMPLETED_BY: &str = "completed_by_date";
const COST: &str = "estimated_cost_of_works";
const PERMIT_TYPE: &str = "permit_certificate_type";
const YEAR: &str = "year";
const MONTH: &str = "month";

const HISTOGRAM_BINS: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct BuildingPermitsParams {
    /// Permit certificate types to include; empty means all.
    pub permit_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildingPermits {
    pub rows: usize,
    pub dropped_rows: usize,
    pub yearly_cost: Vec<ChartPoint>,
    pub monthly_cost: Vec<ChartPoint>,
    pub permit_types: Vec<PieSlice>,
    pub cost_histogram: Vec<HistogramBin>,
    pub cost_summary: Option<Summary>,
    pub notices: Vec<Notice>,
    #[serde(skip)]
    pub table: Table,
}

impl PageOutput for BuildingPermits {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The permits with their derived `year` and `month` columns.
    fn export_csv(&self) -> Result<Vec<u8>> {
        to_csv(&self.table)
    }
}

fn issue_date(row: &Record) -> Option<chrono::NaiveDate> {
    match row.get(ISSUE_DATE)? {
        CellValue::Date(d) => Some(*d),
        _ => None,
    }
}

fn issue_year(row: &Record) -> CellValue {
    issue_date(row).map_or(CellValue::Null, |d| CellValue::Integer(i64::from(d.year())))
}

fn issue_month(row: &Record) -> CellValue {
    issue_date(row).map_or(CellValue::Null, |d| {
        CellValue::String(d.format("%Y-%m").to_string())
    })
}

pub fn schema() -> TableSchema {
    TableSchema::new("building permits")
        .require(&[ISSUE_DATE])
        .dates(&[ISSUE_DATE, COMMENCE_BY, COMPLETED_BY])
        .numeric(&[COST])
}

pub fn render(ctx: &PageContext, params: &BuildingPermitsParams) -> Result<BuildingPermits> {
    let spec = PipelineSpec::new(ctx.source(&ctx.config.sources.building_permits), schema())
        .filters(select(PERMIT_TYPE, &params.permit_types))
        .derive(YEAR, issue_year)
        .derive(MONTH, issue_month)
        .group_by(&[YEAR])
        .measure(COST, AggFn::Sum);
    let out = Pipeline::<Strategy>::new(ctx.cache).run(&spec)?;

    let table = out.selected;
    let all: Vec<usize> = (0..table.len()).collect();
    let monthly = aggregate_rows(&table, &all, &[MONTH], Some(COST), AggFn::Sum)?;
    let costs = table.measures(COST);

    Ok(BuildingPermits {
        rows: table.len(),
        dropped_rows: out.loaded.report.dropped_rows,
        yearly_cost: to_chart_series(&out.grouped),
        monthly_cost: to_chart_series(&monthly),
        permit_types: pie_fractions(&table, PERMIT_TYPE),
        cost_histogram: histogram(&costs, HISTOGRAM_BINS),
        cost_summary: describe(&costs),
        notices: out.notices,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::FileCache;
    use crate::pages::fixtures::DataDir;

    fn data_dir() -> DataDir {
        let data = DataDir::new();
        data.write(
            &data.config.sources.building_permits,
            "issue_date,commence_by_date,completed_by_date,permit_certificate_type,estimated_cost_of_works\n\
             2021-01-15,2021-06-01,,Building Permit,\"$100,000\"\n\
             2021-01-20,,,Building Permit,50000\n\
             2021-03-02,bad,,Occupancy Permit,25000\n\
             2022-07-09,,,Building Permit,75000\n\
             ,2022-01-01,,Building Permit,999\n\
             not a date,,,Building Permit,1\n",
        );
        data
    }

    fn points(series: &[ChartPoint]) -> Vec<(String, f64)> {
        series.iter().map(|p| (p.x.to_string(), p.y)).collect()
    }

    #[test]
    fn yearly_and_monthly_costs() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &BuildingPermitsParams::default()).unwrap();

        assert_eq!(page.rows, 4);
        assert_eq!(page.dropped_rows, 2);
        assert_eq!(
            points(&page.yearly_cost),
            vec![("2021".into(), 175000.0), ("2022".into(), 75000.0)]
        );
        assert_eq!(
            points(&page.monthly_cost),
            vec![
                ("2021-01".into(), 150000.0),
                ("2021-03".into(), 25000.0),
                ("2022-07".into(), 75000.0)
            ]
        );
    }

    #[test]
    fn permit_type_shares_and_cost_distribution() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &BuildingPermitsParams::default()).unwrap();

        assert_eq!(page.permit_types[0].label, "Building Permit");
        assert_eq!(page.permit_types[0].count, 3);
        assert_eq!(page.permit_types[0].fraction, 0.75);
        assert_eq!(page.cost_histogram.len(), HISTOGRAM_BINS);
        let binned: usize = page.cost_histogram.iter().map(|b| b.count).sum();
        assert_eq!(binned, 4);
        let summary = page.cost_summary.unwrap();
        assert_eq!(summary.max, 100000.0);
        assert_eq!(summary.mean, 62500.0);
    }

    #[test]
    fn permit_type_filter() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &BuildingPermitsParams {
                permit_types: vec!["Occupancy Permit".into()],
            },
        )
        .unwrap();
        assert_eq!(page.rows, 1);
        assert_eq!(points(&page.yearly_cost), vec![("2021".into(), 25000.0)]);
    }

    #[test]
    fn export_carries_derived_columns() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &BuildingPermitsParams::default()).unwrap();
        let csv = String::from_utf8(page.export_csv().unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("issue_date,commence_by_date,completed_by_date,permit_certificate_type,estimated_cost_of_works,year,month")
        );
        assert_eq!(
            lines.next(),
            Some("2021-01-15,2021-06-01,,Building Permit,100000,2021,2021-01")
        );
        assert_eq!(lines.count(), 3);
    }
}
