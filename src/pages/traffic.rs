//! Traffic counts: heatmap of AADT for a year, projected past the last
//! counted year from the yearly mean.

use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::color::{ColorRamp, LegendEntry};
use crate::data::filter::{filtered_indices, select, AggFn};
use crate::data::geo::representative_point;
use crate::data::loader::TableSchema;
use crate::data::model::Table;
use crate::error::{DashboardError, Result};
use crate::forecast::{ForecastRecord, Strategy};
use crate::pipeline::{Notice, Pipeline, PipelineSpec};
use crate::present::{
    describe, records_to_csv, table_map_points, to_chart_series, to_csv, ChartPoint, MapPoint,
    Summary,
};

const LAST_YEAR: &str = "LAST_YEAR";
const AADT: &str = "AADT_ALLVE";
const LEGEND_CAPTION: &str = "AADT ALL VEHICLE";

/// Projections run up to this year.
pub const LAST_FORECAST_YEAR: i64 = 2040;

#[derive(Debug, Clone, Default)]
pub struct TrafficParams {
    /// Year to map; defaults to the last counted year.
    pub year: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Traffic {
    pub year: i64,
    pub forecast: bool,
    /// Mean AADT per counted year.
    pub yearly_mean: Vec<ChartPoint>,
    /// Projected mean AADT for every year up to `year`.
    pub projection: Vec<ForecastRecord>,
    pub heatmap: Vec<MapPoint>,
    pub legend_caption: &'static str,
    pub legend: Vec<LegendEntry>,
    pub summary: Option<Summary>,
    pub notices: Vec<Notice>,
    #[serde(skip)]
    pub counts: Table,
}

impl PageOutput for Traffic {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Count sites of the selected year, or the projection for a future year.
    fn export_csv(&self) -> Result<Vec<u8>> {
        if self.forecast {
            records_to_csv(&self.projection)
        } else {
            to_csv(&self.counts)
        }
    }
}

pub fn schema() -> TableSchema {
    TableSchema::new("traffic counts")
        .require(&[LAST_YEAR, AADT])
        .years(&[LAST_YEAR])
        .numeric(&[AADT])
}

pub fn render(ctx: &PageContext, params: &TrafficParams) -> Result<Traffic> {
    let source = ctx.source(&ctx.config.sources.traffic_counts);
    let spec = PipelineSpec::new(&source, schema())
        .group_by(&[LAST_YEAR])
        .measure(AADT, AggFn::Mean);
    let pipeline = Pipeline::<Strategy>::new(ctx.cache);
    let out = pipeline.run(&spec)?;
    let mut notices = out.notices;

    let history = out.series.get(AADT).cloned().unwrap_or_default();
    let (Some(&(first, _)), Some(&(last, _))) = (history.first(), history.last()) else {
        return Err(DashboardError::EmptySelection(
            "no traffic counts with an AADT value".into(),
        ));
    };

    let year = ctx.bounds().validate_year(params.year.unwrap_or(last))?;
    if year < first || year > LAST_FORECAST_YEAR {
        return Err(DashboardError::InvalidInput(format!(
            "traffic year {year} outside {first}..={LAST_FORECAST_YEAR}"
        )));
    }

    let yearly_mean = to_chart_series(&out.grouped);
    let (forecast, projection, heatmap, counts, values) = if year > last {
        let horizon = (year - last) as usize;
        let (outcome, skipped) = pipeline.project_with(AADT, &out.series, &Strategy::Linear, horizon)?;
        notices.extend(skipped);
        let anchor = out
            .loaded
            .table
            .rows
            .iter()
            .find_map(|r| r.geometry.as_ref().and_then(representative_point));
        let heatmap: Vec<MapPoint> = match (anchor, outcome.for_year(year).first()) {
            (Some(point), Some(record)) => {
                let ramp = ColorRamp {
                    min: record.value,
                    max: record.value,
                };
                vec![MapPoint {
                    lat: point.y(),
                    lon: point.x(),
                    weight: record.value,
                    label: format!("{year} (projected)"),
                    color: ramp.color_for(record.value),
                }]
            }
            _ => Vec::new(),
        };
        let values: Vec<f64> = outcome.for_year(year).iter().map(|r| r.value).collect();
        (true, outcome.records, heatmap, Table::default(), values)
    } else {
        let in_year = filtered_indices(&out.selected, &select(LAST_YEAR, &[year.to_string()]));
        let counts = out.selected.select(&in_year);
        if counts.is_empty() {
            notices.push(Notice::info(format!("no traffic counts for {year}")));
        }
        let values = counts.measures(AADT);
        (false, Vec::new(), table_map_points(&counts, AADT, None), counts, values)
    };

    let legend = ColorRamp::spanning(heatmap.iter().map(|p| p.weight))
        .map(|ramp| ramp.legend_entries(5))
        .unwrap_or_default();

    Ok(Traffic {
        year,
        forecast,
        yearly_mean,
        projection,
        heatmap,
        legend_caption: LEGEND_CAPTION,
        legend,
        summary: describe(&values),
        notices,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::cache::FileCache;
    use crate::pages::fixtures::DataDir;

    fn feature(year: &str, aadt: &str, lon: f64, lat: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"LAST_YEAR":{year},"AADT_ALLVE":{aadt}}},"geometry":{{"type":"Point","coordinates":[{lon},{lat}]}}}}"#
        )
    }

    fn data_dir() -> DataDir {
        let data = DataDir::new();
        let features = [
            feature("2018", "1000", 144.30, -38.10),
            feature("2018", "3000", 144.35, -38.12),
            feature("2019", "2100", 144.40, -38.14),
            feature("2020", "2200", 144.45, -38.16),
            feature("2020", "null", 144.50, -38.18),
        ];
        data.write(
            &data.config.sources.traffic_counts,
            &format!(
                r#"{{"type":"FeatureCollection","features":[{}]}}"#,
                features.join(",")
            ),
        );
        data
    }

    #[test]
    fn counted_year_maps_each_site() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &TrafficParams { year: Some(2018) }).unwrap();

        assert!(!page.forecast);
        assert_eq!(page.heatmap.len(), 2);
        assert_eq!(page.yearly_mean.len(), 3);
        assert_eq!(page.yearly_mean[0].y, 2000.0);
        let summary = page.summary.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, 2000.0);
        assert_eq!(page.heatmap[0].color, "#1313ec");
    }

    #[test]
    fn defaults_to_last_counted_year() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &TrafficParams::default()).unwrap();
        assert_eq!(page.year, 2020);
        // the count without an AADT value was dropped on load
        assert_eq!(page.heatmap.len(), 1);
    }

    #[test]
    fn future_year_is_projected_from_yearly_means() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(&ctx, &TrafficParams { year: Some(2022) }).unwrap();

        assert!(page.forecast);
        let years: Vec<i64> = page.projection.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2021, 2022]);
        assert_abs_diff_eq!(page.projection[1].value, 2400.0, epsilon = 1e-6);
        assert_eq!(page.heatmap.len(), 1);
        assert_abs_diff_eq!(page.heatmap[0].lon, 144.30, epsilon = 1e-9);
        let csv = String::from_utf8(page.export_csv().unwrap()).unwrap();
        assert!(csv.starts_with("category,year,value\n"));
    }

    #[test]
    fn year_before_first_count_is_rejected() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let err = render(&ctx, &TrafficParams { year: Some(2010) }).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidInput(_)));
    }
}
