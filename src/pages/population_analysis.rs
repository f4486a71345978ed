//! Population trends by sex for selected ages, from the wide
//! one-column-per-year population table.

use serde::Serialize;

use super::{PageContext, PageOutput};
use crate::data::filter::{select, AggFn, FilterState};
use crate::data::loader::TableSchema;
use crate::data::model::CellValue;
use crate::error::Result;
use crate::forecast::Strategy;
use crate::pipeline::{MeltColumns, MeltSpec, Notice, Pipeline, PipelineSpec};
use crate::present::{records_to_csv, to_chart_series, ChartPoint};

const SEX: &str = "Sex";
const AGE: &str = "Age";
const YEAR: &str = "Year";
const POPULATION: &str = "Population";

#[derive(Debug, Clone)]
pub struct PopulationAnalysisParams {
    /// Empty means every sex.
    pub sexes: Vec<String>,
    /// Empty means every age.
    pub ages: Vec<String>,
}

impl Default for PopulationAnalysisParams {
    fn default() -> Self {
        PopulationAnalysisParams {
            sexes: Vec::new(),
            ages: vec!["20".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SexYearTotal {
    pub sex: String,
    pub year: i64,
    pub population: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationAnalysis {
    pub ages: Vec<String>,
    pub totals: Vec<SexYearTotal>,
    /// One line per sex.
    pub chart: Vec<ChartPoint>,
    pub notices: Vec<Notice>,
}

impl PageOutput for PopulationAnalysis {
    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    fn export_csv(&self) -> Result<Vec<u8>> {
        records_to_csv(&self.totals)
    }
}

pub fn render(ctx: &PageContext, params: &PopulationAnalysisParams) -> Result<PopulationAnalysis> {
    let mut filters = FilterState::new();
    filters.extend(select(SEX, &params.sexes));
    filters.extend(select(AGE, &params.ages));

    let spec = PipelineSpec::new(
        ctx.source(&ctx.config.sources.population),
        TableSchema::new("population").require(&[SEX, AGE]),
    )
    .filters(filters)
    .melt(MeltSpec {
        columns: MeltColumns::Ids(vec![SEX.into(), AGE.into()]),
        var_name: YEAR.into(),
        value_name: POPULATION.into(),
        coerce: Some(
            TableSchema::new("population by year")
                .require(&[YEAR])
                .years(&[YEAR])
                .numeric(&[POPULATION]),
        ),
    })
    .group_by(&[SEX, YEAR])
    .measure(POPULATION, AggFn::Sum);

    let out = Pipeline::<Strategy>::new(ctx.cache).run(&spec)?;

    let totals = out
        .grouped
        .groups
        .iter()
        .filter_map(|(key, population)| match key.as_slice() {
            [sex, year] => Some(SexYearTotal {
                sex: sex.to_string(),
                year: year.as_i64()?,
                population: *population,
            }),
            _ => None,
        })
        .collect();

    Ok(PopulationAnalysis {
        ages: params.ages.clone(),
        totals,
        chart: to_chart_series(&out.grouped),
        notices: out.notices,
    })
}

/// Distinct values of `Sex` and `Age`, for the selectors.
pub fn filter_options(ctx: &PageContext) -> Result<(Vec<CellValue>, Vec<CellValue>)> {
    let schema = TableSchema::new("population").require(&[SEX, AGE]);
    let loaded = ctx
        .cache
        .get_or_load(&ctx.source(&ctx.config.sources.population), &schema)?;
    let values = |column: &str| -> Vec<CellValue> {
        loaded
            .table
            .unique_values
            .get(column)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    };
    Ok((values(SEX), values(AGE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::FileCache;
    use crate::pages::fixtures::DataDir;

    fn data_dir() -> DataDir {
        let data = DataDir::new();
        data.write(
            &data.config.sources.population,
            "Sex,Age,2019,2020,2021\n\
             Male,20,\"1,000\",1010,1020\n\
             Male,21,500,510,520\n\
             Female,20,990,1000,n/a\n\
             Female,21,480,490,500\n",
        );
        data
    }

    #[test]
    fn sums_selected_ages_by_sex_and_year() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &PopulationAnalysisParams {
                sexes: Vec::new(),
                ages: vec!["20".into(), "21".into()],
            },
        )
        .unwrap();

        let male: Vec<(i64, f64)> = page
            .totals
            .iter()
            .filter(|t| t.sex == "Male")
            .map(|t| (t.year, t.population))
            .collect();
        assert_eq!(male, vec![(2019, 1500.0), (2020, 1520.0), (2021, 1540.0)]);
        let female_2021 = page
            .totals
            .iter()
            .find(|t| t.sex == "Female" && t.year == 2021)
            .unwrap();
        assert_eq!(female_2021.population, 500.0);
        assert_eq!(page.chart.len(), 6);
    }

    #[test]
    fn sex_filter_limits_lines() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &PopulationAnalysisParams {
                sexes: vec!["Female".into()],
                ..PopulationAnalysisParams::default()
            },
        )
        .unwrap();
        assert!(page.totals.iter().all(|t| t.sex == "Female"));
        assert_eq!(page.totals.len(), 3);
        assert!(page.chart.iter().all(|p| p.series == "Female"));
    }

    #[test]
    fn unknown_age_is_an_empty_notice() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let page = render(
            &ctx,
            &PopulationAnalysisParams {
                sexes: Vec::new(),
                ages: vec!["99".into()],
            },
        )
        .unwrap();
        assert!(page.totals.is_empty());
        assert_eq!(page.notices.len(), 1);
    }

    #[test]
    fn options_come_from_the_file() {
        let data = data_dir();
        let cache = FileCache::new();
        let ctx = PageContext::new(&cache, &data.config);
        let (sexes, ages) = filter_options(&ctx).unwrap();
        assert_eq!(sexes, vec![CellValue::from("Female"), CellValue::from("Male")]);
        assert_eq!(ages, vec![CellValue::Integer(20), CellValue::Integer(21)]);
    }
}
