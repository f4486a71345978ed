//! Command line front-end: renders one dashboard page and prints it as JSON.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use rusty_atlas::pages::{
    building_permits, cadastral, housing, population_analysis, population_forecast, traffic,
    vehicle_forecast,
};
use rusty_atlas::{DashboardConfig, FileCache, Notice, PageContext, PageOutput};

// ---------------------------------------------------------------------------
// CLI definitions
// ---------------------------------------------------------------------------

/// Render a dashboard page from the configured data directory.
#[derive(Parser)]
#[command(name = "rusty-atlas")]
#[command(about = "Load, aggregate and forecast regional datasets")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Also write the page's downloadable table to this CSV file.
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast age-group populations of one LGA and map totals for a year.
    PopulationForecast {
        /// LGA name.
        #[arg(long, default_value = "")]
        lga: String,

        /// Age-group columns to forecast.
        #[arg(long = "age-group", default_values_t = ["0-4".to_string(), "20-24".to_string()])]
        age_groups: Vec<String>,

        #[arg(long, default_value_t = 5)]
        horizon: usize,

        /// Year shown on the population map.
        #[arg(long, default_value_t = 2021)]
        map_year: i64,

        /// Skip the population map.
        #[arg(long)]
        no_map: bool,

        /// Print the available LGA names instead.
        #[arg(long)]
        list_lgas: bool,
    },

    /// Permit costs by year and month, permit types and cost distribution.
    BuildingPermits {
        /// Permit certificate types to include (default: all).
        #[arg(long = "permit-type")]
        permit_types: Vec<String>,
    },

    /// Population trends by sex for selected ages.
    PopulationAnalysis {
        /// Sexes to include (default: all).
        #[arg(long = "sex")]
        sexes: Vec<String>,

        /// Ages to include.
        #[arg(long = "age", default_values_t = ["20".to_string()])]
        ages: Vec<String>,

        /// Print the available sexes and ages instead.
        #[arg(long)]
        list_options: bool,
    },

    /// Vehicle registrations by manufacture year with an ARIMA forecast.
    VehicleForecast {
        /// Fuel codes to include (default: all).
        #[arg(long = "fuel")]
        fuel_types: Vec<String>,

        #[arg(long, default_value_t = 10)]
        horizon: usize,
    },

    /// Housing development per suburb, recorded or projected.
    Housing {
        #[arg(long, default_value_t = 2018)]
        year: i64,
    },

    /// Traffic count heatmap, projected past the last counted year.
    Traffic {
        /// Defaults to the last counted year.
        #[arg(long)]
        year: Option<i64>,
    },

    /// Simplified cadastral parcels with a column description.
    Cadastral {
        /// Douglas-Peucker tolerance in degrees.
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_path(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    info!("reading sources from {}", config.data_dir.display());

    let cache = FileCache::new();
    let ctx = PageContext::new(&cache, &config);
    let csv = cli.csv.as_deref();

    match cli.command {
        Commands::PopulationForecast {
            lga,
            age_groups,
            horizon,
            map_year,
            no_map,
            list_lgas,
        } => {
            if list_lgas {
                let names = population_forecast::lga_options(&ctx).context("listing LGAs")?;
                return print_json(&names);
            }
            let params = population_forecast::PopulationForecastParams {
                lga,
                age_groups,
                horizon,
                map_year: (!no_map).then_some(map_year),
            };
            emit(population_forecast::render(&ctx, &params), csv)
        }
        Commands::BuildingPermits { permit_types } => {
            let params = building_permits::BuildingPermitsParams { permit_types };
            emit(building_permits::render(&ctx, &params), csv)
        }
        Commands::PopulationAnalysis {
            sexes,
            ages,
            list_options,
        } => {
            if list_options {
                let (sexes, ages) =
                    population_analysis::filter_options(&ctx).context("listing filter options")?;
                return print_json(&serde_json::json!({ "sex": sexes, "age": ages }));
            }
            let params = population_analysis::PopulationAnalysisParams { sexes, ages };
            emit(population_analysis::render(&ctx, &params), csv)
        }
        Commands::VehicleForecast {
            fuel_types,
            horizon,
        } => {
            let params = vehicle_forecast::VehicleForecastParams {
                fuel_types,
                horizon,
            };
            emit(vehicle_forecast::render(&ctx, &params), csv)
        }
        Commands::Housing { year } => {
            emit(housing::render(&ctx, &housing::HousingParams { year }), csv)
        }
        Commands::Traffic { year } => {
            emit(traffic::render(&ctx, &traffic::TrafficParams { year }), csv)
        }
        Commands::Cadastral { tolerance } => emit(
            cadastral::render(&ctx, &cadastral::CadastralParams { tolerance }),
            csv,
        ),
    }
}

/// Print a page, or the notice for a non-fatal failure, and write its CSV.
fn emit<P: PageOutput>(result: rusty_atlas::Result<P>, csv: Option<&Path>) -> Result<()> {
    let page = match result {
        Ok(page) => page,
        Err(e) if !e.is_fatal() => {
            let notice = Notice::from_error(e)?;
            warn!("{}", notice.message);
            return print_json(&serde_json::json!({ "notices": [notice] }));
        }
        Err(e) => return Err(e).context("rendering page"),
    };

    for notice in page.notices() {
        warn!("{}", notice.message);
    }
    if let Some(path) = csv {
        let bytes = page.export_csv().context("exporting CSV")?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    print_json(&page)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
