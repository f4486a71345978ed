use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{DashboardError, Result};
use crate::forecast::Strategy;

// ---------------------------------------------------------------------------
// DashboardConfig – where each page reads from and which inputs are allowed
// ---------------------------------------------------------------------------

/// Top-level configuration, read from a TOML file.
///
/// ```toml
/// data_dir = "Data"
///
/// [sources]
/// traffic_counts = "Traffic Count Locations_ GeoJSON.geojson"
///
/// [bounds]
/// horizon_max = 20
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub data_dir: PathBuf,
    pub sources: Sources,
    pub bounds: InputBounds,
    pub forecast: ForecastSettings,
    pub cadastral: CadastralSettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_dir: PathBuf::from("Data"),
            sources: Sources::default(),
            bounds: InputBounds::default(),
            forecast: ForecastSettings::default(),
            cadastral: CadastralSettings::default(),
        }
    }
}

/// File name of each page's source, relative to `data_dir`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Sources {
    pub lga_population: PathBuf,
    pub lga_coordinates: PathBuf,
    pub building_permits: PathBuf,
    pub population: PathBuf,
    pub vehicle_registrations: PathBuf,
    pub housing_development: PathBuf,
    pub traffic_counts: PathBuf,
    pub cadastral: PathBuf,
}

impl Default for Sources {
    fn default() -> Self {
        Sources {
            lga_population: "LGA_population_data.csv".into(),
            lga_coordinates: "LGA_coordinates.csv".into(),
            building_permits: "building-permits.csv".into(),
            population: "population_data.csv".into(),
            vehicle_registrations: "vehicle_registration_data.csv".into(),
            housing_development: "housing_development.csv".into(),
            traffic_counts: "traffic_counts.geojson".into(),
            cadastral: "cadastral.geojson".into(),
        }
    }
}

/// Accepted ranges for user-facing controls.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InputBounds {
    pub horizon_min: usize,
    pub horizon_max: usize,
    pub year_min: i64,
    pub year_max: i64,
}

impl Default for InputBounds {
    fn default() -> Self {
        InputBounds {
            horizon_min: 1,
            horizon_max: 20,
            year_min: 1900,
            year_max: 2040,
        }
    }
}

impl InputBounds {
    pub fn validate_horizon(&self, horizon: usize) -> Result<usize> {
        if horizon == 0 || horizon < self.horizon_min || horizon > self.horizon_max {
            return Err(DashboardError::InvalidInput(format!(
                "forecast horizon {horizon} outside {}..={}",
                self.horizon_min, self.horizon_max
            )));
        }
        Ok(horizon)
    }

    pub fn validate_year(&self, year: i64) -> Result<i64> {
        if year < self.year_min || year > self.year_max {
            return Err(DashboardError::InvalidInput(format!(
                "year {year} outside {}..={}",
                self.year_min, self.year_max
            )));
        }
        Ok(year)
    }
}

/// Model parameters shared by the forecasting pages.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastSettings {
    pub arima_p: usize,
    pub arima_d: usize,
    pub seasonal_period: f64,
    pub seasonal_harmonics: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        ForecastSettings {
            arima_p: 5,
            arima_d: 1,
            seasonal_period: 5.0,
            seasonal_harmonics: 1,
        }
    }
}

impl ForecastSettings {
    pub fn arima(&self) -> Strategy {
        Strategy::Arima {
            p: self.arima_p,
            d: self.arima_d,
        }
    }

    pub fn seasonal(&self) -> Strategy {
        Strategy::Seasonal {
            period: self.seasonal_period,
            harmonics: self.seasonal_harmonics,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CadastralSettings {
    /// Douglas-Peucker tolerance in degrees.
    pub simplify_tolerance: f64,
}

impl Default for CadastralSettings {
    fn default() -> Self {
        CadastralSettings {
            simplify_tolerance: 0.01,
        }
    }
}

impl FromStr for DashboardConfig {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl DashboardConfig {
    /// Read a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| DashboardError::unavailable(path, e))?;
        text.parse()
    }

    /// Absolute-or-relative path of a source file.
    pub fn source_path(&self, file: &Path) -> PathBuf {
        self.data_dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: DashboardConfig = "".parse().unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(
            config.source_path(&config.sources.building_permits),
            PathBuf::from("Data/building-permits.csv")
        );
    }

    #[test]
    fn partial_tables_override_fields() {
        let config: DashboardConfig = r#"
            data_dir = "/srv/govhack"

            [sources]
            traffic_counts = "Traffic Count Locations_ GeoJSON.geojson"

            [bounds]
            horizon_max = 10

            [forecast]
            arima_p = 2
        "#
        .parse()
        .unwrap();
        assert_eq!(config.bounds.horizon_max, 10);
        assert_eq!(config.bounds.horizon_min, 1);
        assert_eq!(config.forecast.arima(), Strategy::Arima { p: 2, d: 1 });
        assert_eq!(
            config.source_path(&config.sources.traffic_counts),
            PathBuf::from("/srv/govhack/Traffic Count Locations_ GeoJSON.geojson")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = "colour = \"blue\"".parse::<DashboardConfig>().unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn bounds_validate_controls() {
        let bounds = InputBounds::default();
        assert_eq!(bounds.validate_horizon(5).unwrap(), 5);
        assert!(matches!(
            bounds.validate_horizon(0),
            Err(DashboardError::InvalidInput(_))
        ));
        assert!(bounds.validate_horizon(21).is_err());
        assert!(bounds.validate_year(2041).is_err());
        assert_eq!(bounds.validate_year(2030).unwrap(), 2030);
    }
}
