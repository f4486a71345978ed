use super::Forecaster;
use crate::error::{DashboardError, Result};

/// Ordinary least squares of value on year, extended linearly.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrend;

/// Fitted `value = mean_y + slope · (year − mean_x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub mean_x: f64,
    pub mean_y: f64,
    pub slope: f64,
}

impl LinearFit {
    pub fn predict(&self, year: f64) -> f64 {
        self.mean_y + self.slope * (year - self.mean_x)
    }

    pub fn intercept(&self) -> f64 {
        self.mean_y - self.slope * self.mean_x
    }
}

/// Fit an OLS line. Needs at least two distinct x values.
pub fn fit(points: &[(f64, f64)]) -> Result<LinearFit> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return Err(DashboardError::InsufficientHistory {
            key: "linear".into(),
            needed: 2,
            got: points.len(),
        });
    }
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });
    if sxx == 0.0 {
        return Err(DashboardError::Model("all observations share one year".into()));
    }
    Ok(LinearFit {
        mean_x,
        mean_y,
        slope: sxy / sxx,
    })
}

impl Forecaster for LinearTrend {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn min_history(&self) -> usize {
        2
    }

    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>> {
        let points: Vec<(f64, f64)> = history.iter().map(|&(y, v)| (y as f64, v)).collect();
        let line = fit(&points)?;
        let last = history.last().map_or(0, |(y, _)| *y);
        Ok((1..=horizon as i64)
            .map(|step| line.predict((last + step) as f64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn slope_and_intercept() {
        let line = fit(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert_eq!(line.slope, 2.0);
        assert_eq!(line.intercept(), 1.0);
    }

    #[test]
    fn noisy_points_fit_least_squares() {
        let line = fit(&[(1.0, 1.0), (2.0, 2.0), (3.0, 1.3), (4.0, 3.75), (5.0, 2.25)]).unwrap();
        assert_abs_diff_eq!(line.slope, 0.425, epsilon = 1e-12);
        assert_abs_diff_eq!(line.intercept(), 0.785, epsilon = 1e-12);
    }

    #[test]
    fn vertical_data_is_rejected() {
        assert!(fit(&[(2020.0, 1.0), (2020.0, 2.0)]).is_err());
    }

    #[test]
    fn projects_years_after_a_gap() {
        let values = LinearTrend
            .fit_project(&[(2010, 10.0), (2015, 20.0)], 2)
            .unwrap();
        assert_eq!(values, vec![22.0, 24.0]);
    }
}
