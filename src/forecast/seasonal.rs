use std::f64::consts::TAU;

use nalgebra::{DMatrix, DVector};

use super::{lstsq, Forecaster};
use crate::error::{DashboardError, Result};

/// Linear trend plus Fourier terms of a fixed period:
///
/// `y(t) = b₀ + b₁·t + Σₖ aₖ·sin(2πkt/P) + cₖ·cos(2πkt/P)`
///
/// with `t` measured in years from the first observation. Harmonics are
/// reduced when the history is too short to support them, so the model
/// degrades to a straight trend on two or three points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalCurve {
    pub period: f64,
    pub harmonics: usize,
}

impl Default for SeasonalCurve {
    fn default() -> Self {
        SeasonalCurve {
            period: 5.0,
            harmonics: 1,
        }
    }
}

impl SeasonalCurve {
    pub fn new(period: f64, harmonics: usize) -> Self {
        SeasonalCurve { period, harmonics }
    }

    /// Harmonics that leave at least one residual degree of freedom.
    fn usable_harmonics(&self, n: usize) -> usize {
        self.harmonics.min(n.saturating_sub(3) / 2)
    }

    fn features(&self, t: f64, harmonics: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 + 2 * harmonics);
        row.push(1.0);
        row.push(t);
        for k in 1..=harmonics {
            let angle = TAU * k as f64 * t / self.period;
            row.push(angle.sin());
            row.push(angle.cos());
        }
        row
    }
}

impl Forecaster for SeasonalCurve {
    fn name(&self) -> &'static str {
        "Seasonal"
    }

    fn min_history(&self) -> usize {
        2
    }

    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>> {
        if self.period <= 0.0 || !self.period.is_finite() {
            return Err(DashboardError::InvalidInput(format!(
                "seasonal period must be positive, got {}",
                self.period
            )));
        }
        let Some(&(origin, _)) = history.first() else {
            return Err(DashboardError::InsufficientHistory {
                key: "Seasonal".into(),
                needed: 2,
                got: 0,
            });
        };
        let harmonics = self.usable_harmonics(history.len());
        let width = 2 + 2 * harmonics;

        let features: Vec<f64> = history
            .iter()
            .flat_map(|(year, _)| self.features((year - origin) as f64, harmonics))
            .collect();
        let design = DMatrix::from_row_slice(history.len(), width, &features);
        let target = DVector::from_iterator(history.len(), history.iter().map(|(_, v)| *v));
        let beta = lstsq::solve(&design, &target)?;

        let last = history.last().map_or(origin, |(y, _)| *y);
        Ok((1..=horizon as i64)
            .map(|step| {
                let t = (last + step - origin) as f64;
                self.features(t, harmonics)
                    .iter()
                    .zip(beta.iter())
                    .map(|(f, b)| f * b)
                    .sum()
            })
            .collect())
    }
}
