use nalgebra::{DMatrix, DVector};

use super::{lstsq, Forecaster};
use crate::error::{DashboardError, Result};

/// ARIMA(p, d, 0): an autoregression of order `p` on the `d`-times
/// differenced series, fitted by conditional least squares without a
/// constant term, then integrated back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arima {
    pub p: usize,
    pub d: usize,
}

impl Default for Arima {
    fn default() -> Self {
        Arima { p: 5, d: 1 }
    }
}

impl Arima {
    pub fn new(p: usize, d: usize) -> Self {
        Arima { p, d }
    }

    /// AR coefficients `φ₁…φₚ` for an already-differenced series.
    pub fn fit_coefficients(&self, z: &[f64]) -> Result<Vec<f64>> {
        if self.p == 0 {
            return Ok(Vec::new());
        }
        let rows = z.len().saturating_sub(self.p);
        if rows < self.p + 1 {
            return Err(DashboardError::InsufficientHistory {
                key: "ARIMA".into(),
                needed: self.min_history(),
                got: z.len() + self.d,
            });
        }
        let p = self.p;
        let design = DMatrix::from_fn(rows, p, |i, j| z[p + i - 1 - j]);
        let target = DVector::from_iterator(rows, z[p..].iter().copied());
        Ok(lstsq::solve(&design, &target)?.iter().copied().collect())
    }
}

/// `d`-th order differences, keeping every intermediate level.
fn difference_levels(values: &[f64], d: usize) -> Vec<Vec<f64>> {
    let mut levels = vec![values.to_vec()];
    for _ in 0..d {
        let prev = levels.last().map(Vec::as_slice).unwrap_or_default();
        let next: Vec<f64> = prev.windows(2).map(|w| w[1] - w[0]).collect();
        levels.push(next);
    }
    levels
}

impl Forecaster for Arima {
    fn name(&self) -> &'static str {
        "ARIMA"
    }

    fn min_history(&self) -> usize {
        2 * self.p + 1 + self.d
    }

    fn fit_project(&self, history: &[(i64, f64)], horizon: usize) -> Result<Vec<f64>> {
        let values: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
        if values.len() < self.min_history().max(self.d + 1) {
            return Err(DashboardError::InsufficientHistory {
                key: "ARIMA".into(),
                needed: self.min_history(),
                got: values.len(),
            });
        }

        let levels = difference_levels(&values, self.d);
        let mut z = levels.last().cloned().unwrap_or_default();
        let phi = self.fit_coefficients(&z)?;

        let start = z.len();
        for _ in 0..horizon {
            let next: f64 = phi
                .iter()
                .enumerate()
                .map(|(j, coef)| coef * z[z.len() - 1 - j])
                .sum();
            z.push(next);
        }
        let mut projected: Vec<f64> = z[start..].to_vec();

        // Integrate back through each differencing level.
        for level in levels[..self.d].iter().rev() {
            let mut last = level.last().copied().unwrap_or_default();
            for v in projected.iter_mut() {
                last += *v;
                *v = last;
            }
        }
        Ok(projected)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn yearly(values: &[f64]) -> Vec<(i64, f64)> {
        values.iter().enumerate().map(|(i, v)| (1990 + i as i64, *v)).collect()
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let mut z = vec![1.0];
        for _ in 0..30 {
            let last = *z.last().unwrap();
            z.push(0.5 * last);
        }
        let phi = Arima::new(1, 0).fit_coefficients(&z).unwrap();
        assert_abs_diff_eq!(phi[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn random_walk_with_zero_order_repeats_last_value() {
        let values = yearly(&[3.0, 5.0, 4.0, 6.0]);
        let projected = Arima::new(0, 1).fit_project(&values, 3).unwrap();
        assert_eq!(projected, vec![6.0, 6.0, 6.0]);
    }

    #[test]
    fn linear_growth_continues_after_differencing() {
        let values = yearly(&(0..20).map(|i| 100.0 + 7.0 * i as f64).collect::<Vec<_>>());
        let projected = Arima::default().fit_project(&values, 3).unwrap();
        assert_eq!(projected.len(), 3);
        for (step, v) in projected.iter().enumerate() {
            assert_abs_diff_eq!(*v, 100.0 + 7.0 * (20 + step) as f64, epsilon = 1e-6);
        }
    }

    #[test]
    fn short_history_is_insufficient() {
        let err = Arima::default()
            .fit_project(&yearly(&[1.0, 2.0, 3.0, 4.0]), 2)
            .unwrap_err();
        assert!(matches!(err, DashboardError::InsufficientHistory { .. }));
    }

    #[test]
    fn differences_keep_every_level() {
        let levels = difference_levels(&[1.0, 4.0, 9.0, 16.0], 2);
        assert_eq!(levels[1], vec![3.0, 5.0, 7.0]);
        assert_eq!(levels[2], vec![2.0, 2.0]);
    }
}
