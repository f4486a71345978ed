use nalgebra::{DMatrix, DVector};

use crate::error::{DashboardError, Result};

const SINGULAR_EPS: f64 = 1e-10;

/// Least-squares coefficients `β` minimising `‖Xβ − y‖²`.
///
/// `design` has one row per observation. Solved through the SVD so rank
/// deficient designs get the minimum-norm solution instead of failing.
pub fn solve(design: &DMatrix<f64>, target: &DVector<f64>) -> Result<DVector<f64>> {
    if design.nrows() != target.len() {
        return Err(DashboardError::Model(format!(
            "design has {} rows but target has {}",
            design.nrows(),
            target.len()
        )));
    }
    if design.nrows() == 0 || design.ncols() == 0 {
        return Err(DashboardError::Model("empty design matrix".into()));
    }
    design
        .clone()
        .svd(true, true)
        .solve(target, SINGULAR_EPS)
        .map_err(|e| DashboardError::Model(e.to_string()))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn recovers_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let design = DMatrix::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
        let target = DVector::from_iterator(4, x.iter().map(|v| 3.0 + 2.0 * v));
        let beta = solve(&design, &target).unwrap();
        assert_abs_diff_eq!(beta[0], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(beta[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn mismatched_shapes_fail() {
        let design = DMatrix::<f64>::zeros(3, 1);
        let target = DVector::<f64>::zeros(2);
        assert!(matches!(solve(&design, &target), Err(DashboardError::Model(_))));
    }
}
