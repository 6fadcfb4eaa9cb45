//! Inverse-variance weighted linear least squares

use nalgebra::{Cholesky, DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LstsqError {
    #[error("Design matrix has {0} rows but data has {1} values and weights {2}")]
    MismatchedLengths(usize, usize, usize),
    #[error("Need at least {needed} weighted samples, got {got}")]
    NotEnoughData { needed: usize, got: usize },
    #[error("Normal equations are singular: {0}")]
    Singular(String),
}

/// Result of a weighted least-squares fit
#[derive(Debug, Clone)]
pub struct LstsqSolution {
    /// Best-fit coefficient for each design column
    pub coefficients: Vec<f64>,
    /// Σ w (y − A·c)²
    pub chi2: f64,
    /// Samples with positive weight
    pub n_used: usize,
}

impl LstsqSolution {
    /// chi2 per degree of freedom, infinite when there is none
    pub fn reduced_chi2(&self) -> f64 {
        let dof = self.n_used.saturating_sub(self.coefficients.len());
        if dof == 0 {
            f64::INFINITY
        } else {
            self.chi2 / dof as f64
        }
    }
}

/// Minimize Σ w (y − A·c)² over `c`.
///
/// `design` is `npix × ncomp`. The normal equations are solved by Cholesky
/// decomposition, falling back to SVD when they are not positive definite.
pub fn weighted_least_squares(
    design: &DMatrix<f64>,
    data: &[f64],
    weights: &[f64],
) -> Result<LstsqSolution, LstsqError> {
    let (npix, ncomp) = design.shape();
    if data.len() != npix || weights.len() != npix {
        return Err(LstsqError::MismatchedLengths(
            npix,
            data.len(),
            weights.len(),
        ));
    }

    let n_used = weights.iter().filter(|&&w| w > 0.0).count();
    if n_used < ncomp || ncomp == 0 {
        return Err(LstsqError::NotEnoughData {
            needed: ncomp.max(1),
            got: n_used,
        });
    }

    let w = DVector::from_iterator(npix, weights.iter().map(|&w| w.max(0.0)));
    let y = DVector::from_column_slice(data);

    let mut weighted_design = design.clone();
    for (mut row, &wi) in weighted_design.row_iter_mut().zip(w.iter()) {
        row *= wi;
    }
    let ata = design.transpose() * &weighted_design;
    let atb = weighted_design.transpose() * &y;

    let coefficients = match Cholesky::new(ata.clone()) {
        Some(chol) => chol.solve(&atb),
        None => ata
            .svd(true, true)
            .solve(&atb, 1e-12)
            .map_err(|e| LstsqError::Singular(e.to_string()))?,
    };

    let residual = &y - design * &coefficients;
    let chi2 = residual
        .iter()
        .zip(w.iter())
        .map(|(r, wi)| wi * r * r)
        .sum();

    Ok(LstsqSolution {
        coefficients: coefficients.iter().copied().collect(),
        chi2,
        n_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_exact_coefficients() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let design = DMatrix::from_fn(xs.len(), 3, |r, c| xs[r].powi(c as i32));
        let data: Vec<f64> = xs.iter().map(|x| 1.5 - 2.0 * x + 0.25 * x * x).collect();
        let weights = vec![1.0; xs.len()];

        let fit = weighted_least_squares(&design, &data, &weights).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.5, epsilon = 1e-8);
        assert_relative_eq!(fit.coefficients[1], -2.0, epsilon = 1e-8);
        assert_relative_eq!(fit.coefficients[2], 0.25, epsilon = 1e-8);
        assert!(fit.chi2 < 1e-12);
        assert_eq!(fit.n_used, 20);
    }

    #[test]
    fn test_zero_weight_points_are_ignored() {
        let design = DMatrix::from_element(4, 1, 1.0);
        let data = [2.0, 2.0, 100.0, 2.0];
        let weights = [1.0, 1.0, 0.0, 1.0];
        let fit = weighted_least_squares(&design, &data, &weights).unwrap();
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
        assert_eq!(fit.n_used, 3);
        assert_relative_eq!(fit.reduced_chi2(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_not_enough_data() {
        let design = DMatrix::from_element(3, 2, 1.0);
        let err = weighted_least_squares(&design, &[1.0; 3], &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err, LstsqError::NotEnoughData { needed: 2, got: 1 });
    }

    #[test]
    fn test_mismatched_lengths() {
        let design = DMatrix::from_element(3, 1, 1.0);
        let err = weighted_least_squares(&design, &[1.0; 2], &[1.0; 3]).unwrap_err();
        assert_eq!(err, LstsqError::MismatchedLengths(3, 2, 3));
    }
}
