//! Robust statistics used to put spectra on a common flux scale

use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("Insufficient data points to compute median: {0} total values, 0 valid (all NaN)")]
    NoValidValues(usize),
}

/// Median of the non-NaN values.
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();

    if valid.is_empty() {
        return Err(StatsError::NoValidValues(values.len()));
    }

    valid.sort_by(|a, b| a.total_cmp(b));

    let mid = valid.len() / 2;
    let median_value = if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    };

    Ok(median_value)
}

/// Median of a row, optionally restricted to the pixels flagged in `mask`.
pub fn masked_median(row: ArrayView1<f64>, mask: Option<&[bool]>) -> Result<f64, StatsError> {
    let values: Vec<f64> = match mask {
        Some(mask) => row
            .iter()
            .zip(mask)
            .filter_map(|(&v, &keep)| keep.then_some(v))
            .collect(),
        None => row.to_vec(),
    };
    median(&values)
}

/// Divide every row of `flux` by its median in place.
///
/// Rows whose median is non-finite or not positive cannot be normalized;
/// they are left untouched and their indices are returned so the caller can
/// drop them.
pub fn normalize_by_median(flux: &mut Array2<f64>, mask: Option<&[bool]>) -> Vec<usize> {
    let mut rejected = Vec::new();
    for (i, mut row) in flux.axis_iter_mut(Axis(0)).enumerate() {
        match masked_median(row.view(), mask) {
            Ok(m) if m.is_finite() && m > 0.0 => row.mapv_inplace(|v| v / m),
            _ => rejected.push(i),
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_median_odd_even_and_nan() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert_eq!(median(&[f64::NAN, 5.0, 1.0]).unwrap(), 3.0);
        assert_eq!(
            median(&[f64::NAN, f64::NAN]),
            Err(StatsError::NoValidValues(2))
        );
    }

    #[test]
    fn test_normalize_by_median_rows() {
        let mut flux = array![[2.0, 4.0, 6.0], [0.0, 0.0, 0.0], [-1.0, -2.0, -3.0]];
        let rejected = normalize_by_median(&mut flux, None);
        assert_eq!(rejected, vec![1, 2]);
        assert_relative_eq!(flux[[0, 0]], 0.5);
        assert_relative_eq!(flux[[0, 1]], 1.0);
        assert_relative_eq!(flux[[0, 2]], 1.5);
        assert_eq!(flux[[2, 0]], -1.0);
    }

    #[test]
    fn test_normalize_with_window() {
        let mut flux = array![[1.0, 2.0, 10.0, 10.0]];
        let mask = [false, false, true, true];
        let rejected = normalize_by_median(&mut flux, Some(&mask));
        assert!(rejected.is_empty());
        assert_relative_eq!(flux[[0, 2]], 1.0);
        assert_relative_eq!(flux[[0, 0]], 0.1);
    }
}
