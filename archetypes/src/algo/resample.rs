//! Interpolation and flux-conserving resampling of 1D spectra.
//!
//! `trapz_rebin` is the workhorse: it treats the input as a piecewise-linear
//! function and returns its average over each output bin, so integrated flux
//! is preserved when moving between grids of different resolution.

use thiserror::Error;

/// Errors that can occur during interpolation and rebinning
#[derive(Error, Debug, PartialEq)]
pub enum ResampleError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Output edges [{0}, {1}] must lie within input range [{2}, {3}]")]
    EdgesOutOfRange(f64, f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length ({0} != {1})")]
    MismatchedLengths(usize, usize),
    #[error("X values must be sorted in strictly ascending order")]
    UnsortedData,
    #[error("Input contains non-finite values")]
    NonFinite,
}

fn strictly_ascending(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[1] > w[0])
}

fn validate_samples(xs: &[f64], ys: &[f64]) -> Result<(), ResampleError> {
    if xs.len() != ys.len() {
        return Err(ResampleError::MismatchedLengths(xs.len(), ys.len()));
    }
    if xs.len() < 2 {
        return Err(ResampleError::InsufficientData);
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err(ResampleError::NonFinite);
    }
    if !strictly_ascending(xs) {
        return Err(ResampleError::UnsortedData);
    }
    Ok(())
}

/// Linear interpolation of `ys(xs)` at `x`.
///
/// `xs` must be strictly ascending and `x` inside `[xs[0], xs[n-1]]`.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, ResampleError> {
    validate_samples(xs, ys)?;

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];
    if !(min_x..=max_x).contains(&x) {
        return Err(ResampleError::OutOfBounds(x, min_x, max_x));
    }

    let idx = xs.partition_point(|&v| v < x);
    if xs[idx] == x {
        return Ok(ys[idx]);
    }

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);
    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Bin edges for pixel centers.
///
/// Interior edges are the midpoints between neighbours; the outer edges
/// extend half a pixel beyond the first and last centers.
pub fn centers_to_edges(centers: &[f64]) -> Result<Vec<f64>, ResampleError> {
    let n = centers.len();
    if n < 2 {
        return Err(ResampleError::InsufficientData);
    }

    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centers[0] - 0.5 * (centers[1] - centers[0]));
    edges.extend(centers.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    edges.push(centers[n - 1] + 0.5 * (centers[n - 1] - centers[n - 2]));
    Ok(edges)
}

/// Average of the piecewise-linear `y(x)` over each bin of `edges`.
///
/// Returns `edges.len() - 1` values. The edges must be strictly ascending
/// and lie inside `[x[0], x[n-1]]`.
pub fn trapz_rebin_edges(x: &[f64], y: &[f64], edges: &[f64]) -> Result<Vec<f64>, ResampleError> {
    validate_samples(x, y)?;
    if edges.len() < 2 {
        return Err(ResampleError::InsufficientData);
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(ResampleError::NonFinite);
    }
    if !strictly_ascending(edges) {
        return Err(ResampleError::UnsortedData);
    }

    let n = x.len();
    let (lo, hi) = (edges[0], edges[edges.len() - 1]);
    if lo < x[0] || hi > x[n - 1] {
        return Err(ResampleError::EdgesOutOfRange(lo, hi, x[0], x[n - 1]));
    }

    let lerp = |j: usize, t: f64| y[j] + (t - x[j]) * (y[j + 1] - y[j]) / (x[j + 1] - x[j]);

    // Segment index such that x[j] <= current edge <= x[j + 1]
    let mut j = (x.partition_point(|&v| v <= lo) - 1).min(n - 2);
    let mut result = Vec::with_capacity(edges.len() - 1);

    for bin in edges.windows(2) {
        let (a, b) = (bin[0], bin[1]);
        while j + 2 < n && x[j + 1] <= a {
            j += 1;
        }

        let mut cur_x = a;
        let mut cur_y = lerp(j, a);
        let mut integral = 0.0;

        while j + 1 < n - 1 && x[j + 1] < b {
            integral += 0.5 * (x[j + 1] - cur_x) * (cur_y + y[j + 1]);
            cur_x = x[j + 1];
            cur_y = y[j + 1];
            j += 1;
        }

        integral += 0.5 * (b - cur_x) * (cur_y + lerp(j, b));
        result.push(integral / (b - a));
    }

    Ok(result)
}

/// Rebin `y(x)` onto pixels centered at `new_x`.
pub fn trapz_rebin(x: &[f64], y: &[f64], new_x: &[f64]) -> Result<Vec<f64>, ResampleError> {
    let edges = centers_to_edges(new_x)?;
    trapz_rebin_edges(x, y, &edges)
}
