//! Trapezoidal integration of sampled curves.

/// Integrate `ys(xs)` with the trapezoid rule.
///
/// Returns 0.0 for fewer than two samples. `xs` is expected to be sorted
/// ascending; the caller guarantees matching lengths.
pub fn trap_integrate(xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| 0.5 * (x[1] - x[0]) * (y[0] + y[1]))
        .sum()
}
