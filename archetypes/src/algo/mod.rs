//! Numerical kernels shared by the simulators, the fitter and the pipeline
//!
//! Integration, flux-conserving resampling, robust normalization and
//! weighted linear least squares.

pub mod lstsq;
pub mod resample;
pub mod stats;
pub mod trapezoid;

pub use lstsq::{weighted_least_squares, LstsqError, LstsqSolution};
pub use resample::{centers_to_edges, interp, trapz_rebin, trapz_rebin_edges, ResampleError};
pub use stats::{masked_median, median, normalize_by_median, StatsError};
pub use trapezoid::trap_integrate;
