//! Rest-frame wavelength grids.
//!
//! Every spectrum that enters the chi2 computation is sampled on one shared
//! grid. The grid is described the way FITS headers describe it: a start
//! value (CRVAL1), a step (CDELT1), a pixel count and a flag for log10
//! sampling (LOGLAM).

use thiserror::Error;

/// Errors raised when a grid description is not usable
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid bounds must be finite and positive, got {0}..{1}")]
    InvalidBounds(f64, f64),
    #[error("Grid step must be finite and positive, got {0}")]
    InvalidStep(f64),
    #[error("Grid must contain at least 2 pixels, got {0}")]
    TooFewPixels(usize),
    #[error("Grid would need {0} pixels, more than the 10 million pixel limit")]
    TooManyPixels(f64),
}

/// Largest grid accepted, in pixels
pub const MAX_PIXELS: usize = 10_000_000;

/// Pixel count for `span / step` steps plus the first sample.
fn pixel_count(span: f64, step: f64) -> Result<usize, GridError> {
    let count = (span / step + 1e-9).floor() + 1.0;
    if !count.is_finite() || count > MAX_PIXELS as f64 {
        return Err(GridError::TooManyPixels(count));
    }
    Ok(count as usize)
}

/// Uniformly sampled wavelength axis in Angstrom.
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthGrid {
    /// First sample (Å, or log10 Å when `log_lam` is set)
    start: f64,
    /// Sample spacing in the same units as `start`
    step: f64,
    /// Number of pixels
    npix: usize,
    /// Samples are uniform in log10(λ) rather than λ
    log_lam: bool,
}

impl WavelengthGrid {
    /// Linear grid from `wmin` up to and including `wmax` when it falls on a step.
    pub fn linear(wmin: f64, wmax: f64, dw: f64) -> Result<Self, GridError> {
        Self::validate_bounds(wmin, wmax)?;
        if !dw.is_finite() || dw <= 0.0 {
            return Err(GridError::InvalidStep(dw));
        }
        let npix = pixel_count(wmax - wmin, dw)?;
        Self::from_header(wmin, dw, npix, false)
    }

    /// Grid uniform in log10(λ) with spacing `dlog` (dex).
    pub fn log10(wmin: f64, wmax: f64, dlog: f64) -> Result<Self, GridError> {
        Self::validate_bounds(wmin, wmax)?;
        if !dlog.is_finite() || dlog <= 0.0 {
            return Err(GridError::InvalidStep(dlog));
        }
        let (lo, hi) = (wmin.log10(), wmax.log10());
        let npix = pixel_count(hi - lo, dlog)?;
        Self::from_header(lo, dlog, npix, true)
    }

    /// Rebuild a grid from its header description.
    pub fn from_header(
        crval1: f64,
        cdelt1: f64,
        npix: usize,
        log_lam: bool,
    ) -> Result<Self, GridError> {
        if !crval1.is_finite() || (!log_lam && crval1 <= 0.0) {
            return Err(GridError::InvalidBounds(crval1, crval1));
        }
        if !cdelt1.is_finite() || cdelt1 <= 0.0 {
            return Err(GridError::InvalidStep(cdelt1));
        }
        if npix < 2 {
            return Err(GridError::TooFewPixels(npix));
        }
        if npix > MAX_PIXELS {
            return Err(GridError::TooManyPixels(npix as f64));
        }
        Ok(Self {
            start: crval1,
            step: cdelt1,
            npix,
            log_lam,
        })
    }

    fn validate_bounds(wmin: f64, wmax: f64) -> Result<(), GridError> {
        if !wmin.is_finite() || !wmax.is_finite() || wmin <= 0.0 || wmax <= wmin {
            return Err(GridError::InvalidBounds(wmin, wmax));
        }
        Ok(())
    }

    pub fn npix(&self) -> usize {
        self.npix
    }

    pub fn is_log(&self) -> bool {
        self.log_lam
    }

    /// Wavelength of pixel `i` in Angstrom
    pub fn wavelength(&self, i: usize) -> f64 {
        let value = self.start + i as f64 * self.step;
        if self.log_lam {
            10f64.powf(value)
        } else {
            value
        }
    }

    /// All pixel wavelengths in Angstrom
    pub fn wavelengths(&self) -> Vec<f64> {
        (0..self.npix).map(|i| self.wavelength(i)).collect()
    }

    pub fn min(&self) -> f64 {
        self.wavelength(0)
    }

    pub fn max(&self) -> f64 {
        self.wavelength(self.npix - 1)
    }

    /// (CRVAL1, CDELT1, LOGLAM) as written to FITS headers
    pub fn header_values(&self) -> (f64, f64, bool) {
        (self.start, self.step, self.log_lam)
    }

    /// Pixels whose wavelength lies inside `[lo, hi]`
    pub fn window_mask(&self, lo: f64, hi: f64) -> Vec<bool> {
        (0..self.npix)
            .map(|i| {
                let w = self.wavelength(i);
                w >= lo && w <= hi
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_grid_includes_endpoint() {
        let grid = WavelengthGrid::linear(3500.0, 10000.0, 1.0).unwrap();
        assert_eq!(grid.npix(), 6501);
        assert_relative_eq!(grid.min(), 3500.0);
        assert_relative_eq!(grid.max(), 10000.0, epsilon = 1e-9);
        assert!(!grid.is_log());
    }

    #[test]
    fn test_linear_grid_drops_partial_step() {
        let grid = WavelengthGrid::linear(1000.0, 1010.5, 2.0).unwrap();
        assert_eq!(grid.npix(), 6);
        assert_relative_eq!(grid.max(), 1010.0);
    }

    #[test]
    fn test_log_grid_is_uniform_in_log() {
        let grid = WavelengthGrid::log10(1000.0, 10000.0, 0.1).unwrap();
        assert_eq!(grid.npix(), 11);
        let wave = grid.wavelengths();
        for pair in wave.windows(2) {
            assert_relative_eq!((pair[1] / pair[0]).log10(), 0.1, epsilon = 1e-9);
        }
        assert_relative_eq!(grid.max(), 10000.0, max_relative = 1e-9);
        let (crval1, cdelt1, log_lam) = grid.header_values();
        assert_relative_eq!(crval1, 3.0, epsilon = 1e-12);
        assert_relative_eq!(cdelt1, 0.1);
        assert!(log_lam);
    }

    #[test]
    fn test_invalid_grids_are_rejected() {
        assert_eq!(
            WavelengthGrid::linear(5000.0, 4000.0, 1.0),
            Err(GridError::InvalidBounds(5000.0, 4000.0))
        );
        assert_eq!(
            WavelengthGrid::linear(4000.0, 5000.0, 0.0),
            Err(GridError::InvalidStep(0.0))
        );
        assert!(WavelengthGrid::linear(-1.0, 5000.0, 1.0).is_err());
        assert_eq!(
            WavelengthGrid::from_header(3600.0, 1.0, 1, false),
            Err(GridError::TooFewPixels(1))
        );
    }

    #[test]
    fn test_tiny_steps_are_rejected() {
        assert!(matches!(
            WavelengthGrid::linear(1.0, 2.0, 1e-300),
            Err(GridError::TooManyPixels(_))
        ));
        assert!(matches!(
            WavelengthGrid::linear(3600.0, 9800.0, 1e-4),
            Err(GridError::TooManyPixels(_))
        ));
        assert!(matches!(
            WavelengthGrid::log10(3600.0, 9800.0, 1e-310),
            Err(GridError::TooManyPixels(_))
        ));
        assert!(matches!(
            WavelengthGrid::from_header(3600.0, 1.0, MAX_PIXELS + 1, false),
            Err(GridError::TooManyPixels(_))
        ));
    }

    #[test]
    fn test_window_mask() {
        let grid = WavelengthGrid::linear(100.0, 110.0, 1.0).unwrap();
        let mask = grid.window_mask(102.0, 104.5);
        let selected: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        assert_eq!(selected, vec![2, 3, 4]);
    }
}
