//! Observed survey spectra and their PCA-basis fits.
//!
//! Observed spectra are noisy and sampled in the observed frame. Each one is
//! fitted with a linear combination of the basis vectors shifted to its
//! known redshift; the noise-free rest-frame model is then evaluated on the
//! archetype grid and used as the pipeline input.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::{s, Array2, ArrayView1};
use rayon::prelude::*;
use thiserror::Error;

use crate::algo::lstsq::{weighted_least_squares, LstsqError};
use crate::algo::resample::{centers_to_edges, trapz_rebin_edges, ResampleError};
use crate::grid::WavelengthGrid;
use crate::pipeline::{PipelineInput, SourceRows};

/// Wavelengths must be finite and strictly ascending with at least 2 samples.
fn check_wavelengths(wavelength: &[f64]) -> Result<(), FitError> {
    if wavelength.len() < 2 {
        return Err(FitError::Resample(ResampleError::InsufficientData));
    }
    if wavelength.iter().any(|w| !w.is_finite()) {
        return Err(FitError::Resample(ResampleError::NonFinite));
    }
    if !wavelength.windows(2).all(|w| w[1] > w[0]) {
        return Err(FitError::Resample(ResampleError::UnsortedData));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Basis has no coverage of the observed pixels at z = {0}")]
    NoCoverage(f64),
    #[error("Need at least {needed} good pixels, got {got}")]
    NotEnoughPixels { needed: usize, got: usize },
    #[error("Basis covers [{basis_min}, {basis_max}] Å but the grid spans [{grid_min}, {grid_max}] Å")]
    GridNotCovered {
        grid_min: f64,
        grid_max: f64,
        basis_min: f64,
        basis_max: f64,
    },
    #[error("Resampling failed: {0}")]
    Resample(#[from] ResampleError),
    #[error("Least-squares fit failed: {0}")]
    Lstsq(#[from] LstsqError),
}

/// Observed-frame spectra with known redshifts
#[derive(Debug, Clone)]
pub struct SurveySpectra {
    /// Observed wavelength of each pixel (Å), shared by all spectra
    pub wavelength: Vec<f64>,
    /// `nspec × nwave`
    pub flux: Array2<f64>,
    /// Inverse variance, same shape as `flux`
    pub ivar: Array2<f64>,
    pub redshift: Vec<f64>,
    /// Per-spectrum label, empty when the survey provides none
    pub subtype: Vec<String>,
}

impl SurveySpectra {
    pub fn new(
        wavelength: Vec<f64>,
        flux: Array2<f64>,
        ivar: Array2<f64>,
        redshift: Vec<f64>,
        subtype: Vec<String>,
    ) -> Result<Self, FitError> {
        let (nspec, nwave) = flux.dim();
        if wavelength.len() != nwave {
            return Err(FitError::ShapeMismatch(format!(
                "{} wavelengths for {nwave} flux columns",
                wavelength.len()
            )));
        }
        if ivar.dim() != flux.dim() {
            return Err(FitError::ShapeMismatch(format!(
                "flux is {:?} but ivar is {:?}",
                flux.dim(),
                ivar.dim()
            )));
        }
        if redshift.len() != nspec || subtype.len() != nspec {
            return Err(FitError::ShapeMismatch(format!(
                "{nspec} spectra but {} redshifts and {} subtypes",
                redshift.len(),
                subtype.len()
            )));
        }
        check_wavelengths(&wavelength)?;
        Ok(Self {
            wavelength,
            flux,
            ivar,
            redshift,
            subtype,
        })
    }

    pub fn nspec(&self) -> usize {
        self.flux.nrows()
    }
}

/// Rest-frame PCA basis for one spectral type
#[derive(Debug, Clone)]
pub struct PcaBasis {
    /// Rest-frame wavelength (Å), strictly ascending
    pub wavelength: Vec<f64>,
    /// `ncomp × nwave`
    pub vectors: Array2<f64>,
    pub rrtype: String,
    pub subtype: String,
}

impl PcaBasis {
    pub fn new(
        wavelength: Vec<f64>,
        vectors: Array2<f64>,
        rrtype: impl Into<String>,
        subtype: impl Into<String>,
    ) -> Result<Self, FitError> {
        if vectors.ncols() != wavelength.len() || vectors.nrows() == 0 {
            return Err(FitError::ShapeMismatch(format!(
                "basis vectors are {:?} for {} wavelengths",
                vectors.dim(),
                wavelength.len()
            )));
        }
        check_wavelengths(&wavelength)?;
        Ok(Self {
            wavelength,
            vectors,
            rrtype: rrtype.into(),
            subtype: subtype.into(),
        })
    }

    pub fn ncomp(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn min(&self) -> f64 {
        self.wavelength[0]
    }

    pub fn max(&self) -> f64 {
        self.wavelength[self.wavelength.len() - 1]
    }

    /// `Σ c_k v_k` on the basis wavelengths
    pub fn model(&self, coefficients: &[f64]) -> Vec<f64> {
        let coefficients = ArrayView1::from(coefficients);
        self.vectors.t().dot(&coefficients).to_vec()
    }

    fn check_covers(&self, edges: &[f64]) -> Result<(), FitError> {
        let (lo, hi) = (edges[0], edges[edges.len() - 1]);
        if lo < self.min() || hi > self.max() {
            return Err(FitError::GridNotCovered {
                grid_min: lo,
                grid_max: hi,
                basis_min: self.min(),
                basis_max: self.max(),
            });
        }
        Ok(())
    }
}

/// Best-fit basis coefficients for one spectrum
#[derive(Debug, Clone)]
pub struct SpectrumFit {
    pub coefficients: Vec<f64>,
    pub chi2: f64,
    pub reduced_chi2: f64,
    /// Pixels with positive inverse variance inside the basis coverage
    pub n_good: usize,
}

/// Fit one observed spectrum at redshift `z`.
///
/// The basis is shifted to `λ(1+z)` and rebinned onto the observed pixels
/// whose bin edges lie inside its coverage. Pixels with non-finite flux or
/// non-positive inverse variance carry zero weight.
pub fn fit_spectrum(
    basis: &PcaBasis,
    wavelength: &[f64],
    flux: ArrayView1<f64>,
    ivar: ArrayView1<f64>,
    z: f64,
) -> Result<SpectrumFit, FitError> {
    if flux.len() != wavelength.len() || ivar.len() != wavelength.len() {
        return Err(FitError::ShapeMismatch(format!(
            "{} wavelengths, {} flux values, {} ivar values",
            wavelength.len(),
            flux.len(),
            ivar.len()
        )));
    }
    check_wavelengths(wavelength)?;

    let shifted: Vec<f64> = basis.wavelength.iter().map(|w| w * (1.0 + z)).collect();
    let (lo, hi) = (shifted[0], shifted[shifted.len() - 1]);

    // Pixels whose whole bin is covered form a contiguous run
    let edges = centers_to_edges(wavelength)?;
    let first = edges.partition_point(|&e| e < lo);
    let last_edge = edges.partition_point(|&e| e <= hi);
    if first + 1 >= last_edge {
        return Err(FitError::NoCoverage(z));
    }
    let pixels = first..last_edge - 1;
    let sub_edges = &edges[first..last_edge];
    let npix = pixels.len();

    let mut design = DMatrix::zeros(npix, basis.ncomp());
    for (k, vector) in basis.vectors.outer_iter().enumerate() {
        let rebinned = trapz_rebin_edges(&shifted, &vector.to_vec(), sub_edges)?;
        for (r, v) in rebinned.into_iter().enumerate() {
            design[(r, k)] = v;
        }
    }

    let mut data = Vec::with_capacity(npix);
    let mut weights = Vec::with_capacity(npix);
    for p in pixels {
        let (f, w) = (flux[p], ivar[p]);
        if f.is_finite() && w.is_finite() && w > 0.0 {
            data.push(f);
            weights.push(w);
        } else {
            data.push(0.0);
            weights.push(0.0);
        }
    }

    let n_good = weights.iter().filter(|&&w| w > 0.0).count();
    if n_good <= basis.ncomp() {
        return Err(FitError::NotEnoughPixels {
            needed: basis.ncomp() + 1,
            got: n_good,
        });
    }

    let solution = weighted_least_squares(&design, &data, &weights)?;
    Ok(SpectrumFit {
        reduced_chi2: solution.reduced_chi2(),
        coefficients: solution.coefficients,
        chi2: solution.chi2,
        n_good,
    })
}

/// Acceptance cuts applied by [`fit_survey`]
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub z_min: f64,
    pub z_max: f64,
    pub min_good_pixels: usize,
    /// Fits with a larger reduced chi2 are rejected
    pub max_reduced_chi2: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            z_min: 0.0,
            z_max: f64::INFINITY,
            min_good_pixels: 100,
            max_reduced_chi2: f64::INFINITY,
        }
    }
}

/// Why spectra were left out of the fitted batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub redshift: usize,
    pub too_few_pixels: usize,
    pub fit_failed: usize,
    pub chi2: usize,
}

impl RejectionCounts {
    pub fn total(&self) -> usize {
        self.redshift + self.too_few_pixels + self.fit_failed + self.chi2
    }
}

/// Noise-free rest-frame models of the accepted spectra
#[derive(Debug, Clone)]
pub struct FittedSpectra {
    /// `naccepted × grid.npix()`
    pub flux: Array2<f64>,
    pub subtype: Vec<String>,
    pub redshift: Vec<f64>,
    /// Reduced chi2 of each accepted fit
    pub reduced_chi2: Vec<f64>,
    /// Row of each accepted spectrum in the survey
    pub source_index: Vec<usize>,
    /// Spectra in the survey, accepted or not
    pub n_survey: usize,
    pub rejected: RejectionCounts,
}

impl FittedSpectra {
    pub fn len(&self) -> usize {
        self.source_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_index.is_empty()
    }

    /// Keep only the first `limit` accepted spectra.
    pub fn truncate(&mut self, limit: usize) {
        if limit >= self.len() {
            return;
        }
        self.flux = self.flux.slice(s![..limit, ..]).to_owned();
        self.subtype.truncate(limit);
        self.redshift.truncate(limit);
        self.reduced_chi2.truncate(limit);
        self.source_index.truncate(limit);
    }
}

/// Pipeline input for fitted survey spectra.
///
/// Keeps at most `max_spectra` spectra, labels unlabelled ones with the basis
/// subtype, and records survey rows, redshifts and fit quality so archetypes
/// can be traced back to the survey file.
pub fn pipeline_input(
    mut fitted: FittedSpectra,
    basis: &PcaBasis,
    grid: WavelengthGrid,
    max_spectra: Option<usize>,
) -> PipelineInput {
    if let Some(limit) = max_spectra {
        if fitted.len() > limit {
            info!("Keeping the first {limit} of {} fitted spectra", fitted.len());
            fitted.truncate(limit);
        }
    }

    let subtype = fitted
        .subtype
        .into_iter()
        .map(|s| if s.is_empty() { basis.subtype.clone() } else { s })
        .collect();
    let params = fitted
        .redshift
        .iter()
        .zip(&fitted.reduced_chi2)
        .map(|(&z, &rchi2)| BTreeMap::from([("Z".to_string(), z), ("RCHI2".to_string(), rchi2)]))
        .collect();

    PipelineInput {
        grid,
        flux: fitted.flux,
        subtype,
        rrtype: basis.rrtype.clone(),
        seed: None,
        params,
        source: Some(SourceRows {
            index: fitted.source_index,
            total: fitted.n_survey,
        }),
    }
}

enum Outcome {
    Accepted(Vec<f64>, f64),
    Redshift,
    TooFewPixels,
    FitFailed,
    Chi2,
}

/// Fit every survey spectrum and evaluate accepted models on `grid`.
pub fn fit_survey(
    spectra: &SurveySpectra,
    basis: &PcaBasis,
    grid: &WavelengthGrid,
    params: &FitParams,
) -> Result<FittedSpectra, FitError> {
    let grid_edges = centers_to_edges(&grid.wavelengths())?;
    basis.check_covers(&grid_edges)?;

    info!(
        "Fitting {} spectra with {} {} basis vectors",
        spectra.nspec(),
        basis.ncomp(),
        basis.rrtype
    );

    let outcomes: Vec<Outcome> = (0..spectra.nspec())
        .into_par_iter()
        .map(|i| -> Result<Outcome, FitError> {
            let z = spectra.redshift[i];
            if !(z.is_finite() && z >= params.z_min && z <= params.z_max) {
                return Ok(Outcome::Redshift);
            }
            let fit = match fit_spectrum(
                basis,
                &spectra.wavelength,
                spectra.flux.row(i),
                spectra.ivar.row(i),
                z,
            ) {
                Ok(fit) => fit,
                Err(FitError::NotEnoughPixels { .. }) | Err(FitError::NoCoverage(_)) => {
                    return Ok(Outcome::TooFewPixels)
                }
                Err(e) => {
                    debug!("Spectrum {i} at z = {z}: {e}");
                    return Ok(Outcome::FitFailed);
                }
            };
            if fit.n_good < params.min_good_pixels {
                return Ok(Outcome::TooFewPixels);
            }
            if fit.reduced_chi2.is_nan() || fit.reduced_chi2 > params.max_reduced_chi2 {
                return Ok(Outcome::Chi2);
            }
            let model = trapz_rebin_edges(
                &basis.wavelength,
                &basis.model(&fit.coefficients),
                &grid_edges,
            )?;
            Ok(Outcome::Accepted(model, fit.reduced_chi2))
        })
        .collect::<Result<_, FitError>>()?;

    let mut rejected = RejectionCounts::default();
    let mut rows = Vec::new();
    let mut source_index = Vec::new();
    let mut reduced_chi2 = Vec::new();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Outcome::Accepted(model, rchi2) => {
                rows.extend(model);
                source_index.push(i);
                reduced_chi2.push(rchi2);
            }
            Outcome::Redshift => rejected.redshift += 1,
            Outcome::TooFewPixels => rejected.too_few_pixels += 1,
            Outcome::FitFailed => rejected.fit_failed += 1,
            Outcome::Chi2 => rejected.chi2 += 1,
        }
    }

    if rejected.total() > 0 {
        warn!(
            "Rejected {} of {} spectra: {} outside z window, {} too few pixels, {} failed fits, {} above chi2 cut",
            rejected.total(),
            spectra.nspec(),
            rejected.redshift,
            rejected.too_few_pixels,
            rejected.fit_failed,
            rejected.chi2
        );
    }
    info!("Accepted {} spectra", source_index.len());

    let flux = Array2::from_shape_vec((source_index.len(), grid.npix()), rows)
        .map_err(|e| FitError::ShapeMismatch(e.to_string()))?;

    Ok(FittedSpectra {
        flux,
        subtype: source_index
            .iter()
            .map(|&i| spectra.subtype[i].clone())
            .collect(),
        redshift: source_index.iter().map(|&i| spectra.redshift[i]).collect(),
        reduced_chi2,
        source_index,
        n_survey: spectra.nspec(),
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn line(w: f64) -> f64 {
        (-0.5 * ((w - 5000.0) / 40.0).powi(2)).exp()
    }

    /// Two components on 3000–9000 Å: a constant and a broad line at 5000 Å
    fn basis() -> PcaBasis {
        let wavelength: Vec<f64> = (0..=6000).map(|i| 3000.0 + i as f64).collect();
        let mut vectors = Array2::zeros((2, wavelength.len()));
        for (k, &w) in wavelength.iter().enumerate() {
            vectors[[0, k]] = 1.0;
            vectors[[1, k]] = line(w);
        }
        PcaBasis::new(wavelength, vectors, "GALAXY", "").unwrap()
    }

    fn observed_wavelength() -> Vec<f64> {
        (0..=3600).map(|i| 3600.0 + 2.0 * i as f64).collect()
    }

    fn observe(wavelength: &[f64], z: f64, c: [f64; 2]) -> Array1<f64> {
        wavelength
            .iter()
            .map(|&w| c[0] + c[1] * line(w / (1.0 + z)))
            .collect()
    }

    #[test]
    fn test_fit_recovers_coefficients() {
        let basis = basis();
        let wavelength = observed_wavelength();
        let flux = observe(&wavelength, 0.2, [2.0, 0.5]);
        let ivar = Array1::ones(wavelength.len());

        let fit = fit_spectrum(&basis, &wavelength, flux.view(), ivar.view(), 0.2).unwrap();
        assert_relative_eq!(fit.coefficients[0], 2.0, max_relative = 1e-3);
        assert_relative_eq!(fit.coefficients[1], 0.5, max_relative = 1e-3);
        assert!(fit.reduced_chi2 < 1e-4);
        // Bins straddling the shifted basis edges are excluded
        assert!(fit.n_good < wavelength.len());
    }

    #[test]
    fn test_bad_pixels_are_ignored() {
        let basis = basis();
        let wavelength = observed_wavelength();
        let mut flux = observe(&wavelength, 0.1, [1.0, 2.0]);
        let mut ivar = Array1::ones(wavelength.len());
        flux[500] = f64::NAN;
        flux[900] = 1e6;
        ivar[900] = 0.0;

        let fit = fit_spectrum(&basis, &wavelength, flux.view(), ivar.view(), 0.1).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, max_relative = 1e-3);
        assert_relative_eq!(fit.coefficients[1], 2.0, max_relative = 1e-3);
    }

    #[test]
    fn test_no_coverage() {
        let basis = basis();
        let wavelength = observed_wavelength();
        let flux = Array1::ones(wavelength.len());
        let err = fit_spectrum(&basis, &wavelength, flux.view(), flux.view(), 5.0).unwrap_err();
        assert!(matches!(err, FitError::NoCoverage(_)));
    }

    #[test]
    fn test_fit_survey_filters_and_evaluates() {
        let basis = basis();
        let wavelength = observed_wavelength();
        let redshift = vec![0.2, 0.1, 2.0];
        let mut flux = Array2::zeros((3, wavelength.len()));
        for (i, &z) in redshift.iter().enumerate() {
            flux.row_mut(i).assign(&observe(&wavelength, z, [1.0, 1.0 + i as f64]));
        }
        let ivar = Array2::ones(flux.dim());
        let subtype = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let spectra = SurveySpectra::new(wavelength, flux, ivar, redshift, subtype).unwrap();

        let grid = WavelengthGrid::linear(3500.0, 8000.0, 5.0).unwrap();
        let params = FitParams {
            z_min: 0.0,
            z_max: 1.0,
            min_good_pixels: 10,
            max_reduced_chi2: 1.0,
        };
        let fitted = fit_survey(&spectra, &basis, &grid, &params).unwrap();

        assert_eq!(fitted.source_index, vec![0, 1]);
        assert_eq!(fitted.n_survey, 3);
        assert_eq!(fitted.reduced_chi2.len(), 2);
        assert_eq!(fitted.subtype, vec!["A", "B"]);
        assert_eq!(fitted.rejected.redshift, 1);
        assert_eq!(fitted.flux.dim(), (2, grid.npix()));

        let at_line = grid
            .wavelengths()
            .iter()
            .position(|&w| (w - 5000.0).abs() < 1e-9)
            .unwrap();
        assert_relative_eq!(fitted.flux[[1, at_line]], 3.0, max_relative = 2e-3);
        assert_relative_eq!(fitted.flux[[0, 0]], 1.0, max_relative = 1e-3);
    }

    #[test]
    fn test_grid_must_be_covered() {
        let basis = basis();
        let wavelength = observed_wavelength();
        let spectra = SurveySpectra::new(
            wavelength.clone(),
            Array2::ones((1, wavelength.len())),
            Array2::ones((1, wavelength.len())),
            vec![0.1],
            vec![String::new()],
        )
        .unwrap();
        let grid = WavelengthGrid::linear(1000.0, 8000.0, 5.0).unwrap();
        let err = fit_survey(&spectra, &basis, &grid, &FitParams::default()).unwrap_err();
        assert!(matches!(err, FitError::GridNotCovered { .. }));
    }

    #[test]
    fn test_bad_wavelengths_are_rejected() {
        let basis = basis();
        let mut wavelength = observed_wavelength();
        wavelength[0] = f64::NAN;
        let flux = Array1::ones(wavelength.len());
        let err = fit_spectrum(&basis, &wavelength, flux.view(), flux.view(), 0.1).unwrap_err();
        assert!(matches!(err, FitError::Resample(ResampleError::NonFinite)));

        let nwave = wavelength.len();
        let survey = SurveySpectra::new(
            wavelength,
            Array2::ones((1, nwave)),
            Array2::ones((1, nwave)),
            vec![0.1],
            vec![String::new()],
        );
        assert!(matches!(
            survey,
            Err(FitError::Resample(ResampleError::NonFinite))
        ));

        let mut repeated = observed_wavelength();
        repeated[10] = repeated[9];
        let survey = SurveySpectra::new(
            repeated,
            Array2::ones((1, nwave)),
            Array2::ones((1, nwave)),
            vec![0.1],
            vec![String::new()],
        );
        assert!(matches!(
            survey,
            Err(FitError::Resample(ResampleError::UnsortedData))
        ));

        let wavelength = vec![4000.0, f64::NAN, 4002.0];
        let basis = PcaBasis::new(wavelength, Array2::ones((1, 3)), "GALAXY", "");
        assert!(matches!(
            basis,
            Err(FitError::Resample(ResampleError::NonFinite))
        ));
    }

    fn fitted(n_survey: usize, source_index: Vec<usize>, subtype: &[&str]) -> FittedSpectra {
        let n = source_index.len();
        FittedSpectra {
            flux: Array2::from_shape_fn((n, 4), |(i, _)| i as f64 + 1.0),
            subtype: subtype.iter().map(|s| s.to_string()).collect(),
            redshift: (0..n).map(|i| 0.1 * (i + 1) as f64).collect(),
            reduced_chi2: vec![1.0; n],
            source_index,
            n_survey,
            rejected: RejectionCounts::default(),
        }
    }

    #[test]
    fn test_pipeline_input_keeps_survey_provenance() {
        let grid = WavelengthGrid::linear(4000.0, 4003.0, 1.0).unwrap();
        let basis = PcaBasis::new(
            vec![3000.0, 9000.0],
            Array2::ones((1, 2)),
            "GALAXY",
            "ELG",
        )
        .unwrap();

        // Survey row 0 was rejected; the fitted rows are survey rows 1, 2 and 4
        let input = pipeline_input(fitted(5, vec![1, 2, 4], &["", "LRG", ""]), &basis, grid, None);

        assert_eq!(input.subtype, vec!["ELG", "LRG", "ELG"]);
        assert_eq!(input.rrtype, "GALAXY");
        assert_eq!(input.seed, None);
        assert_eq!(
            input.source,
            Some(SourceRows {
                index: vec![1, 2, 4],
                total: 5
            })
        );
        assert_relative_eq!(input.params[2]["Z"], 0.3);
        assert_relative_eq!(input.params[0]["RCHI2"], 1.0);
    }

    #[test]
    fn test_pipeline_input_truncates_every_field() {
        let grid = WavelengthGrid::linear(4000.0, 4003.0, 1.0).unwrap();
        let basis = PcaBasis::new(vec![3000.0, 9000.0], Array2::ones((1, 2)), "STAR", "").unwrap();

        let input = pipeline_input(
            fitted(6, vec![0, 3, 4, 5], &["A", "B", "C", "D"]),
            &basis,
            grid,
            Some(2),
        );

        assert_eq!(input.flux.dim(), (2, 4));
        assert_relative_eq!(input.flux[[1, 0]], 2.0);
        assert_eq!(input.subtype, vec!["A", "B"]);
        assert_eq!(input.params.len(), 2);
        let source = input.source.unwrap();
        assert_eq!(source.index, vec![0, 3]);
        assert_eq!(source.total, 6);

        let mut all = fitted(6, vec![0, 3], &["A", "B"]);
        all.truncate(10);
        assert_eq!(all.len(), 2);
    }
}
