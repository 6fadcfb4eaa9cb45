//! Analytic rest-frame spectral templates.
//!
//! Each object class provides a [`TemplateGenerator`] that draws random
//! model parameters from a seeded RNG and returns a [`SpectralModel`]. The
//! shared [`TemplateGenerator::make_templates`] evaluates the models on a
//! fine native grid and rebins them onto the requested output grid.
//!
//! Fluxes are `f_λ` in arbitrary units; the pipeline normalizes every
//! spectrum before comparing them.

pub mod galaxy;
pub mod lines;
pub mod qso;
pub mod stellar;

use std::collections::BTreeMap;

use log::debug;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::algo::resample::{centers_to_edges, trapz_rebin_edges, ResampleError};
use crate::grid::WavelengthGrid;

pub use galaxy::{GalaxyClass, GalaxyTemplates};
pub use qso::QsoTemplates;
pub use stellar::{SpectralClass, StarTemplates};

/// Errors raised while generating templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template parameter: {0}")]
    InvalidParameter(String),
    #[error("Requested zero templates")]
    NoTemplates,
    #[error("Resampling failed: {0}")]
    Resample(#[from] ResampleError),
}

/// Rest-frame spectral energy distribution
pub trait SpectralModel: Send + Sync {
    /// `f_λ` at `wavelength` (Å), arbitrary units
    fn flux_density(&self, wavelength: f64) -> f64;

    /// Evaluate on many wavelengths at once
    fn sample(&self, wavelengths: &[f64]) -> Vec<f64> {
        wavelengths.iter().map(|&w| self.flux_density(w)).collect()
    }
}

/// Provenance of one generated template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMeta {
    /// Subclass label written to the archetype file
    pub subtype: String,
    /// Seed of the RNG the template was drawn from
    pub seed: u64,
    /// Physical parameters drawn for this template
    pub params: BTreeMap<String, f64>,
}

/// A batch of templates sampled on a common grid
#[derive(Debug, Clone)]
pub struct TemplateSet {
    /// `nmodel × npix` fluxes
    pub flux: Array2<f64>,
    pub meta: Vec<TemplateMeta>,
}

/// One draw from a generator: the model plus its labels
pub struct TemplateDraw<M> {
    pub model: M,
    pub subtype: String,
    pub params: BTreeMap<String, f64>,
}

/// Source of random templates for one object class
pub trait TemplateGenerator: Sync {
    type Model: SpectralModel;

    /// Spectral type written as RRTYPE
    fn rrtype(&self) -> &'static str;

    /// Draw one model
    fn draw(&self, rng: &mut StdRng) -> TemplateDraw<Self::Model>;

    /// Draw `nmodel` templates and rebin them onto `grid`.
    ///
    /// Template `i` uses an RNG seeded with `seed + i`, so a template does
    /// not depend on how many others are drawn. Models are sampled every
    /// `native_step` Å before rebinning.
    fn make_templates(
        &self,
        nmodel: usize,
        seed: u64,
        grid: &WavelengthGrid,
        native_step: f64,
    ) -> Result<TemplateSet, TemplateError> {
        if nmodel == 0 {
            return Err(TemplateError::NoTemplates);
        }
        if !native_step.is_finite() || native_step <= 0.0 {
            return Err(TemplateError::InvalidParameter(format!(
                "native step must be positive, got {native_step}"
            )));
        }

        let edges = centers_to_edges(&grid.wavelengths())?;
        let lo = edges[0] - native_step;
        let hi = edges[edges.len() - 1] + native_step;
        let npts = ((hi - lo) / native_step).ceil() as usize + 1;
        let native: Vec<f64> = (0..npts).map(|k| lo + k as f64 * native_step).collect();

        debug!(
            "Drawing {nmodel} {} templates on {npts} native pixels",
            self.rrtype()
        );

        let rows: Vec<(Vec<f64>, TemplateMeta)> = (0..nmodel)
            .into_par_iter()
            .map(|i| {
                let template_seed = seed.wrapping_add(i as u64);
                let mut rng = StdRng::seed_from_u64(template_seed);
                let draw = self.draw(&mut rng);
                let native_flux = draw.model.sample(&native);
                let flux = trapz_rebin_edges(&native, &native_flux, &edges)?;
                Ok((
                    flux,
                    TemplateMeta {
                        subtype: draw.subtype,
                        seed: template_seed,
                        params: draw.params,
                    },
                ))
            })
            .collect::<Result<_, ResampleError>>()?;

        let npix = grid.npix();
        let mut flux = Array2::zeros((nmodel, npix));
        let mut meta = Vec::with_capacity(nmodel);
        for (i, (row, m)) in rows.into_iter().enumerate() {
            flux.row_mut(i).assign(&ndarray::ArrayView1::from(&row));
            meta.push(m);
        }

        Ok(TemplateSet { flux, meta })
    }
}
