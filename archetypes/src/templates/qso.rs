//! Quasar templates: power-law continuum with broad emission lines.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use super::lines::{
    EmissionLine, SpectralLine, CIII, CIV, H_ALPHA, H_BETA, LYA, MGII, NV, OIII_5008, SIIV,
};
use super::{SpectralModel, TemplateDraw, TemplateError, TemplateGenerator};

const NORM_WAVELENGTH: f64 = 3000.0;

/// Broad lines with (mean, scatter) rest equivalent widths in Å
const BROAD_LINES: [(SpectralLine, f64, f64); 8] = [
    (LYA, 90.0, 30.0),
    (NV, 20.0, 8.0),
    (SIIV, 10.0, 4.0),
    (CIV, 35.0, 10.0),
    (CIII, 20.0, 6.0),
    (MGII, 30.0, 10.0),
    (H_BETA, 60.0, 20.0),
    (H_ALPHA, 250.0, 70.0),
];

/// Power law `f_λ ∝ λ^-(2+α)` plus emission lines and optional
/// Lyman-alpha forest absorption.
#[derive(Debug, Clone)]
pub struct QsoSpectrum {
    alpha: f64,
    lines: Vec<EmissionLine>,
    /// Source redshift for the forest, `None` disables it
    forest_redshift: Option<f64>,
}

impl QsoSpectrum {
    pub fn continuum(&self, wavelength: f64) -> f64 {
        (wavelength / NORM_WAVELENGTH).powf(-(2.0 + self.alpha))
    }

    /// Mean IGM transmission blueward of Lyα for a source at `z`
    pub fn forest_transmission(&self, wavelength: f64) -> f64 {
        match self.forest_redshift {
            Some(z) if wavelength < LYA.wavelength => {
                let one_plus_z_abs = wavelength * (1.0 + z) / LYA.wavelength;
                (-0.0018 * one_plus_z_abs.powf(3.92)).exp()
            }
            _ => 1.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl SpectralModel for QsoSpectrum {
    fn flux_density(&self, wavelength: f64) -> f64 {
        if wavelength <= 0.0 {
            return 0.0;
        }
        let emitted = self.continuum(wavelength)
            + self.lines.iter().map(|l| l.at(wavelength)).sum::<f64>();
        emitted * self.forest_transmission(wavelength)
    }
}

/// Quasar generator
#[derive(Debug, Clone)]
pub struct QsoTemplates {
    alpha_mean: f64,
    alpha_sigma: f64,
    /// Draw a source redshift in this range and apply forest absorption
    forest: Option<(f64, f64)>,
}

impl QsoTemplates {
    /// `alpha_mean` and `alpha_sigma` describe the continuum slope; when
    /// `forest` is set the Lyα forest is imprinted for a redshift drawn
    /// uniformly from that range.
    pub fn new(
        alpha_mean: f64,
        alpha_sigma: f64,
        forest: Option<(f64, f64)>,
    ) -> Result<Self, TemplateError> {
        if !(alpha_mean.is_finite() && alpha_sigma.is_finite() && alpha_sigma >= 0.0) {
            return Err(TemplateError::InvalidParameter(format!(
                "continuum slope N({alpha_mean}, {alpha_sigma}) is not a valid distribution"
            )));
        }
        if let Some((lo, hi)) = forest {
            if !(lo >= 0.0 && hi > lo && hi.is_finite()) {
                return Err(TemplateError::InvalidParameter(format!(
                    "forest redshift range must satisfy 0 <= lo < hi, got {lo}..{hi}"
                )));
            }
        }
        Ok(Self {
            alpha_mean,
            alpha_sigma,
            forest,
        })
    }
}

impl Default for QsoTemplates {
    fn default() -> Self {
        Self {
            alpha_mean: -0.5,
            alpha_sigma: 0.3,
            forest: Some((1.8, 3.5)),
        }
    }
}

impl TemplateGenerator for QsoTemplates {
    type Model = QsoSpectrum;

    fn rrtype(&self) -> &'static str {
        "QSO"
    }

    fn draw(&self, rng: &mut StdRng) -> TemplateDraw<QsoSpectrum> {
        let z: f64 = rng.sample(StandardNormal);
        let alpha = (self.alpha_mean + self.alpha_sigma * z).clamp(-1.5, 0.5);
        let fwhm_kms = rng.gen_range(2000.0..=8000.0);
        let forest_redshift = self.forest.map(|(lo, hi)| rng.gen_range(lo..=hi));

        let mut model = QsoSpectrum {
            alpha,
            lines: Vec::with_capacity(BROAD_LINES.len() + 1),
            forest_redshift,
        };

        let mut params = BTreeMap::from([
            ("ALPHA".to_string(), alpha),
            ("FWHM".to_string(), fwhm_kms),
        ]);

        for (line, mean_ew, scatter) in BROAD_LINES {
            let ew = (mean_ew + scatter * rng.gen_range(-1.0..=1.0)).max(0.0);
            let jitter = rng.gen_range(0.8..=1.2);
            let sigma_kms = fwhm_kms * jitter / 2.354_820_045;
            model.lines.push(EmissionLine {
                line,
                flux: ew * model.continuum(line.wavelength),
                sigma: line.sigma_for_velocity(sigma_kms),
            });
            params.insert(format!("EW_{}", line.name), ew);
        }

        // Narrow [OIII] from the host
        let oiii_ew = rng.gen_range(0.0..=20.0);
        model.lines.push(EmissionLine {
            line: OIII_5008,
            flux: oiii_ew * model.continuum(OIII_5008.wavelength),
            sigma: OIII_5008.sigma_for_velocity(200.0),
        });
        params.insert(format!("EW_{}", OIII_5008.name), oiii_ew);

        if let Some(z) = forest_redshift {
            params.insert("ZFOREST".to_string(), z);
        }

        TemplateDraw {
            model,
            subtype: "QSO".to_string(),
            params,
        }
    }
}
