//! Stellar templates: Planck continua with temperature-dependent absorption.
//!
//! Line strengths follow the qualitative behaviour along the Harvard
//! sequence: Balmer lines peak in A stars, Ca II H&K and the Mg b / Na D
//! metal lines dominate in cool stars.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;

use super::lines::{planck, AbsorptionLine, BALMER, CAII_H, CAII_K, MG_B, NA_D};
use super::{SpectralModel, TemplateDraw, TemplateError, TemplateGenerator};
use crate::algo::resample::interp;

/// The Morgan-Keenan spectral classes, hottest to coolest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpectralClass {
    /// Above 30,000K, ionized helium lines
    O,
    /// 10,000-30,000K
    B,
    /// 7,500-10,000K, strongest hydrogen lines
    A,
    /// 6,000-7,500K
    F,
    /// 5,200-6,000K, Sun-like
    G,
    /// 3,700-5,200K
    K,
    /// Below 3,700K
    M,
}

impl fmt::Display for SpectralClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            SpectralClass::O => 'O',
            SpectralClass::B => 'B',
            SpectralClass::A => 'A',
            SpectralClass::F => 'F',
            SpectralClass::G => 'G',
            SpectralClass::K => 'K',
            SpectralClass::M => 'M',
        };
        write!(f, "{letter}")
    }
}

/// Spectral class for an effective temperature in Kelvin
pub fn temperature_to_spectral_class(temperature: f64) -> SpectralClass {
    if temperature >= 30000.0 {
        SpectralClass::O
    } else if temperature >= 10000.0 {
        SpectralClass::B
    } else if temperature >= 7500.0 {
        SpectralClass::A
    } else if temperature >= 6000.0 {
        SpectralClass::F
    } else if temperature >= 5200.0 {
        SpectralClass::G
    } else if temperature >= 3700.0 {
        SpectralClass::K
    } else {
        SpectralClass::M
    }
}

// (temperature K, central depth) tables, linearly interpolated
const BALMER_DEPTH: ([f64; 7], [f64; 7]) = (
    [2500.0, 4000.0, 6000.0, 9500.0, 15000.0, 30000.0, 50000.0],
    [0.05, 0.10, 0.30, 0.65, 0.45, 0.15, 0.08],
);
const CAII_DEPTH: ([f64; 6], [f64; 6]) = (
    [2500.0, 4000.0, 5500.0, 7500.0, 10000.0, 50000.0],
    [0.60, 0.75, 0.65, 0.35, 0.10, 0.02],
);
const METAL_DEPTH: ([f64; 5], [f64; 5]) = (
    [2500.0, 4500.0, 6000.0, 8000.0, 50000.0],
    [0.55, 0.45, 0.15, 0.02, 0.0],
);

fn depth_at(table: (&[f64], &[f64]), temperature: f64) -> f64 {
    let (ts, ds) = table;
    let t = temperature.clamp(ts[0], ts[ts.len() - 1]);
    // Tables are static, sorted and in range after clamping
    interp(t, ts, ds).unwrap_or(0.0)
}

/// Planck continuum with multiplicative absorption lines
#[derive(Debug, Clone)]
pub struct StellarSpectrum {
    /// Effective temperature in Kelvin
    temperature: f64,
    absorption: Vec<AbsorptionLine>,
}

impl StellarSpectrum {
    /// Build a star of the given temperature; `line_scale` multiplies all
    /// line depths (0 gives a pure blackbody).
    pub fn new(temperature: f64, line_scale: f64) -> Result<Self, TemplateError> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(TemplateError::InvalidParameter(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        Ok(Self::with_lines(temperature, line_scale))
    }

    fn with_lines(temperature: f64, line_scale: f64) -> Self {
        let balmer = depth_at((&BALMER_DEPTH.0, &BALMER_DEPTH.1), temperature);
        let caii = depth_at((&CAII_DEPTH.0, &CAII_DEPTH.1), temperature);
        let metal = depth_at((&METAL_DEPTH.0, &METAL_DEPTH.1), temperature);
        let clamp = |d: f64| (d * line_scale).clamp(0.0, 0.95);

        let mut absorption: Vec<AbsorptionLine> = BALMER
            .iter()
            .map(|&line| AbsorptionLine {
                line,
                depth: clamp(balmer),
                // Pressure-broadened wings grow with line strength
                sigma: 2.0 + 10.0 * balmer,
            })
            .collect();
        absorption.extend([CAII_K, CAII_H].map(|line| AbsorptionLine {
            line,
            depth: clamp(caii),
            sigma: 4.0,
        }));
        absorption.extend([MG_B, NA_D].map(|line| AbsorptionLine {
            line,
            depth: clamp(metal),
            sigma: 3.0,
        }));

        Self {
            temperature,
            absorption,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn spectral_class(&self) -> SpectralClass {
        temperature_to_spectral_class(self.temperature)
    }
}

impl SpectralModel for StellarSpectrum {
    fn flux_density(&self, wavelength: f64) -> f64 {
        if wavelength <= 0.0 {
            return 0.0;
        }
        let continuum = planck(wavelength, self.temperature);
        self.absorption
            .iter()
            .fold(continuum, |f, line| f * line.transmission(wavelength))
    }
}

/// Stars with log-uniform effective temperatures
#[derive(Debug, Clone)]
pub struct StarTemplates {
    t_min: f64,
    t_max: f64,
    /// Line depths are scaled by a factor drawn from `[1 - s, 1 + s]`
    line_scatter: f64,
}

impl StarTemplates {
    pub fn new(t_min: f64, t_max: f64, line_scatter: f64) -> Result<Self, TemplateError> {
        if !(t_min > 0.0 && t_max > t_min && t_max.is_finite()) {
            return Err(TemplateError::InvalidParameter(format!(
                "temperature range must satisfy 0 < t_min < t_max, got {t_min}..{t_max}"
            )));
        }
        if !(0.0..1.0).contains(&line_scatter) {
            return Err(TemplateError::InvalidParameter(format!(
                "line scatter must be in [0, 1), got {line_scatter}"
            )));
        }
        Ok(Self {
            t_min,
            t_max,
            line_scatter,
        })
    }
}

impl Default for StarTemplates {
    fn default() -> Self {
        Self {
            t_min: 3000.0,
            t_max: 30000.0,
            line_scatter: 0.2,
        }
    }
}

impl TemplateGenerator for StarTemplates {
    type Model = StellarSpectrum;

    fn rrtype(&self) -> &'static str {
        "STAR"
    }

    fn draw(&self, rng: &mut StdRng) -> TemplateDraw<StellarSpectrum> {
        let log_t = rng.gen_range(self.t_min.ln()..=self.t_max.ln());
        let temperature = log_t.exp();
        let line_scale = 1.0 + self.line_scatter * rng.gen_range(-1.0..=1.0);

        let model = StellarSpectrum::with_lines(temperature, line_scale);

        let mut params = BTreeMap::new();
        params.insert("TEFF".to_string(), temperature);
        params.insert("LINESCALE".to_string(), line_scale);

        TemplateDraw {
            subtype: model.spectral_class().to_string(),
            model,
            params,
        }
    }
}
