//! Galaxy templates for the three target classes.
//!
//! The continuum mixes an old (cool) and a young (hot) Planck component and
//! is suppressed blueward of 4000 Å by a break of strength `D4000`.
//! Nebular emission lines are added with equivalent widths and ratios
//! drawn per class:
//!
//! | class | old fraction | D4000   | Hα EW (Å) | σ (km/s) |
//! |-------|--------------|---------|-----------|----------|
//! | LRG   | 0.85–1.0     | 1.6–2.2 | 0–3       | 150–300  |
//! | BGS   | 0.4–0.85     | 1.2–1.7 | 2–40      | 80–200   |
//! | ELG   | 0.05–0.4     | 1.0–1.3 | 30–200    | 30–120   |

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::Rng;

use super::lines::{
    planck, EmissionLine, SpectralLine, H_ALPHA, H_BETA, NII_6550, NII_6585, OIII_4960,
    OIII_5008, OII_3727, OII_3730, SII_6718, SII_6733,
};
use super::{SpectralModel, TemplateDraw, TemplateError, TemplateGenerator};

const BREAK_WAVELENGTH: f64 = 4000.0;
const BREAK_WIDTH: f64 = 50.0;
const NORM_WAVELENGTH: f64 = 5500.0;
const YOUNG_TEMPERATURE: f64 = 15000.0;

/// Galaxy target classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GalaxyClass {
    /// Bright galaxy survey: mixed populations
    Bgs,
    /// Emission-line galaxy: star forming
    Elg,
    /// Luminous red galaxy: passive
    Lrg,
}

impl GalaxyClass {
    pub const ALL: [GalaxyClass; 3] = [GalaxyClass::Bgs, GalaxyClass::Elg, GalaxyClass::Lrg];
}

impl fmt::Display for GalaxyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GalaxyClass::Bgs => "BGS",
            GalaxyClass::Elg => "ELG",
            GalaxyClass::Lrg => "LRG",
        };
        write!(f, "{name}")
    }
}

/// Parameter ranges for one class
struct ClassRanges {
    old_fraction: RangeInclusive<f64>,
    old_temperature: RangeInclusive<f64>,
    d4000: RangeInclusive<f64>,
    halpha_ew: RangeInclusive<f64>,
    oii_ew: RangeInclusive<f64>,
    oiii_hbeta: RangeInclusive<f64>,
    nii_halpha: RangeInclusive<f64>,
    sigma_kms: RangeInclusive<f64>,
}

impl GalaxyClass {
    fn ranges(&self) -> ClassRanges {
        match self {
            GalaxyClass::Lrg => ClassRanges {
                old_fraction: 0.85..=1.0,
                old_temperature: 3800.0..=4600.0,
                d4000: 1.6..=2.2,
                halpha_ew: 0.0..=3.0,
                oii_ew: 0.0..=3.0,
                oiii_hbeta: 0.3..=1.5,
                nii_halpha: 0.5..=1.5,
                sigma_kms: 150.0..=300.0,
            },
            GalaxyClass::Bgs => ClassRanges {
                old_fraction: 0.4..=0.85,
                old_temperature: 4000.0..=5000.0,
                d4000: 1.2..=1.7,
                halpha_ew: 2.0..=40.0,
                oii_ew: 1.0..=20.0,
                oiii_hbeta: 0.3..=3.0,
                nii_halpha: 0.2..=0.8,
                sigma_kms: 80.0..=200.0,
            },
            GalaxyClass::Elg => ClassRanges {
                old_fraction: 0.05..=0.4,
                old_temperature: 4200.0..=5200.0,
                d4000: 1.0..=1.3,
                halpha_ew: 30.0..=200.0,
                oii_ew: 15.0..=100.0,
                oiii_hbeta: 0.5..=6.0,
                nii_halpha: 0.05..=0.4,
                sigma_kms: 30.0..=120.0,
            },
        }
    }
}

/// Two-population continuum with a 4000 Å break and emission lines
#[derive(Debug, Clone)]
pub struct GalaxySpectrum {
    old_fraction: f64,
    old_temperature: f64,
    d4000: f64,
    old_norm: f64,
    young_norm: f64,
    lines: Vec<EmissionLine>,
}

impl GalaxySpectrum {
    fn continuum_shape(
        old_fraction: f64,
        old_temperature: f64,
        d4000: f64,
    ) -> Self {
        Self {
            old_fraction,
            old_temperature,
            d4000,
            old_norm: 1.0 / planck(NORM_WAVELENGTH, old_temperature),
            young_norm: 1.0 / planck(NORM_WAVELENGTH, YOUNG_TEMPERATURE),
            lines: Vec::new(),
        }
    }

    /// Continuum level without emission lines
    pub fn continuum(&self, wavelength: f64) -> f64 {
        let old = planck(wavelength, self.old_temperature) * self.old_norm;
        let young = planck(wavelength, YOUNG_TEMPERATURE) * self.young_norm;
        let mix = self.old_fraction * old + (1.0 - self.old_fraction) * young;
        let blueward = 0.5 * (1.0 - ((wavelength - BREAK_WAVELENGTH) / BREAK_WIDTH).tanh());
        mix / (1.0 + (self.d4000 - 1.0) * blueward)
    }

    fn add_line(&mut self, line: SpectralLine, equivalent_width: f64, sigma_kms: f64) {
        let flux = equivalent_width * self.continuum(line.wavelength);
        self.lines.push(EmissionLine {
            line,
            flux,
            sigma: line.sigma_for_velocity(sigma_kms),
        });
    }

    pub fn emission_lines(&self) -> &[EmissionLine] {
        &self.lines
    }
}

impl SpectralModel for GalaxySpectrum {
    fn flux_density(&self, wavelength: f64) -> f64 {
        if wavelength <= 0.0 {
            return 0.0;
        }
        self.continuum(wavelength) + self.lines.iter().map(|l| l.at(wavelength)).sum::<f64>()
    }
}

/// Galaxy generator drawing BGS, ELG and LRG templates in given proportions
#[derive(Debug, Clone)]
pub struct GalaxyTemplates {
    /// Relative weights in [`GalaxyClass::ALL`] order
    fractions: [f64; 3],
}

impl GalaxyTemplates {
    /// `fractions` gives the relative number of BGS, ELG and LRG templates.
    pub fn new(fractions: [f64; 3]) -> Result<Self, TemplateError> {
        let valid = fractions.iter().all(|f| f.is_finite() && *f >= 0.0);
        if !valid || fractions.iter().sum::<f64>() <= 0.0 {
            return Err(TemplateError::InvalidParameter(format!(
                "galaxy class fractions must be non-negative with a positive sum, got {fractions:?}"
            )));
        }
        Ok(Self { fractions })
    }

    fn pick_class(&self, rng: &mut StdRng) -> GalaxyClass {
        let total: f64 = self.fractions.iter().sum();
        let mut u = rng.gen_range(0.0..total);
        for (class, weight) in GalaxyClass::ALL.iter().zip(self.fractions) {
            if u < weight {
                return *class;
            }
            u -= weight;
        }
        // Rounding can leave u just above the last weight
        GalaxyClass::ALL
            .iter()
            .zip(self.fractions)
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(c, _)| *c)
            .unwrap_or(GalaxyClass::Bgs)
    }

    /// Draw one template of a fixed class
    pub fn draw_class(&self, class: GalaxyClass, rng: &mut StdRng) -> TemplateDraw<GalaxySpectrum> {
        let r = class.ranges();
        let old_fraction = rng.gen_range(r.old_fraction);
        let old_temperature = rng.gen_range(r.old_temperature);
        let d4000 = rng.gen_range(r.d4000);
        let halpha_ew = rng.gen_range(r.halpha_ew);
        let oii_ew = rng.gen_range(r.oii_ew);
        let oiii_hbeta = rng.gen_range(r.oiii_hbeta);
        let nii_halpha = rng.gen_range(r.nii_halpha);
        let sigma_kms = rng.gen_range(r.sigma_kms);
        // Balmer decrement: 2.86 for case B, larger with dust
        let balmer_decrement = rng.gen_range(2.86..=5.0);

        let mut model = GalaxySpectrum::continuum_shape(old_fraction, old_temperature, d4000);

        let halpha_flux = halpha_ew * model.continuum(H_ALPHA.wavelength);
        let hbeta_flux = halpha_flux / balmer_decrement;
        let hbeta_ew = hbeta_flux / model.continuum(H_BETA.wavelength);
        let oiii_ew = oiii_hbeta * hbeta_flux / model.continuum(OIII_5008.wavelength);
        let nii_ew = nii_halpha * halpha_flux / model.continuum(NII_6585.wavelength);
        let sii_ew = 0.3 * halpha_flux / model.continuum(SII_6718.wavelength);

        model.add_line(H_ALPHA, halpha_ew, sigma_kms);
        model.add_line(H_BETA, hbeta_ew, sigma_kms);
        model.add_line(OIII_5008, oiii_ew, sigma_kms);
        model.add_line(OIII_4960, oiii_ew / 2.98, sigma_kms);
        model.add_line(NII_6585, nii_ew, sigma_kms);
        model.add_line(NII_6550, nii_ew / 2.95, sigma_kms);
        model.add_line(SII_6718, 0.5 * sii_ew, sigma_kms);
        model.add_line(SII_6733, 0.5 * sii_ew, sigma_kms);
        // [OII] doublet split 1 : 1.3
        model.add_line(OII_3727, oii_ew / 2.3, sigma_kms);
        model.add_line(OII_3730, oii_ew * 1.3 / 2.3, sigma_kms);

        let params = BTreeMap::from([
            ("OLDFRAC".to_string(), old_fraction),
            ("TOLD".to_string(), old_temperature),
            ("D4000".to_string(), d4000),
            ("HAEW".to_string(), halpha_ew),
            ("OIIEW".to_string(), oii_ew),
            ("OIIIHB".to_string(), oiii_hbeta),
            ("NIIHA".to_string(), nii_halpha),
            ("VDISP".to_string(), sigma_kms),
        ]);

        TemplateDraw {
            model,
            subtype: class.to_string(),
            params,
        }
    }
}

impl Default for GalaxyTemplates {
    fn default() -> Self {
        Self {
            fractions: [1.0, 1.0, 1.0],
        }
    }
}

impl TemplateGenerator for GalaxyTemplates {
    type Model = GalaxySpectrum;

    fn rrtype(&self) -> &'static str {
        "GALAXY"
    }

    fn draw(&self, rng: &mut StdRng) -> TemplateDraw<GalaxySpectrum> {
        let class = self.pick_class(rng);
        self.draw_class(class, rng)
    }
}
