//! Spectral line catalog and Gaussian line profiles

/// Speed of light in km/s
pub const C_KMS: f64 = 299_792.458;

/// hc/k in Å·K, the Planck exponent scale
pub const HC_OVER_K: f64 = 1.438_776_877e8;

/// A named line at its vacuum rest wavelength (Å)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralLine {
    pub name: &'static str,
    pub wavelength: f64,
}

impl SpectralLine {
    pub const fn new(name: &'static str, wavelength: f64) -> Self {
        Self { name, wavelength }
    }

    /// Gaussian σ in Å for a velocity dispersion in km/s
    pub fn sigma_for_velocity(&self, sigma_kms: f64) -> f64 {
        self.wavelength * sigma_kms / C_KMS
    }
}

pub const LYA: SpectralLine = SpectralLine::new("Lya", 1215.67);
pub const NV: SpectralLine = SpectralLine::new("NV", 1240.14);
pub const SIIV: SpectralLine = SpectralLine::new("SiIV", 1397.61);
pub const CIV: SpectralLine = SpectralLine::new("CIV", 1549.06);
pub const CIII: SpectralLine = SpectralLine::new("CIII]", 1908.73);
pub const MGII: SpectralLine = SpectralLine::new("MgII", 2799.12);
pub const OII_3727: SpectralLine = SpectralLine::new("[OII]3727", 3727.09);
pub const OII_3730: SpectralLine = SpectralLine::new("[OII]3730", 3729.88);
pub const CAII_K: SpectralLine = SpectralLine::new("CaII_K", 3934.78);
pub const CAII_H: SpectralLine = SpectralLine::new("CaII_H", 3969.59);
pub const H_EPSILON: SpectralLine = SpectralLine::new("Heps", 3971.20);
pub const H_DELTA: SpectralLine = SpectralLine::new("Hdelta", 4102.89);
pub const H_GAMMA: SpectralLine = SpectralLine::new("Hgamma", 4341.68);
pub const H_BETA: SpectralLine = SpectralLine::new("Hbeta", 4862.68);
pub const OIII_4960: SpectralLine = SpectralLine::new("[OIII]4960", 4960.30);
pub const OIII_5008: SpectralLine = SpectralLine::new("[OIII]5008", 5008.24);
pub const MG_B: SpectralLine = SpectralLine::new("Mgb", 5176.70);
pub const NA_D: SpectralLine = SpectralLine::new("NaD", 5894.57);
pub const NII_6550: SpectralLine = SpectralLine::new("[NII]6550", 6549.86);
pub const H_ALPHA: SpectralLine = SpectralLine::new("Halpha", 6564.61);
pub const NII_6585: SpectralLine = SpectralLine::new("[NII]6585", 6585.27);
pub const SII_6718: SpectralLine = SpectralLine::new("[SII]6718", 6718.29);
pub const SII_6733: SpectralLine = SpectralLine::new("[SII]6733", 6732.67);

/// Balmer series used for stellar absorption
pub const BALMER: [SpectralLine; 5] = [H_ALPHA, H_BETA, H_GAMMA, H_DELTA, H_EPSILON];

/// Unit-area Gaussian evaluated at `wavelength`.
pub fn gaussian(wavelength: f64, center: f64, sigma: f64) -> f64 {
    let x = (wavelength - center) / sigma;
    (-0.5 * x * x).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// An emission line with integrated flux and Gaussian width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionLine {
    pub line: SpectralLine,
    /// Integrated flux in the same units as the continuum times Å
    pub flux: f64,
    /// Gaussian σ in Å
    pub sigma: f64,
}

impl EmissionLine {
    pub fn at(&self, wavelength: f64) -> f64 {
        // Beyond 8σ the contribution is below 1e-14 of the peak
        if (wavelength - self.line.wavelength).abs() > 8.0 * self.sigma {
            return 0.0;
        }
        self.flux * gaussian(wavelength, self.line.wavelength, self.sigma)
    }
}

/// A multiplicative absorption feature `1 - depth * exp(-x²/2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsorptionLine {
    pub line: SpectralLine,
    /// Fractional depth at line center, in [0, 1)
    pub depth: f64,
    /// Gaussian σ in Å
    pub sigma: f64,
}

impl AbsorptionLine {
    pub fn transmission(&self, wavelength: f64) -> f64 {
        let x = (wavelength - self.line.wavelength) / self.sigma;
        if x.abs() > 8.0 {
            return 1.0;
        }
        1.0 - self.depth * (-0.5 * x * x).exp()
    }
}

/// Planck `B_λ` up to a constant factor, for `wavelength` in Å.
pub fn planck(wavelength: f64, temperature: f64) -> f64 {
    let exponent = HC_OVER_K / (wavelength * temperature);
    1.0 / (wavelength.powi(5) * exponent.exp_m1())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::trapezoid::trap_integrate;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_has_unit_area() {
        let xs: Vec<f64> = (0..4001).map(|i| 4900.0 + 0.05 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| gaussian(x, 5000.0, 3.0)).collect();
        assert_relative_eq!(trap_integrate(&xs, &ys), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_emission_line_flux_integrates() {
        let line = EmissionLine {
            line: H_ALPHA,
            flux: 12.5,
            sigma: H_ALPHA.sigma_for_velocity(100.0),
        };
        let xs: Vec<f64> = (0..2001).map(|i| 6540.0 + 0.025 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| line.at(x)).collect();
        assert_relative_eq!(trap_integrate(&xs, &ys), 12.5, max_relative = 1e-4);
    }

    #[test]
    fn test_absorption_depth() {
        let line = AbsorptionLine {
            line: H_BETA,
            depth: 0.4,
            sigma: 5.0,
        };
        assert_relative_eq!(line.transmission(H_BETA.wavelength), 0.6);
        assert_eq!(line.transmission(H_BETA.wavelength + 100.0), 1.0);
    }

    #[test]
    fn test_planck_peak_follows_wien() {
        // Wien displacement: λ_max T ≈ 2.898e7 Å K
        let temperature = 5800.0;
        let xs: Vec<f64> = (1000..20000).map(|w| w as f64).collect();
        let peak = xs
            .iter()
            .copied()
            .max_by(|a, b| planck(*a, temperature).total_cmp(&planck(*b, temperature)))
            .unwrap();
        assert_relative_eq!(peak * temperature, 2.898e7, max_relative = 1e-3);
    }
}
