use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::grid::{GridError, WavelengthGrid};
use crate::pipeline::PipelineParams;
use crate::selection::SelectionParams;

/// Parse a wavelength window in format "min,max" (Å)
pub fn parse_window(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err("Window must be in format 'min,max'".to_string());
    }

    let lo = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid window minimum".to_string())?;
    let hi = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid window maximum".to_string())?;

    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(format!("Window minimum must be below maximum, got {lo},{hi}"));
    }
    Ok((lo, hi))
}

/// Spectral classes that archetypes are built for
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Star,
    Galaxy,
    Qso,
}

impl ObjectType {
    /// Spectral type written as RRTYPE
    pub fn rrtype(&self) -> &'static str {
        match self {
            ObjectType::Star => "STAR",
            ObjectType::Galaxy => "GALAXY",
            ObjectType::Qso => "QSO",
        }
    }

    /// Rest-frame wavelength range (Å) used when none is given
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            ObjectType::Star => (3500.0, 10000.0),
            ObjectType::Galaxy => (1200.0, 10000.0),
            ObjectType::Qso => (800.0, 11000.0),
        }
    }
}

/// Rest-frame grid options
#[derive(Args, Debug, Clone)]
pub struct GridArgs {
    /// Minimum rest wavelength in Å (defaults depend on the object type)
    #[arg(long)]
    pub wmin: Option<f64>,

    /// Maximum rest wavelength in Å (defaults depend on the object type)
    #[arg(long)]
    pub wmax: Option<f64>,

    /// Pixel size: Å for linear grids, dex with --log-lam
    #[arg(long, default_value_t = 1.0)]
    pub dw: f64,

    /// Sample uniformly in log10(wavelength)
    #[arg(long, default_value_t = false)]
    pub log_lam: bool,
}

impl GridArgs {
    pub fn to_grid(&self, objtype: ObjectType) -> Result<WavelengthGrid, GridError> {
        let (default_min, default_max) = objtype.default_range();
        let wmin = self.wmin.unwrap_or(default_min);
        let wmax = self.wmax.unwrap_or(default_max);
        if self.log_lam {
            WavelengthGrid::log10(wmin, wmax, self.dw)
        } else {
            WavelengthGrid::linear(wmin, wmax, self.dw)
        }
    }
}

/// Archetype selection options
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Reduced chi2 below which an archetype explains a spectrum
    #[arg(long, default_value_t = 0.1)]
    pub chi2_threshold: f64,

    /// Stop after this many archetypes
    #[arg(long)]
    pub max_archetypes: Option<usize>,

    /// Maximum redundancy-pruning passes
    #[arg(long, default_value_t = 100)]
    pub max_iterations: usize,
}

impl SelectionArgs {
    pub fn to_params(&self) -> SelectionParams {
        SelectionParams {
            chi2_threshold: self.chi2_threshold,
            max_archetypes: self.max_archetypes,
            max_iterations: self.max_iterations,
        }
    }
}

/// Output file options
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output archetype FITS file (overwritten if present)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write a JSON run summary here
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Version string recorded in the VERSION header key
    #[arg(long, default_value = "1.0")]
    pub version_tag: String,

    /// Normalize archetypes to unit median in this window (format: "min,max" in Å)
    #[arg(long, value_parser = parse_window)]
    pub norm_window: Option<(f64, f64)>,

    /// Show a progress bar while computing chi2
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

impl OutputArgs {
    /// Pipeline configuration for these options; `origin` names the producer.
    pub fn pipeline_params(&self, selection: &SelectionArgs, origin: &str) -> PipelineParams {
        PipelineParams {
            selection: selection.to_params(),
            norm_window: self.norm_window,
            version: self.version_tag.clone(),
            origin: origin.to_string(),
            show_progress: self.progress,
        }
    }
}
