//! Test helpers for the archetypes workspace
//!
//! Provides project-root discovery, a shared directory for test artifacts
//! (FITS files, JSON summaries) and deterministic spectrum families for
//! exercising the chi2 and selection code without a simulator.

use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

/// Returns the path to the project root directory.
///
/// Walks up from the current directory until a Cargo.toml declaring a
/// `[workspace]` is found.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("Failed to get current directory: {e}"))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestHelperError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {e}"))
            })?;

            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// Directory for test artifacts, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");

    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }

    output_dir
}

/// Path of a file inside the test output directory.
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Evenly spaced wavelengths in Angstrom, inclusive of both ends.
pub fn linear_wavelengths(wmin: f64, wmax: f64, npix: usize) -> Vec<f64> {
    if npix < 2 {
        return vec![wmin; npix];
    }
    let step = (wmax - wmin) / (npix - 1) as f64;
    (0..npix).map(|i| wmin + i as f64 * step).collect()
}

/// Deterministic families of positive spectra.
///
/// Returns `groups * per_group` rows of `npix` pixels. Every row in a group
/// shares one continuum shape and differs from its siblings only by a small
/// ripple and an overall amplitude, so members of a group are close in
/// chi2 while different groups are far apart.
pub fn clustered_spectra(groups: usize, per_group: usize, npix: usize) -> Vec<Vec<f64>> {
    let mut rows = Vec::with_capacity(groups * per_group);
    for g in 0..groups {
        let slope = -0.8 + 1.6 * g as f64 / groups.max(1) as f64;
        let bump_center = (g as f64 + 0.5) / groups.max(1) as f64;
        for m in 0..per_group {
            let amplitude = 1.0 + 0.25 * m as f64;
            let ripple = 0.002 * (m as f64 + 1.0);
            let row = (0..npix)
                .map(|i| {
                    let x = i as f64 / npix.max(2).saturating_sub(1) as f64;
                    let bump = 3.0 * (-((x - bump_center) / 0.08).powi(2)).exp();
                    let ripple = ripple * (40.0 * x + m as f64).sin();
                    amplitude * (2.0 + slope * x + bump + ripple)
                })
                .collect();
            rows.push(row);
        }
    }
    rows
}
