//! Shared orchestration for both archetype binaries.
//!
//! Input spectra arrive on a common rest-frame grid. The pipeline drops
//! unusable rows, normalizes by the median, computes the pairwise chi2
//! matrix, selects archetypes and packages them with their labels and the
//! run configuration.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::stats::normalize_by_median;
use crate::chi2::{compute_chi2, Chi2Error, Chi2Options};
use crate::grid::WavelengthGrid;
use crate::selection::{ArchetypeSelector, SelectionError, SelectionParams};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No input spectra")]
    NoSpectra,
    #[error("All {0} input spectra were dropped before selection")]
    AllDropped(usize),
    #[error("Grid has {grid} pixels but flux has {flux} columns")]
    GridMismatch { grid: usize, flux: usize },
    #[error("{spectra} spectra but {labels} subtype labels")]
    LabelMismatch { spectra: usize, labels: usize },
    #[error("{spectra} spectra but {params} parameter sets")]
    ParamsMismatch { spectra: usize, params: usize },
    #[error("Invalid source rows: {0}")]
    InvalidSource(String),
    #[error("Normalization window [{0}, {1}] Å contains no grid pixels")]
    EmptyWindow(f64, f64),
    #[error("Chi2 computation failed: {0}")]
    Chi2(#[from] Chi2Error),
    #[error("Archetype selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Spectra to reduce, all on `grid`
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub grid: WavelengthGrid,
    /// `nspec × grid.npix()`
    pub flux: Array2<f64>,
    /// One label per spectrum
    pub subtype: Vec<String>,
    /// Spectral type written as RRTYPE
    pub rrtype: String,
    /// Master seed of simulated inputs
    pub seed: Option<u64>,
    /// Per-spectrum parameters carried into the archetype table; empty or one
    /// map per spectrum
    pub params: Vec<BTreeMap<String, f64>>,
    /// Where the spectra came from; `None` when they are the source itself
    pub source: Option<SourceRows>,
}

/// Rows of the originating file that the pipeline input was taken from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRows {
    /// Source row of each input spectrum
    pub index: Vec<usize>,
    /// Number of rows in the source
    pub total: usize,
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub selection: SelectionParams,
    /// Archetypes are rescaled to unit median inside this window (Å);
    /// `None` uses the whole grid
    pub norm_window: Option<(f64, f64)>,
    /// Free-form archetype file version
    pub version: String,
    /// Provenance string written as ORIGIN
    pub origin: String,
    pub show_progress: bool,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            selection: SelectionParams::default(),
            norm_window: None,
            version: "1.0".to_string(),
            origin: "archetypes".to_string(),
            show_progress: false,
        }
    }
}

/// Header description of an archetype file
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeHeader {
    pub rrtype: String,
    /// Version of the software that produced the file
    pub rrver: String,
    pub version: String,
    pub origin: String,
    /// Spectra in the originating file
    pub n_source: usize,
    /// Spectra handed to the pipeline
    pub n_input: usize,
    /// Spectra left after dropping unusable rows
    pub n_used: usize,
    pub chi2_threshold: f64,
    pub seed: Option<u64>,
    pub norm_window: Option<(f64, f64)>,
    pub created: DateTime<Utc>,
}

/// Selected archetypes ordered by responsibility
#[derive(Debug, Clone)]
pub struct ArchetypeSet {
    pub grid: WavelengthGrid,
    /// `narch × grid.npix()`
    pub flux: Array2<f64>,
    pub subtype: Vec<String>,
    pub responsibility: Vec<usize>,
    /// Source row of each archetype
    pub input_index: Vec<usize>,
    /// Parameters of each archetype, empty maps when none were given
    pub params: Vec<BTreeMap<String, f64>>,
    pub header: ArchetypeHeader,
}

impl ArchetypeSet {
    pub fn len(&self) -> usize {
        self.flux.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.nrows() == 0
    }
}

/// Wavelength grid description for the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub min: f64,
    pub max: f64,
    pub npix: usize,
    pub log_lam: bool,
}

/// Machine-readable record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rrtype: String,
    pub version: String,
    pub created: String,
    pub seed: Option<u64>,
    pub grid: GridSummary,
    pub chi2_threshold: f64,
    pub n_source: usize,
    pub n_input: usize,
    pub n_dropped_nonfinite: usize,
    pub n_dropped_median: usize,
    pub n_used: usize,
    pub n_archetypes: usize,
    /// Inputs not within the threshold of any archetype
    pub n_uncovered: usize,
    pub responsibility: Vec<usize>,
    pub subtype: Vec<String>,
    pub input_index: Vec<usize>,
    pub params: Vec<BTreeMap<String, f64>>,
}

impl RunSummary {
    pub fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Chi2 clustering and archetype selection over a batch of spectra
pub struct ArchetypePipeline {
    params: PipelineParams,
}

impl ArchetypePipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn run(&self, input: PipelineInput) -> Result<(ArchetypeSet, RunSummary), PipelineError> {
        let PipelineInput {
            grid,
            flux,
            subtype,
            rrtype,
            seed,
            params,
            source,
        } = input;
        let (n_input, npix) = flux.dim();

        if n_input == 0 {
            return Err(PipelineError::NoSpectra);
        }
        if npix != grid.npix() {
            return Err(PipelineError::GridMismatch {
                grid: grid.npix(),
                flux: npix,
            });
        }
        if subtype.len() != n_input {
            return Err(PipelineError::LabelMismatch {
                spectra: n_input,
                labels: subtype.len(),
            });
        }
        if !params.is_empty() && params.len() != n_input {
            return Err(PipelineError::ParamsMismatch {
                spectra: n_input,
                params: params.len(),
            });
        }
        if let Some(source) = &source {
            if source.index.len() != n_input {
                return Err(PipelineError::InvalidSource(format!(
                    "{} source rows for {n_input} spectra",
                    source.index.len()
                )));
            }
            if let Some(&row) = source.index.iter().find(|&&row| row >= source.total) {
                return Err(PipelineError::InvalidSource(format!(
                    "row {row} outside a source of {} rows",
                    source.total
                )));
            }
        }
        let norm_mask = match self.params.norm_window {
            Some((lo, hi)) => {
                let mask = grid.window_mask(lo, hi);
                if !mask.iter().any(|&m| m) {
                    return Err(PipelineError::EmptyWindow(lo, hi));
                }
                Some(mask)
            }
            None => None,
        };

        info!("Running archetype selection on {n_input} {rrtype} spectra");

        // Rows with NaN or infinite flux cannot enter the chi2 sums
        let finite: Vec<usize> = (0..n_input)
            .filter(|&i| flux.row(i).iter().all(|v| v.is_finite()))
            .collect();
        let n_dropped_nonfinite = n_input - finite.len();
        if n_dropped_nonfinite > 0 {
            warn!("Dropping {n_dropped_nonfinite} spectra with non-finite flux");
        }

        let mut normalized = flux.select(Axis(0), &finite);
        let rejected = normalize_by_median(&mut normalized, None);
        let n_dropped_median = rejected.len();
        if n_dropped_median > 0 {
            warn!("Dropping {n_dropped_median} spectra with non-positive median flux");
        }
        let kept_rows: Vec<usize> = (0..finite.len())
            .filter(|r| !rejected.contains(r))
            .collect();
        let used: Vec<usize> = kept_rows.iter().map(|&r| finite[r]).collect();
        let normalized = normalized.select(Axis(0), &kept_rows);

        if used.is_empty() {
            return Err(PipelineError::AllDropped(n_input));
        }

        let chi2 = compute_chi2(
            &normalized,
            None,
            Chi2Options {
                show_progress: self.params.show_progress,
            },
        )?;
        let selection = ArchetypeSelector::new(&chi2.chi2)?.select(&self.params.selection)?;

        let mut arch_flux = normalized.select(Axis(0), &selection.archetypes);
        let unnormalized = normalize_by_median(&mut arch_flux, norm_mask.as_deref());
        for row in &unnormalized {
            warn!(
                "Archetype {} has no positive median in the normalization window; left unscaled",
                selection.archetypes[*row]
            );
        }

        let rows: Vec<usize> = selection.archetypes.iter().map(|&a| used[a]).collect();
        let labels: Vec<String> = rows.iter().map(|&i| subtype[i].clone()).collect();
        let arch_params: Vec<BTreeMap<String, f64>> = rows
            .iter()
            .map(|&i| params.get(i).cloned().unwrap_or_default())
            .collect();
        let (input_index, n_source) = match &source {
            Some(source) => (
                rows.iter().map(|&i| source.index[i]).collect(),
                source.total,
            ),
            None => (rows, n_input),
        };

        let header = ArchetypeHeader {
            rrtype: rrtype.clone(),
            rrver: env!("CARGO_PKG_VERSION").to_string(),
            version: self.params.version.clone(),
            origin: self.params.origin.clone(),
            n_source,
            n_input,
            n_used: used.len(),
            chi2_threshold: self.params.selection.chi2_threshold,
            seed,
            norm_window: self.params.norm_window,
            created: Utc::now(),
        };

        let summary = RunSummary {
            rrtype,
            version: header.version.clone(),
            created: header.created.to_rfc3339(),
            seed,
            grid: GridSummary {
                min: grid.min(),
                max: grid.max(),
                npix: grid.npix(),
                log_lam: grid.is_log(),
            },
            chi2_threshold: header.chi2_threshold,
            n_source,
            n_input,
            n_dropped_nonfinite,
            n_dropped_median,
            n_used: used.len(),
            n_archetypes: selection.len(),
            n_uncovered: selection.uncovered.len(),
            responsibility: selection.responsibility.clone(),
            subtype: labels.clone(),
            input_index: input_index.clone(),
            params: arch_params.clone(),
        };

        info!(
            "Kept {} archetypes from {} spectra, top responsibility {:?}",
            selection.len(),
            used.len(),
            selection.responsibility.iter().take(5).collect::<Vec<_>>()
        );

        Ok((
            ArchetypeSet {
                grid,
                flux: arch_flux,
                subtype: labels,
                responsibility: selection.responsibility,
                input_index,
                params: arch_params,
                header,
            },
            summary,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::stats::masked_median;
    use approx::assert_relative_eq;
    use test_helpers::clustered_spectra;

    fn input(groups: usize, per_group: usize) -> PipelineInput {
        let grid = WavelengthGrid::linear(4000.0, 5990.0, 10.0).unwrap();
        let rows = clustered_spectra(groups, per_group, grid.npix());
        let mut flux = Array2::zeros((rows.len(), grid.npix()));
        for (i, row) in rows.iter().enumerate() {
            flux.row_mut(i).assign(&ndarray::ArrayView1::from(row));
        }
        let subtype = (0..rows.len())
            .map(|i| format!("G{}", i / per_group))
            .collect();
        PipelineInput {
            grid,
            flux,
            subtype,
            rrtype: "GALAXY".to_string(),
            seed: Some(3),
            params: Vec::new(),
            source: None,
        }
    }

    fn params(threshold: f64) -> PipelineParams {
        PipelineParams {
            selection: SelectionParams {
                chi2_threshold: threshold,
                ..SelectionParams::default()
            },
            ..PipelineParams::default()
        }
    }

    #[test]
    fn test_one_archetype_per_cluster() {
        let (set, summary) = ArchetypePipeline::new(params(0.05))
            .run(input(3, 4))
            .unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.responsibility.iter().sum::<usize>(), 12);
        assert!(set.responsibility.windows(2).all(|w| w[0] >= w[1]));
        let mut labels = set.subtype.clone();
        labels.sort();
        assert_eq!(labels, vec!["G0", "G1", "G2"]);
        for (label, &i) in set.subtype.iter().zip(&set.input_index) {
            assert_eq!(label, &format!("G{}", i / 4));
        }

        assert_eq!(summary.n_archetypes, 3);
        assert_eq!(summary.n_used, 12);
        assert_eq!(summary.seed, Some(3));
        assert_eq!(set.header.n_input, 12);
        assert_eq!(set.header.n_source, 12);
        assert!(set.params.iter().all(|p| p.is_empty()));
    }

    #[test]
    fn test_source_rows_and_params_follow_archetypes() {
        let mut data = input(2, 3);
        // Inputs are every other row of a 20-row file
        data.source = Some(SourceRows {
            index: (0..6).map(|i| 2 * i + 1).collect(),
            total: 20,
        });
        data.params = (0..6)
            .map(|i| BTreeMap::from([("Z".to_string(), 0.1 * i as f64)]))
            .collect();
        data.flux.row_mut(0).fill(f64::NAN);

        let (set, summary) = ArchetypePipeline::new(params(0.05)).run(data).unwrap();

        assert_eq!(set.header.n_source, 20);
        assert_eq!(set.header.n_input, 6);
        assert_eq!(summary.n_source, 20);
        assert!(!set.input_index.contains(&1));
        for (k, &row) in set.input_index.iter().enumerate() {
            assert_eq!(row % 2, 1);
            let input_row = (row - 1) / 2;
            assert_relative_eq!(set.params[k]["Z"], 0.1 * input_row as f64);
            assert_eq!(set.subtype[k], format!("G{}", input_row / 3));
        }
        assert_eq!(summary.params, set.params);
    }

    #[test]
    fn test_archetypes_have_unit_median() {
        let (set, _) = ArchetypePipeline::new(params(0.05))
            .run(input(2, 3))
            .unwrap();
        for row in set.flux.rows() {
            assert_relative_eq!(masked_median(row, None).unwrap(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_normalization_window() {
        let mut p = params(0.05);
        p.norm_window = Some((4500.0, 4600.0));
        let (set, summary) = ArchetypePipeline::new(p).run(input(2, 3)).unwrap();
        let mask = set.grid.window_mask(4500.0, 4600.0);
        for row in set.flux.rows() {
            assert_relative_eq!(masked_median(row, Some(&mask)).unwrap(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(set.header.norm_window, Some((4500.0, 4600.0)));
        assert_eq!(summary.grid.npix, 200);
    }

    #[test]
    fn test_unusable_rows_are_dropped() {
        let mut data = input(2, 3);
        data.flux[[1, 10]] = f64::NAN;
        data.flux.row_mut(4).fill(-1.0);
        let (set, summary) = ArchetypePipeline::new(params(0.05)).run(data).unwrap();

        assert_eq!(summary.n_dropped_nonfinite, 1);
        assert_eq!(summary.n_dropped_median, 1);
        assert_eq!(summary.n_used, 4);
        assert_eq!(set.responsibility.iter().sum::<usize>(), 4);
        assert!(!set.input_index.contains(&1));
        assert!(!set.input_index.contains(&4));
    }

    #[test]
    fn test_invalid_inputs() {
        let pipeline = ArchetypePipeline::new(params(0.05));

        let mut empty = input(1, 1);
        empty.flux = Array2::zeros((0, empty.grid.npix()));
        empty.subtype.clear();
        assert!(matches!(pipeline.run(empty), Err(PipelineError::NoSpectra)));

        let mut wrong_grid = input(1, 2);
        wrong_grid.grid = WavelengthGrid::linear(4000.0, 5000.0, 10.0).unwrap();
        assert!(matches!(
            pipeline.run(wrong_grid),
            Err(PipelineError::GridMismatch { .. })
        ));

        let mut labels = input(1, 2);
        labels.subtype.pop();
        assert!(matches!(
            pipeline.run(labels),
            Err(PipelineError::LabelMismatch { .. })
        ));

        let mut all_bad = input(1, 2);
        all_bad.flux.fill(0.0);
        assert!(matches!(
            pipeline.run(all_bad),
            Err(PipelineError::AllDropped(2))
        ));

        let mut short_params = input(1, 2);
        short_params.params = vec![BTreeMap::new()];
        assert!(matches!(
            pipeline.run(short_params),
            Err(PipelineError::ParamsMismatch { .. })
        ));

        let mut bad_source = input(1, 2);
        bad_source.source = Some(SourceRows {
            index: vec![0, 5],
            total: 5,
        });
        assert!(matches!(
            pipeline.run(bad_source),
            Err(PipelineError::InvalidSource(_))
        ));

        let mut window = params(0.05);
        window.norm_window = Some((100.0, 200.0));
        assert!(matches!(
            ArchetypePipeline::new(window).run(input(1, 2)),
            Err(PipelineError::EmptyWindow(_, _))
        ));
    }

    #[test]
    fn test_summary_json_round_trip() {
        let (_, summary) = ArchetypePipeline::new(params(0.05))
            .run(input(2, 2))
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary.save_to_file(&path).unwrap();
        assert_eq!(RunSummary::load_from_file(&path).unwrap(), summary);
    }
}
