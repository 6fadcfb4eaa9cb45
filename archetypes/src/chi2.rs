//! Pairwise chi-squared distances between spectra.
//!
//! Every spectrum is first rescaled to unit RMS so that the threshold used
//! by the selection step has the same meaning for bright and faint inputs.
//! Entry `chi2[[i, j]]` is the reduced chi2 of explaining spectrum `i` with
//! spectrum `j` scaled by its best-fit amplitude `amp[[i, j]]`:
//!
//! ```text
//! amp  = Σ f_i f_j w / Σ f_j² w
//! chi2 = Σ (f_i − amp f_j)² w / npix,   w = 1 / σ_i²
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Chi2Error {
    #[error("No spectra to compare")]
    Empty,
    #[error("Flux has shape {0:?} but errors have shape {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),
    #[error("Spectrum {0} has no power and cannot be rescaled")]
    ZeroPower(usize),
    #[error("Spectrum {0} has non-positive or non-finite errors")]
    InvalidErrors(usize),
}

/// Pairwise chi2 and amplitude matrices, both `nspec × nspec`
#[derive(Debug, Clone)]
pub struct Chi2Matrix {
    pub chi2: Array2<f64>,
    pub amp: Array2<f64>,
}

impl Chi2Matrix {
    pub fn nspec(&self) -> usize {
        self.chi2.nrows()
    }
}

/// Options for [`compute_chi2`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Chi2Options {
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

fn rescale_factors(flux: ArrayView2<f64>) -> Result<Vec<f64>, Chi2Error> {
    let npix = flux.ncols() as f64;
    flux.axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| {
            let power = row.dot(&row);
            if power > 0.0 && power.is_finite() {
                Ok((npix / power).sqrt())
            } else {
                Err(Chi2Error::ZeroPower(i))
            }
        })
        .collect()
}

/// chi2 and amplitude of explaining `target` with every row of `candidates`.
fn chi2_row(
    target: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    candidates: ArrayView2<f64>,
) -> (Vec<f64>, Vec<f64>) {
    let npix = target.len() as f64;
    let mut chi2 = Vec::with_capacity(candidates.nrows());
    let mut amp = Vec::with_capacity(candidates.nrows());

    for candidate in candidates.axis_iter(Axis(0)) {
        let mut cross = 0.0;
        let mut auto = 0.0;
        Zip::from(&target)
            .and(&candidate)
            .and(&weights)
            .for_each(|&t, &c, &w| {
                cross += t * c * w;
                auto += c * c * w;
            });

        let a = if auto > 0.0 { cross / auto } else { 0.0 };
        let mut resid = 0.0;
        Zip::from(&target)
            .and(&candidate)
            .and(&weights)
            .for_each(|&t, &c, &w| {
                let r = t - a * c;
                resid += r * r * w;
            });

        amp.push(a);
        chi2.push((resid / npix).max(0.0));
    }

    (chi2, amp)
}

/// Compute the pairwise chi2 matrix of `flux` (`nspec × npix`).
///
/// `ferr` holds per-pixel 1σ errors with the same shape; unit errors are
/// assumed when it is `None`. Rows are processed in parallel.
pub fn compute_chi2(
    flux: &Array2<f64>,
    ferr: Option<&Array2<f64>>,
    options: Chi2Options,
) -> Result<Chi2Matrix, Chi2Error> {
    let (nspec, npix) = flux.dim();
    if nspec == 0 || npix == 0 {
        return Err(Chi2Error::Empty);
    }
    if let Some(err) = ferr {
        if err.dim() != flux.dim() {
            return Err(Chi2Error::ShapeMismatch(flux.dim(), err.dim()));
        }
    }

    let rescale = rescale_factors(flux.view())?;
    let mut scaled = flux.clone();
    for (mut row, &r) in scaled.axis_iter_mut(Axis(0)).zip(&rescale) {
        row *= r;
    }

    let weights = match ferr {
        Some(err) => {
            let mut w = Array2::zeros(err.dim());
            for (i, (mut w_row, e_row)) in w
                .axis_iter_mut(Axis(0))
                .zip(err.axis_iter(Axis(0)))
                .enumerate()
            {
                let r = rescale[i];
                for (wv, &e) in w_row.iter_mut().zip(e_row.iter()) {
                    let sigma = e * r;
                    if !(sigma > 0.0 && sigma.is_finite()) {
                        return Err(Chi2Error::InvalidErrors(i));
                    }
                    *wv = 1.0 / (sigma * sigma);
                }
            }
            w
        }
        None => Array2::ones((nspec, npix)),
    };

    debug!("Computing {nspec}x{nspec} chi2 matrix over {npix} pixels");

    let progress = if options.show_progress {
        let pb = ProgressBar::new(nspec as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        pb.set_message("chi2");
        Some(pb)
    } else {
        None
    };

    let rows: Vec<(Vec<f64>, Vec<f64>)> = (0..nspec)
        .into_par_iter()
        .map(|i| {
            let row = chi2_row(scaled.row(i), weights.row(i), scaled.view());
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            row
        })
        .collect();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let mut chi2 = Array2::zeros((nspec, nspec));
    let mut amp = Array2::zeros((nspec, nspec));
    for (i, (chi2_row, amp_row)) in rows.into_iter().enumerate() {
        for j in 0..nspec {
            chi2[[i, j]] = chi2_row[j];
            amp[[i, j]] = amp_row[j];
        }
    }

    Ok(Chi2Matrix { chi2, amp })
}
