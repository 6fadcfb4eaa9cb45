//! Build archetypes from observed survey spectra.
//!
//! Every spectrum is fitted at its catalogued redshift with a PCA basis;
//! the noise-free rest-frame models of the accepted fits are reduced to
//! archetypes and written as FITS.

use std::path::PathBuf;
use std::time::Instant;

use archetypes::io::{read_pca_basis, read_survey_spectra, write_archetypes};
use archetypes::observed::{fit_survey, pipeline_input, FitParams};
use archetypes::pipeline::ArchetypePipeline;
use archetypes::shared_args::{GridArgs, ObjectType, OutputArgs, SelectionArgs};
use clap::Parser;
use log::{info, warn};

/// Command line arguments for observed archetypes
#[derive(Parser, Debug)]
#[command(
    name = "archetypes_observed",
    about = "Generate archetypes from observed spectra fitted with a PCA basis",
    long_about = None
)]
struct Args {
    /// FITS file with WAVELENGTH, FLUX, IVAR and REDSHIFTS HDUs
    #[arg(long)]
    spectra: PathBuf,

    /// FITS file with the BASIS_VECTORS HDU
    #[arg(long)]
    basis: PathBuf,

    /// Object type, used for the default rest-frame grid
    #[arg(long, value_enum)]
    objtype: ObjectType,

    /// Minimum redshift to accept
    #[arg(long, default_value_t = 0.0)]
    zmin: f64,

    /// Maximum redshift to accept
    #[arg(long, default_value_t = 10.0)]
    zmax: f64,

    /// Minimum number of good pixels in a fit
    #[arg(long, default_value_t = 100)]
    min_good_pixels: usize,

    /// Reject fits with a larger reduced chi2
    #[arg(long, default_value_t = 5.0)]
    max_rchi2: f64,

    /// Use at most this many accepted spectra
    #[arg(long)]
    max_spectra: Option<usize>,

    #[command(flatten)]
    grid: GridArgs,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    output: OutputArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let grid = args.grid.to_grid(args.objtype)?;
    let spectra = read_survey_spectra(&args.spectra)?;
    let basis = read_pca_basis(&args.basis)?;
    info!(
        "Read {} spectra from {} and {} {} basis vectors from {}",
        spectra.nspec(),
        args.spectra.display(),
        basis.ncomp(),
        basis.rrtype,
        args.basis.display()
    );
    if basis.rrtype != args.objtype.rrtype() {
        warn!(
            "Basis RRTYPE {} differs from requested object type {}",
            basis.rrtype,
            args.objtype.rrtype()
        );
    }

    let fit_params = FitParams {
        z_min: args.zmin,
        z_max: args.zmax,
        min_good_pixels: args.min_good_pixels,
        max_reduced_chi2: args.max_rchi2,
    };
    let fitted = fit_survey(&spectra, &basis, &grid, &fit_params)?;
    info!("Fitted survey in {:.1?}", start.elapsed());

    let params = args
        .output
        .pipeline_params(&args.selection, "archetypes_observed");
    let input = pipeline_input(fitted, &basis, grid, args.max_spectra);
    let (archetypes, summary) = ArchetypePipeline::new(params).run(input)?;

    write_archetypes(&args.output.output, &archetypes)?;
    info!(
        "Wrote {} archetypes to {}",
        archetypes.len(),
        args.output.output.display()
    );

    if let Some(path) = &args.output.summary {
        summary.save_to_file(path)?;
        info!("Wrote run summary to {}", path.display());
    }

    info!("Done in {:.1?}", start.elapsed());
    Ok(())
}
