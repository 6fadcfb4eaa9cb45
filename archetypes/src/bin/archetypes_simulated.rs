//! Build archetypes from simulated spectra.
//!
//! Draws `--nspec` analytic templates of one object type, reduces them to
//! archetypes and writes the result as FITS.

use std::time::Instant;

use archetypes::grid::WavelengthGrid;
use archetypes::io::write_archetypes;
use archetypes::pipeline::{ArchetypePipeline, PipelineInput};
use archetypes::shared_args::{parse_window, GridArgs, ObjectType, OutputArgs, SelectionArgs};
use archetypes::templates::{
    GalaxyTemplates, QsoTemplates, StarTemplates, TemplateError, TemplateGenerator, TemplateSet,
};
use clap::Parser;
use log::info;

/// Parse relative BGS,ELG,LRG fractions in format "bgs,elg,lrg"
fn parse_fractions(s: &str) -> Result<[f64; 3], String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| "Fractions must be numbers in format 'bgs,elg,lrg'".to_string())?;
    <[f64; 3]>::try_from(values)
        .map_err(|_| "Exactly three fractions are required: 'bgs,elg,lrg'".to_string())
}

/// Command line arguments for simulated archetypes
#[derive(Parser, Debug)]
#[command(
    name = "archetypes_simulated",
    about = "Generate archetypes from simulated star, galaxy or quasar spectra",
    long_about = None
)]
struct Args {
    /// Object type to simulate
    #[arg(long, value_enum)]
    objtype: ObjectType,

    /// Number of spectra to simulate
    #[arg(long, default_value_t = 1000)]
    nspec: usize,

    /// Master random seed; template i uses seed + i
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Sampling of the analytic models before rebinning (Å)
    #[arg(long, default_value_t = 0.5)]
    native_step: f64,

    /// Stellar effective temperature range in K (format: "min,max")
    #[arg(long, default_value = "3000,30000", value_parser = parse_window)]
    teff_range: (f64, f64),

    /// Relative numbers of BGS, ELG and LRG galaxies (format: "bgs,elg,lrg")
    #[arg(long, default_value = "1,1,1", value_parser = parse_fractions)]
    galaxy_fractions: [f64; 3],

    /// Do not imprint the Lyman-alpha forest on quasars
    #[arg(long, default_value_t = false)]
    no_forest: bool,

    #[command(flatten)]
    grid: GridArgs,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    output: OutputArgs,
}

fn simulate(args: &Args, grid: &WavelengthGrid) -> Result<TemplateSet, TemplateError> {
    info!(
        "Simulating {} {} spectra on {} pixels [{:.1}, {:.1}] Å",
        args.nspec,
        args.objtype.rrtype(),
        grid.npix(),
        grid.min(),
        grid.max()
    );

    let set = match args.objtype {
        ObjectType::Star => {
            let (t_min, t_max) = args.teff_range;
            StarTemplates::new(t_min, t_max, 0.2)?.make_templates(
                args.nspec,
                args.seed,
                grid,
                args.native_step,
            )?
        }
        ObjectType::Galaxy => GalaxyTemplates::new(args.galaxy_fractions)?.make_templates(
            args.nspec,
            args.seed,
            grid,
            args.native_step,
        )?,
        ObjectType::Qso => {
            let forest = if args.no_forest { None } else { Some((1.8, 3.5)) };
            QsoTemplates::new(-0.5, 0.3, forest)?.make_templates(
                args.nspec,
                args.seed,
                grid,
                args.native_step,
            )?
        }
    };
    Ok(set)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let grid = args.grid.to_grid(args.objtype)?;
    let templates = simulate(&args, &grid)?;
    info!("Simulated {} spectra in {:.1?}", templates.flux.nrows(), start.elapsed());

    let params = args
        .output
        .pipeline_params(&args.selection, "archetypes_simulated");
    let (subtype, template_params): (Vec<_>, Vec<_>) = templates
        .meta
        .into_iter()
        .map(|m| (m.subtype, m.params))
        .unzip();
    let (archetypes, summary) = ArchetypePipeline::new(params).run(PipelineInput {
        grid,
        flux: templates.flux,
        subtype,
        rrtype: args.objtype.rrtype().to_string(),
        seed: Some(args.seed),
        params: template_params,
        source: None,
    })?;

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
