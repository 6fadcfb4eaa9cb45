//! Spectral archetype generation
//!
//! This crate builds small sets of representative spectra ("archetypes")
//! for spectral classification. Input spectra are either simulated from
//! analytic stellar, galaxy and quasar models or fitted from observed
//! survey data with a PCA basis. They are resampled onto a common
//! rest-frame grid, compared pairwise with a chi2 metric, and reduced to
//! the archetypes that best explain the whole batch.

pub mod algo;
pub mod chi2;
pub mod grid;
pub mod io;
pub mod observed;
pub mod pipeline;
pub mod selection;
pub mod shared_args;
pub mod templates;

// Re-exports for easier access
pub use chi2::{compute_chi2, Chi2Error, Chi2Matrix, Chi2Options};
pub use grid::{GridError, WavelengthGrid};
pub use io::fits::{read_archetypes, write_archetypes, FitsError};
pub use observed::{fit_spectrum, fit_survey, pipeline_input, FitError, PcaBasis, SurveySpectra};
pub use pipeline::{
    ArchetypePipeline, ArchetypeSet, PipelineError, PipelineInput, RunSummary, SourceRows,
};
pub use selection::{ArchetypeSelector, Selection, SelectionError, SelectionParams};
pub use templates::{
    GalaxyTemplates, QsoTemplates, StarTemplates, TemplateError, TemplateGenerator, TemplateSet,
};
