//! File I/O for archetypes, survey spectra and PCA bases
//!
//! All persistent products are FITS files.

pub mod fits;

pub use fits::{
    read_archetypes, read_pca_basis, read_survey_spectra, write_archetypes, write_pca_basis,
    write_survey_spectra, FitsError,
};
