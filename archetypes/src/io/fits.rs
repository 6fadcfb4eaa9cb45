//! FITS reading and writing.
//!
//! Images are stored with the wavelength axis along NAXIS1, so an
//! `nrows × nwave` array is written row-major with `dimensions = [nrows,
//! nwave]`. Array shapes are always rebuilt from explicit header keys.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDateTime;
use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use log::debug;
use ndarray::Array2;
use thiserror::Error;

use crate::grid::{GridError, WavelengthGrid};
use crate::observed::{FitError, PcaBasis, SurveySpectra};
use crate::pipeline::{ArchetypeHeader, ArchetypeSet};

pub const ARCHETYPES_HDU: &str = "ARCHETYPES";
pub const ARCHETYPE_META_HDU: &str = "ARCHETYPE_META";
pub const WAVELENGTH_HDU: &str = "WAVELENGTH";
pub const FLUX_HDU: &str = "FLUX";
pub const IVAR_HDU: &str = "IVAR";
pub const REDSHIFTS_HDU: &str = "REDSHIFTS";
pub const BASIS_HDU: &str = "BASIS_VECTORS";

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// Smallest SUBTYPE column width; wider labels widen the column
const MIN_SUBTYPE_WIDTH: usize = 24;

/// Errors that can occur during FITS file operations
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("HDU not found: {0}")]
    HduNotFound(String),
    #[error("Invalid data type in HDU: {0}")]
    InvalidDataType(String),
    #[error("Invalid header value for {key}: {reason}")]
    InvalidHeader { key: String, reason: String },
    #[error("Invalid wavelength grid: {0}")]
    Grid(#[from] GridError),
    #[error("Inconsistent spectra: {0}")]
    Spectra(#[from] FitError),
}

fn open_hdu(fptr: &mut FitsFile, name: &str) -> Result<FitsHdu, FitsError> {
    fptr.hdu(name)
        .map_err(|_| FitsError::HduNotFound(name.to_string()))
}

fn read_usize(fptr: &mut FitsFile, hdu: &FitsHdu, key: &str) -> Result<usize, FitsError> {
    let value = hdu.read_key::<i64>(fptr, key)?;
    usize::try_from(value).map_err(|_| FitsError::InvalidHeader {
        key: key.to_string(),
        reason: format!("expected a non-negative count, got {value}"),
    })
}

/// Count stored under an optional key
fn read_optional_usize(fptr: &mut FitsFile, hdu: &FitsHdu, key: &str) -> Result<Option<usize>, FitsError> {
    match hdu.read_key::<i64>(fptr, key) {
        Ok(_) => Ok(Some(read_usize(fptr, hdu, key)?)),
        Err(_) => Ok(None),
    }
}

fn write_usize(fptr: &mut FitsFile, hdu: &FitsHdu, key: &str, value: usize) -> Result<(), FitsError> {
    let value = i64::try_from(value).map_err(|_| FitsError::InvalidHeader {
        key: key.to_string(),
        reason: format!("{value} does not fit in a FITS integer"),
    })?;
    hdu.write_key(fptr, key, value)?;
    Ok(())
}

fn write_grid_keys(fptr: &mut FitsFile, hdu: &FitsHdu, grid: &WavelengthGrid) -> Result<(), FitsError> {
    let (crval1, cdelt1, log_lam) = grid.header_values();
    hdu.write_key(fptr, "CRVAL1", crval1)?;
    hdu.write_key(fptr, "CDELT1", cdelt1)?;
    hdu.write_key(fptr, "LOGLAM", i64::from(log_lam))?;
    Ok(())
}

fn read_grid_keys(fptr: &mut FitsFile, hdu: &FitsHdu, npix: usize) -> Result<WavelengthGrid, FitsError> {
    let crval1 = hdu.read_key::<f64>(fptr, "CRVAL1")?;
    let cdelt1 = hdu.read_key::<f64>(fptr, "CDELT1")?;
    // LOGLAM is optional in externally produced files
    let log_lam = hdu.read_key::<i64>(fptr, "LOGLAM").unwrap_or(0) != 0;
    Ok(WavelengthGrid::from_header(crval1, cdelt1, npix, log_lam)?)
}

fn write_image_2d(fptr: &mut FitsFile, name: &str, data: &Array2<f64>) -> Result<FitsHdu, FitsError> {
    let (nrows, ncols) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[nrows, ncols],
    };
    let hdu = fptr.create_image(name.to_string(), &description)?;
    let flat: Vec<f64> = data.iter().copied().collect();
    hdu.write_image(fptr, &flat)?;
    Ok(hdu)
}

fn read_image_2d(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    name: &str,
    shape: (usize, usize),
) -> Result<Array2<f64>, FitsError> {
    let data: Vec<f64> = hdu.read_image(fptr)?;
    Array2::from_shape_vec(shape, data).map_err(|_| {
        FitsError::InvalidDataType(format!("Cannot reshape image data for HDU '{name}' to {shape:?}"))
    })
}

/// NAXIS2 × NAXIS1 of a 2D image
fn image_shape(fptr: &mut FitsFile, hdu: &FitsHdu, name: &str) -> Result<(usize, usize), FitsError> {
    let naxis = hdu.read_key::<i64>(fptr, "NAXIS")?;
    if naxis != 2 {
        return Err(FitsError::InvalidDataType(format!(
            "HDU '{name}' has {naxis} axes, expected 2"
        )));
    }
    Ok((read_usize(fptr, hdu, "NAXIS2")?, read_usize(fptr, hdu, "NAXIS1")?))
}

/// String column wide enough for the longest label
fn subtype_column(labels: &[String]) -> Result<fitsio::tables::ConcreteColumnDescription, FitsError> {
    let width = labels
        .iter()
        .map(|s| s.len())
        .max()
        .unwrap_or(0)
        .max(MIN_SUBTYPE_WIDTH);
    Ok(ColumnDescription::new("SUBTYPE")
        .with_type(ColumnDataType::String)
        .that_repeats(width)
        .create()?)
}

/// Union of parameter names, sorted
fn param_names(params: &[BTreeMap<String, f64>]) -> Vec<String> {
    params
        .iter()
        .flat_map(|p| p.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Write archetypes, overwriting `path`.
pub fn write_archetypes<P: AsRef<Path>>(path: P, set: &ArchetypeSet) -> Result<(), FitsError> {
    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;
    let header = &set.header;

    let hdu = write_image_2d(&mut fptr, ARCHETYPES_HDU, &set.flux)?;
    write_grid_keys(&mut fptr, &hdu, &set.grid)?;
    write_usize(&mut fptr, &hdu, "NWAVE", set.grid.npix())?;
    write_usize(&mut fptr, &hdu, "NARCH", set.len())?;
    hdu.write_key(&mut fptr, "RRTYPE", header.rrtype.clone())?;
    hdu.write_key(&mut fptr, "RRVER", header.rrver.clone())?;
    hdu.write_key(&mut fptr, "VERSION", header.version.clone())?;
    hdu.write_key(&mut fptr, "ORIGIN", header.origin.clone())?;
    write_usize(&mut fptr, &hdu, "NSOURCE", header.n_source)?;
    write_usize(&mut fptr, &hdu, "INSPEC", header.n_input)?;
    write_usize(&mut fptr, &hdu, "NSPEC", header.n_used)?;
    hdu.write_key(&mut fptr, "CHI2THR", header.chi2_threshold)?;
    if let Some(seed) = header.seed {
        let seed = i64::try_from(seed).map_err(|_| FitsError::InvalidHeader {
            key: "SEED".to_string(),
            reason: format!("{seed} does not fit in a FITS integer"),
        })?;
        hdu.write_key(&mut fptr, "SEED", seed)?;
    }
    if let Some((lo, hi)) = header.norm_window {
        hdu.write_key(&mut fptr, "NORMWMIN", lo)?;
        hdu.write_key(&mut fptr, "NORMWMAX", hi)?;
    }
    hdu.write_key(
        &mut fptr,
        "DATE",
        header.created.format(DATE_FORMAT).to_string(),
    )?;

    // Parameters become Double columns, NaN where an archetype lacks one
    let names = param_names(&set.params);
    let mut columns = vec![
        subtype_column(&set.subtype)?,
        ColumnDescription::new("RESPONSIBILITY")
            .with_type(ColumnDataType::Long)
            .create()?,
        ColumnDescription::new("INPUT_INDEX")
            .with_type(ColumnDataType::Long)
            .create()?,
    ];
    for name in &names {
        columns.push(
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Double)
                .create()?,
        );
    }
    let table = fptr.create_table(ARCHETYPE_META_HDU.to_string(), &columns)?;
    let responsibility: Vec<i64> = set.responsibility.iter().map(|&r| r as i64).collect();
    let input_index: Vec<i64> = set.input_index.iter().map(|&i| i as i64).collect();
    table.write_col(&mut fptr, "SUBTYPE", &set.subtype)?;
    table.write_col(&mut fptr, "RESPONSIBILITY", &responsibility)?;
    table.write_col(&mut fptr, "INPUT_INDEX", &input_index)?;

    write_usize(&mut fptr, &table, "NPARAM", names.len())?;
    for (k, name) in names.iter().enumerate() {
        let values: Vec<f64> = (0..set.len())
            .map(|a| {
                set.params
                    .get(a)
                    .and_then(|p| p.get(name))
                    .copied()
                    .unwrap_or(f64::NAN)
            })
            .collect();
        table.write_col(&mut fptr, name, &values)?;
        table.write_key(&mut fptr, &format!("PARAM{}", k + 1), name.clone())?;
    }

    debug!(
        "Wrote {} {} archetypes to {}",
        set.len(),
        header.rrtype,
        path.as_ref().display()
    );
    Ok(())
}

/// Read an archetype file written by [`write_archetypes`].
pub fn read_archetypes<P: AsRef<Path>>(path: P) -> Result<ArchetypeSet, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;

    let hdu = open_hdu(&mut fptr, ARCHETYPES_HDU)?;
    let nwave = read_usize(&mut fptr, &hdu, "NWAVE")?;
    let narch = read_usize(&mut fptr, &hdu, "NARCH")?;
    let grid = read_grid_keys(&mut fptr, &hdu, nwave)?;
    let flux = read_image_2d(&mut fptr, &hdu, ARCHETYPES_HDU, (narch, nwave))?;

    let seed = match hdu.read_key::<i64>(&mut fptr, "SEED") {
        Ok(seed) => Some(u64::try_from(seed).map_err(|_| FitsError::InvalidHeader {
            key: "SEED".to_string(),
            reason: format!("negative seed {seed}"),
        })?),
        Err(_) => None,
    };
    let norm_window = match (
        hdu.read_key::<f64>(&mut fptr, "NORMWMIN"),
        hdu.read_key::<f64>(&mut fptr, "NORMWMAX"),
    ) {
        (Ok(lo), Ok(hi)) => Some((lo, hi)),
        _ => None,
    };
    let date = hdu.read_key::<String>(&mut fptr, "DATE")?;
    let created = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| FitsError::InvalidHeader {
            key: "DATE".to_string(),
            reason: format!("{date}: {e}"),
        })?
        .and_utc();

    let n_input = read_usize(&mut fptr, &hdu, "INSPEC")?;
    // Files without NSOURCE were built straight from their inputs
    let n_source = read_optional_usize(&mut fptr, &hdu, "NSOURCE")?.unwrap_or(n_input);
    let header = ArchetypeHeader {
        rrtype: hdu.read_key::<String>(&mut fptr, "RRTYPE")?,
        rrver: hdu.read_key::<String>(&mut fptr, "RRVER")?,
        version: hdu.read_key::<String>(&mut fptr, "VERSION")?,
        origin: hdu.read_key::<String>(&mut fptr, "ORIGIN")?,
        n_source,
        n_input,
        n_used: read_usize(&mut fptr, &hdu, "NSPEC")?,
        chi2_threshold: hdu.read_key::<f64>(&mut fptr, "CHI2THR")?,
        seed,
        norm_window,
        created,
    };

    let table = open_hdu(&mut fptr, ARCHETYPE_META_HDU)?;
    let subtype: Vec<String> = table.read_col(&mut fptr, "SUBTYPE")?;
    let responsibility: Vec<i64> = table.read_col(&mut fptr, "RESPONSIBILITY")?;
    let input_index: Vec<i64> = table.read_col(&mut fptr, "INPUT_INDEX")?;
    if subtype.len() != narch || responsibility.len() != narch || input_index.len() != narch {
        return Err(FitsError::InvalidDataType(format!(
            "{ARCHETYPE_META_HDU} has {} rows for {narch} archetypes",
            subtype.len()
        )));
    }

    let nparam = read_optional_usize(&mut fptr, &table, "NPARAM")?.unwrap_or(0);
    let mut params = vec![BTreeMap::new(); narch];
    for k in 1..=nparam {
        let name = table.read_key::<String>(&mut fptr, &format!("PARAM{k}"))?;
        let values: Vec<f64> = table.read_col(&mut fptr, &name)?;
        for (p, value) in params.iter_mut().zip(values) {
            if !value.is_nan() {
                p.insert(name.clone(), value);
            }
        }
    }

    Ok(ArchetypeSet {
        grid,
        flux,
        subtype,
        responsibility: responsibility.into_iter().map(|r| r.max(0) as usize).collect(),
        input_index: input_index.into_iter().map(|i| i.max(0) as usize).collect(),
        params,
        header,
    })
}

/// Write observed-frame spectra with their redshifts, overwriting `path`.
pub fn write_survey_spectra<P: AsRef<Path>>(path: P, spectra: &SurveySpectra) -> Result<(), FitsError> {
    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;

    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[spectra.wavelength.len()],
    };
    let hdu = fptr.create_image(WAVELENGTH_HDU.to_string(), &description)?;
    hdu.write_image(&mut fptr, &spectra.wavelength)?;

    write_image_2d(&mut fptr, FLUX_HDU, &spectra.flux)?;
    write_image_2d(&mut fptr, IVAR_HDU, &spectra.ivar)?;

    let columns = [
        ColumnDescription::new("Z")
            .with_type(ColumnDataType::Double)
            .create()?,
        subtype_column(&spectra.subtype)?,
    ];
    let table = fptr.create_table(REDSHIFTS_HDU.to_string(), &columns)?;
    table.write_col(&mut fptr, "Z", &spectra.redshift)?;
    table.write_col(&mut fptr, "SUBTYPE", &spectra.subtype)?;
    Ok(())
}

/// Read observed spectra; the `SUBTYPE` column is optional.
pub fn read_survey_spectra<P: AsRef<Path>>(path: P) -> Result<SurveySpectra, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;

    let hdu = open_hdu(&mut fptr, WAVELENGTH_HDU)?;
    let wavelength: Vec<f64> = hdu.read_image(&mut fptr)?;

    let hdu = open_hdu(&mut fptr, FLUX_HDU)?;
    let shape = image_shape(&mut fptr, &hdu, FLUX_HDU)?;
    let flux = read_image_2d(&mut fptr, &hdu, FLUX_HDU, shape)?;

    let hdu = open_hdu(&mut fptr, IVAR_HDU)?;
    let shape = image_shape(&mut fptr, &hdu, IVAR_HDU)?;
    let ivar = read_image_2d(&mut fptr, &hdu, IVAR_HDU, shape)?;

    let table = open_hdu(&mut fptr, REDSHIFTS_HDU)?;
    let redshift: Vec<f64> = table.read_col(&mut fptr, "Z")?;
    let subtype: Vec<String> = table
        .read_col(&mut fptr, "SUBTYPE")
        .unwrap_or_else(|_| vec![String::new(); redshift.len()]);

    debug!(
        "Read {} spectra with {} pixels from {}",
        flux.nrows(),
        wavelength.len(),
        path.as_ref().display()
    );
    Ok(SurveySpectra::new(wavelength, flux, ivar, redshift, subtype)?)
}

/// Write a PCA basis sampled on `grid`, overwriting `path`.
pub fn write_pca_basis<P: AsRef<Path>>(
    path: P,
    basis: &PcaBasis,
    grid: &WavelengthGrid,
) -> Result<(), FitsError> {
    if grid.npix() != basis.wavelength.len() {
        return Err(FitsError::InvalidDataType(format!(
            "basis has {} wavelengths but the grid has {} pixels",
            basis.wavelength.len(),
            grid.npix()
        )));
    }
    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;
    let hdu = write_image_2d(&mut fptr, BASIS_HDU, &basis.vectors)?;
    write_grid_keys(&mut fptr, &hdu, grid)?;
    hdu.write_key(&mut fptr, "RRTYPE", basis.rrtype.clone())?;
    hdu.write_key(&mut fptr, "RRSUBTYP", basis.subtype.clone())?;
    Ok(())
}

/// Read a PCA basis; the wavelength axis comes from CRVAL1/CDELT1/LOGLAM.
pub fn read_pca_basis<P: AsRef<Path>>(path: P) -> Result<PcaBasis, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = open_hdu(&mut fptr, BASIS_HDU)?;
    let (ncomp, nwave) = image_shape(&mut fptr, &hdu, BASIS_HDU)?;
    let vectors = read_image_2d(&mut fptr, &hdu, BASIS_HDU, (ncomp, nwave))?;
    let grid = read_grid_keys(&mut fptr, &hdu, nwave)?;
    let rrtype = hdu.read_key::<String>(&mut fptr, "RRTYPE")?;
    let subtype = hdu
        .read_key::<String>(&mut fptr, "RRSUBTYP")
        .unwrap_or_default();

    Ok(PcaBasis::new(grid.wavelengths(), vectors, rrtype, subtype)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn archetype_set() -> ArchetypeSet {
        let grid = WavelengthGrid::linear(3600.0, 3700.0, 10.0).unwrap();
        let flux = Array2::from_shape_fn((3, grid.npix()), |(i, j)| 1.0 + i as f64 + 0.01 * j as f64);
        let created = NaiveDateTime::parse_from_str("2024-05-01T12:30:00", DATE_FORMAT)
            .unwrap()
            .and_utc();
        ArchetypeSet {
            grid,
            flux,
            subtype: vec!["ELG".to_string(), "LRG".to_string(), "BGS".to_string()],
            responsibility: vec![5, 3, 1],
            input_index: vec![7, 2, 0],
            params: vec![
                BTreeMap::from([("D4000".to_string(), 1.2), ("TOLD".to_string(), 4000.0)]),
                BTreeMap::from([("D4000".to_string(), 1.9)]),
                BTreeMap::new(),
            ],
            header: ArchetypeHeader {
                rrtype: "GALAXY".to_string(),
                rrver: "0.1.0".to_string(),
                version: "2.1".to_string(),
                origin: "unit test".to_string(),
                n_source: 25,
                n_input: 10,
                n_used: 9,
                chi2_threshold: 0.05,
                seed: Some(42),
                norm_window: Some((3620.0, 3680.0)),
                created,
            },
        }
    }

    #[test]
    fn test_archetypes_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archetypes.fits");
        let set = archetype_set();

        write_archetypes(&path, &set).unwrap();
        let read = read_archetypes(&path).unwrap();

        assert_eq!(read.flux.dim(), set.flux.dim());
        for (a, b) in read.flux.iter().zip(set.flux.iter()) {
            assert_relative_eq!(*a, *b);
        }
        assert_eq!(read.grid.npix(), set.grid.npix());
        assert_relative_eq!(read.grid.min(), set.grid.min(), max_relative = 1e-8);
        assert_relative_eq!(read.grid.max(), set.grid.max(), max_relative = 1e-8);
        assert_eq!(read.subtype, set.subtype);
        assert_eq!(read.responsibility, set.responsibility);
        assert_eq!(read.input_index, set.input_index);

        let h = &read.header;
        assert_eq!(h.rrtype, "GALAXY");
        assert_eq!(h.version, "2.1");
        assert_eq!(h.origin, "unit test");
        assert_eq!((h.n_source, h.n_input, h.n_used), (25, 10, 9));
        assert_eq!(read.params, set.params);
        assert_eq!(h.seed, Some(42));
        assert_relative_eq!(h.chi2_threshold, 0.05, max_relative = 1e-8);
        let (lo, hi) = h.norm_window.unwrap();
        assert_relative_eq!(lo, 3620.0, max_relative = 1e-8);
        assert_relative_eq!(hi, 3680.0, max_relative = 1e-8);
        assert_eq!(h.created, set.header.created);
    }

    #[test]
    fn test_overwrite_and_optional_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archetypes.fits");
        let mut set = archetype_set();
        write_archetypes(&path, &set).unwrap();

        set.header.seed = None;
        set.header.norm_window = None;
        write_archetypes(&path, &set).unwrap();

        let read = read_archetypes(&path).unwrap();
        assert_eq!(read.header.seed, None);
        assert_eq!(read.header.norm_window, None);
    }

    #[test]
    fn test_survey_spectra_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.fits");
        let wavelength: Vec<f64> = (0..50).map(|i| 3600.0 + 2.0 * i as f64).collect();
        let flux = Array2::from_shape_fn((4, 50), |(i, j)| (i * 50 + j) as f64);
        let ivar = Array2::from_elem((4, 50), 0.5);
        let spectra = SurveySpectra::new(
            wavelength.clone(),
            flux.clone(),
            ivar,
            vec![0.1, 0.2, 0.3, 0.4],
            vec!["A".into(), "B".into(), "".into(), "D".into()],
        )
        .unwrap();

        write_survey_spectra(&path, &spectra).unwrap();
        let read = read_survey_spectra(&path).unwrap();

        assert_eq!(read.wavelength, wavelength);
        assert_eq!(read.flux, flux);
        assert_eq!(read.ivar[[3, 49]], 0.5);
        assert_eq!(read.redshift, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(read.subtype[0], "A");
        assert_eq!(read.subtype[3], "D");
    }

    #[test]
    fn test_long_subtype_labels_are_kept() {
        let dir = tempdir().unwrap();
        let long = "ELG_HIGH_IONIZATION_STRONG_OIII_DOUBLET".to_string();
        assert!(long.len() > MIN_SUBTYPE_WIDTH);

        let mut set = archetype_set();
        set.subtype[1] = long.clone();
        let path = dir.path().join("archetypes.fits");
        write_archetypes(&path, &set).unwrap();
        assert_eq!(read_archetypes(&path).unwrap().subtype, set.subtype);

        let wavelength: Vec<f64> = (0..10).map(|i| 4000.0 + i as f64).collect();
        let spectra = SurveySpectra::new(
            wavelength,
            Array2::ones((2, 10)),
            Array2::ones((2, 10)),
            vec![0.1, 0.2],
            vec![long.clone(), "QSO".into()],
        )
        .unwrap();
        let path = dir.path().join("survey.fits");
        write_survey_spectra(&path, &spectra).unwrap();
        assert_eq!(read_survey_spectra(&path).unwrap().subtype, vec![long, "QSO".to_string()]);
    }

    #[test]
    fn test_pca_basis_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basis.fits");
        let grid = WavelengthGrid::log10(3000.0, 9000.0, 1e-3).unwrap();
        let vectors = Array2::from_shape_fn((3, grid.npix()), |(k, j)| (k as f64 + 1.0) * (j as f64).sqrt());
        let basis = PcaBasis::new(grid.wavelengths(), vectors.clone(), "GALAXY", "ELG").unwrap();

        write_pca_basis(&path, &basis, &grid).unwrap();
        let read = read_pca_basis(&path).unwrap();

        assert_eq!(read.ncomp(), 3);
        assert_eq!(read.vectors, vectors);
        assert_eq!(read.rrtype, "GALAXY");
        assert_eq!(read.subtype, "ELG");
        assert_relative_eq!(read.min(), 3000.0, max_relative = 1e-6);
        assert_eq!(read.wavelength.len(), grid.npix());
    }

    #[test]
    fn test_missing_file_and_hdu() {
        let dir = tempdir().unwrap();
        assert!(read_archetypes(dir.path().join("missing.fits")).is_err());

        let path = dir.path().join("basis.fits");
        let grid = WavelengthGrid::linear(3000.0, 3100.0, 10.0).unwrap();
        let basis = PcaBasis::new(grid.wavelengths(), Array2::ones((1, grid.npix())), "STAR", "").unwrap();
        write_pca_basis(&path, &basis, &grid).unwrap();
        assert!(matches!(
            read_archetypes(&path),
            Err(FitsError::HduNotFound(_))
        ));
    }
}
