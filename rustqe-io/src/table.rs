//! Lookup table files.

use crate::{Error, Result};
use rustqe_tof::{LookupTable, TableParts};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Version written to, and required in, table files.
pub const TABLE_FORMAT_VERSION: &str = "1";

const TABLE_KIND: &str = "rustqe-tof-lookup-table";

#[derive(Serialize)]
struct TableFileOut<'a> {
    kind: &'static str,
    format_version: &'static str,
    table: &'a LookupTable,
}

#[derive(Deserialize)]
struct TableFileIn {
    kind: String,
    format_version: String,
    table: serde_json::Value,
}

/// On-disk table format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    Json,
    /// HDF5 file with one dataset per table array.
    Hdf5,
}

impl TableFormat {
    /// Guesses the format from a file extension (`.json`, `.h5`, `.hdf5`, `.nxs`).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "h5" | "hdf5" | "nxs" => Some(Self::Hdf5),
            _ => None,
        }
    }

    /// Whether this build can read and write the format.
    #[must_use]
    pub fn is_available(self) -> bool {
        match self {
            Self::Json => true,
            Self::Hdf5 => cfg!(feature = "hdf5"),
        }
    }
}

/// Serializes a table to a JSON document.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn table_to_json(table: &LookupTable) -> Result<String> {
    Ok(serde_json::to_string(&TableFileOut {
        kind: TABLE_KIND,
        format_version: TABLE_FORMAT_VERSION,
        table,
    })?)
}

/// Parses a table from a JSON document written by [`table_to_json`].
///
/// # Errors
/// Returns an error for malformed JSON, a foreign document kind, another
/// format version, or inconsistent table arrays.
pub fn table_from_json(json: &str) -> Result<LookupTable> {
    let file: TableFileIn = serde_json::from_str(json)?;
    decode(file)
}

/// Writes a table as JSON.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_table_json<P: AsRef<Path>>(path: P, table: &LookupTable) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(
        &mut writer,
        &TableFileOut {
            kind: TABLE_KIND,
            format_version: TABLE_FORMAT_VERSION,
            table,
        },
    )?;
    writer.flush()?;
    Ok(())
}

/// Reads a table written by [`write_table_json`].
///
/// # Errors
/// See [`table_from_json`].
pub fn read_table_json<P: AsRef<Path>>(path: P) -> Result<LookupTable> {
    let reader = BufReader::new(File::open(path)?);
    let file: TableFileIn = serde_json::from_reader(reader)?;
    decode(file)
}

fn decode(file: TableFileIn) -> Result<LookupTable> {
    if file.kind != TABLE_KIND {
        return Err(Error::InvalidFormat(format!(
            "expected a `{TABLE_KIND}` document, found `{}`",
            file.kind
        )));
    }
    if file.format_version != TABLE_FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: file.format_version,
            expected: TABLE_FORMAT_VERSION,
        });
    }
    let parts: TableParts = serde_json::from_value(file.table)?;
    Ok(LookupTable::from_parts(parts)?)
}

/// Saves a table in the given format.
///
/// # Errors
/// Returns [`Error::FeatureDisabled`] for HDF5 without the `hdf5` feature,
/// otherwise any write error.
pub fn save_table<P: AsRef<Path>>(path: P, table: &LookupTable, format: TableFormat) -> Result<()> {
    let path = path.as_ref();
    match format {
        TableFormat::Json => write_table_json(path, table)?,
        #[cfg(feature = "hdf5")]
        TableFormat::Hdf5 => crate::hdf5::write_table_hdf5(path, table)?,
        #[cfg(not(feature = "hdf5"))]
        TableFormat::Hdf5 => return Err(Error::FeatureDisabled("HDF5")),
    }
    log::info!(
        "wrote {}x{} table to {}",
        table.n_distances(),
        table.n_times(),
        path.display()
    );
    Ok(())
}

/// Loads a table, choosing the format from the extension (JSON when unknown).
///
/// # Errors
/// Returns an error if the file cannot be read or holds no valid table.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<LookupTable> {
    let path = path.as_ref();
    let table = match TableFormat::from_path(path).unwrap_or(TableFormat::Json) {
        TableFormat::Json => read_table_json(path)?,
        #[cfg(feature = "hdf5")]
        TableFormat::Hdf5 => crate::hdf5::read_table_hdf5(path)?,
        #[cfg(not(feature = "hdf5"))]
        TableFormat::Hdf5 => return Err(Error::FeatureDisabled("HDF5")),
    };
    log::debug!(
        "loaded {}x{} table from {}",
        table.n_distances(),
        table.n_times(),
        path.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustqe_tof::TofConfig;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"{
        "source": { "wavelength_range_angstrom": [2.0, 4.0] },
        "choppers": [
            { "name": "band", "distance_m": 8.0, "frequency_hz": 14.0,
              "phase_deg": 20.0, "openings_deg": [[0.0, 60.0]] }
        ],
        "table": { "distance_min_m": 30.0, "distance_max_m": 31.0,
                   "time_resolution_us": 500.0, "error_threshold": null },
        "simulation": { "neutrons": 4000, "seed": 3 }
    }"#;

    fn small_table() -> LookupTable {
        TofConfig::from_json(CONFIG).unwrap().build_table().unwrap()
    }

    #[test]
    fn test_json_roundtrip_is_exact() {
        let table = small_table();
        assert!(table.coverage().valid_cells > 0);

        let file = NamedTempFile::new().unwrap();
        write_table_json(file.path(), &table).unwrap();
        let loaded = read_table_json(file.path()).unwrap();

        assert_eq!(loaded, table);
        assert_eq!(loaded.neutrons_simulated(), 4000);
    }

    #[test]
    fn test_rejects_other_version() {
        let json = table_to_json(&small_table()).unwrap();
        let bumped = json.replacen("\"format_version\":\"1\"", "\"format_version\":\"9\"", 1);
        match table_from_json(&bumped) {
            Err(Error::UnsupportedVersion { found, .. }) => assert_eq!(found, "9"),
            other => panic!("expected a version error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_foreign_document() {
        let err = table_from_json(r#"{"kind": "histogram", "format_version": "1", "table": {}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TableFormat::from_path(Path::new("t.json")), Some(TableFormat::Json));
        assert_eq!(TableFormat::from_path(Path::new("t.H5")), Some(TableFormat::Hdf5));
        assert_eq!(TableFormat::from_path(Path::new("t.nxs")), Some(TableFormat::Hdf5));
        assert_eq!(TableFormat::from_path(Path::new("table")), None);
        assert!(TableFormat::Json.is_available());
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_hdf5_needs_feature() {
        let file = NamedTempFile::new().unwrap();
        let err = save_table(file.path(), &small_table(), TableFormat::Hdf5).unwrap_err();
        assert!(matches!(err, Error::FeatureDisabled(_)));
    }
}
