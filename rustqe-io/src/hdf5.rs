//! HDF5 lookup table files.
//!
//! Layout:
//!
//! ```text
//! /                       rustqe_format_version
//! /entry                  NX_class = NXentry
//! /entry/tof_table        NX_class = NXdata, signal = time_of_flight
//!     distance            [n_distances]            m
//!     frame_time          [n_times]   cell centres ns
//!     time_of_flight      [n_distances, n_times]   ns
//!     time_of_flight_std  [n_distances, n_times]   ns
//!     mean_frame_time     [n_distances, n_times]   ns
//!     counts              [n_distances, n_times]   u32
//!     valid               [n_distances, n_times]   u8
//! ```
//!
//! Grid metadata lives in attributes of `tof_table`; `error_threshold` is
//! absent when the table was built without one.

use crate::table::TABLE_FORMAT_VERSION;
use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{Array2, ArrayView1};
use rustqe_tof::{LookupTable, TableParts};
use std::path::Path;
use std::str::FromStr;

const TABLE_AXES: [&str; 2] = ["distance", "frame_time"];

/// Writes a lookup table to an HDF5 file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_table_hdf5<P: AsRef<Path>>(path: P, table: &LookupTable) -> Result<()> {
    let parts = table.parts();
    let file = File::create(path)?;
    set_attr_str_file(&file, "rustqe_format_version", TABLE_FORMAT_VERSION)?;

    let entry = file.create_group("entry")?;
    set_attr_str_group(&entry, "NX_class", "NXentry")?;

    let group = entry.create_group("tof_table")?;
    set_attr_str_group(&group, "NX_class", "NXdata")?;
    set_attr_str_group(&group, "signal", "time_of_flight")?;
    set_axes_attr(&group, &TABLE_AXES)?;

    set_attr_f64(&group, "distance_min_m", parts.distance_min_m)?;
    set_attr_f64(&group, "distance_step_m", parts.distance_step_m)?;
    set_attr_f64(&group, "pulse_period_ns", parts.pulse_period_ns)?;
    set_attr_f64(&group, "time_step_ns", parts.time_step_ns)?;
    if let Some(threshold) = parts.error_threshold {
        set_attr_f64(&group, "error_threshold", threshold)?;
    }
    group
        .new_attr::<u64>()
        .create("neutrons_simulated")?
        .write_scalar(&(parts.neutrons_simulated as u64))?;

    let distances = table.distances();
    write_vec(&group, "distance", &distances, "m")?;
    let centres: Vec<f64> = (0..table.n_times()).map(|j| table.time_centre(j)).collect();
    write_vec(&group, "frame_time", &centres, "ns")?;

    write_grid(&group, "time_of_flight", &parts.tof_ns, Some("ns"))?;
    write_grid(&group, "time_of_flight_std", &parts.tof_std_ns, Some("ns"))?;
    write_grid(&group, "mean_frame_time", &parts.frame_time_ns, Some("ns"))?;
    write_grid(&group, "counts", &parts.counts, Some("count"))?;
    let valid = parts.valid.mapv(u8::from);
    write_grid(&group, "valid", &valid, None)?;
    Ok(())
}

/// Reads a lookup table written by [`write_table_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails, the version differs, or the
/// datasets do not form a consistent table.
pub fn read_table_hdf5<P: AsRef<Path>>(path: P) -> Result<LookupTable> {
    let file = File::open(path)?;
    let version = read_attr_string(&file.attr("rustqe_format_version")?)?;
    if version != TABLE_FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version,
            expected: TABLE_FORMAT_VERSION,
        });
    }
    let group = file.group("entry")?.group("tof_table")?;

    let neutrons_simulated = group.attr("neutrons_simulated")?.read_scalar::<u64>()?;
    let neutrons_simulated = usize::try_from(neutrons_simulated)
        .map_err(|_| Error::InvalidFormat("neutron count overflows usize".to_string()))?;

    let parts = TableParts {
        distance_min_m: group.attr("distance_min_m")?.read_scalar()?,
        distance_step_m: group.attr("distance_step_m")?.read_scalar()?,
        pulse_period_ns: group.attr("pulse_period_ns")?.read_scalar()?,
        time_step_ns: group.attr("time_step_ns")?.read_scalar()?,
        error_threshold: read_attr_opt::<f64>(&group, "error_threshold")?,
        neutrons_simulated,
        tof_ns: read_grid(&group, "time_of_flight")?,
        tof_std_ns: read_grid(&group, "time_of_flight_std")?,
        frame_time_ns: read_grid(&group, "mean_frame_time")?,
        counts: read_grid(&group, "counts")?,
        valid: read_grid::<u8>(&group, "valid")?.mapv(|v| v != 0),
    };
    Ok(LookupTable::from_parts(parts)?)
}

fn write_vec(group: &Group, name: &str, values: &[f64], units: &str) -> Result<()> {
    let dataset = group.new_dataset::<f64>().shape((values.len(),)).create(name)?;
    set_dataset_units(&dataset, units)?;
    dataset.write(ArrayView1::from(values))?;
    Ok(())
}

fn write_grid<T: H5Type>(
    group: &Group,
    name: &str,
    values: &Array2<T>,
    units: Option<&str>,
) -> Result<()> {
    let dataset = group
        .new_dataset::<T>()
        .shape(values.dim())
        .deflate(1)
        .shuffle()
        .create(name)?;
    if let Some(units) = units {
        set_dataset_units(&dataset, units)?;
    }
    dataset.write(values)?;
    Ok(())
}

fn read_grid<T: H5Type>(group: &Group, name: &str) -> Result<Array2<T>> {
    let dataset = group.dataset(name)?;
    let shape = dataset.shape();
    if shape.len() != 2 {
        return Err(Error::InvalidFormat(format!(
            "dataset {name} must be 2-D (distance, frame_time)"
        )));
    }
    let data = dataset.read_raw::<T>()?;
    Array2::from_shape_vec((shape[0], shape[1]), data)
        .map_err(|e| Error::InvalidFormat(format!("dataset {name}: {e}")))
}

fn set_axes_attr(group: &Group, axes: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = axes
        .iter()
        .map(|axis| to_var_len_unicode(axis))
        .collect::<Result<Vec<_>>>()?;
    let attr = group
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create("axes")?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn set_attr_f64(group: &Group, name: &str, value: f64) -> Result<()> {
    group.new_attr::<f64>().create(name)?.write_scalar(&value)?;
    Ok(())
}

fn set_dataset_units(dataset: &Dataset, units: &str) -> Result<()> {
    let value = to_var_len_unicode(units)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("units")?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_group(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

/// Reads an attribute that may be absent; a present but unreadable one is an error.
fn read_attr_opt<T: H5Type>(group: &Group, name: &str) -> Result<Option<T>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    Ok(Some(group.attr(name)?.read_scalar::<T>()?))
}

fn read_attr_string(attr: &hdf5::Attribute) -> Result<String> {
    let value: VarLenUnicode = attr.read_scalar()?;
    Ok(value.to_string())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_table, save_table, TableFormat};
    use rustqe_tof::TofConfig;
    use tempfile::Builder;

    const CONFIG: &str = r#"{
        "source": { "wavelength_range_angstrom": [2.0, 4.0] },
        "choppers": [
            { "name": "band", "distance_m": 8.0, "frequency_hz": 14.0,
              "phase_deg": 20.0, "openings_deg": [[0.0, 60.0]] }
        ],
        "table": { "distance_min_m": 30.0, "distance_max_m": 31.0,
                   "time_resolution_us": 500.0, "error_threshold": 0.05 },
        "simulation": { "neutrons": 4000, "seed": 5 }
    }"#;

    #[test]
    fn test_hdf5_table_roundtrip() {
        let table = TofConfig::from_json(CONFIG).unwrap().build_table().unwrap();
        let file = Builder::new().suffix(".h5").tempfile().unwrap();

        save_table(file.path(), &table, TableFormat::Hdf5).unwrap();
        let loaded = load_table(file.path()).unwrap();

        assert_eq!(loaded, table);
        assert_eq!(loaded.error_threshold(), Some(0.05));
    }

    #[test]
    fn test_hdf5_without_threshold() {
        let mut config = TofConfig::from_json(CONFIG).unwrap();
        config.table.error_threshold = None;
        let table = config.build_table().unwrap();
        let file = Builder::new().suffix(".h5").tempfile().unwrap();

        write_table_hdf5(file.path(), &table).unwrap();
        let loaded = read_table_hdf5(file.path()).unwrap();
        assert_eq!(loaded.error_threshold(), None);
        assert_eq!(loaded.coverage(), table.coverage());
    }

    #[test]
    fn test_mistyped_threshold_is_an_error() {
        let mut config = TofConfig::from_json(CONFIG).unwrap();
        config.table.error_threshold = None;
        let table = config.build_table().unwrap();
        let file = Builder::new().suffix(".h5").tempfile().unwrap();
        write_table_hdf5(file.path(), &table).unwrap();

        {
            let h5 = File::open_rw(file.path()).unwrap();
            let group = h5.group("entry").unwrap().group("tof_table").unwrap();
            set_attr_str_group(&group, "error_threshold", "tight").unwrap();
        }
        assert!(matches!(read_table_hdf5(file.path()), Err(Error::Hdf5(_))));
    }
}
