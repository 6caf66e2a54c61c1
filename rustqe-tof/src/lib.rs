//! rustqe-tof: chopper-cascade Monte Carlo, time-of-flight lookup tables and
//! frame unwrapping.
//!
//! # Key Components
//!
//! - [`SourceModel`] and [`ChopperCascade`] - the pulsed source and the disk
//!   choppers that shape it
//! - [`simulate`] - propagates random source neutrons through the cascade
//! - [`build_lookup_table`] - compresses the survivors into a
//!   (distance, frame time) -> time-of-flight [`LookupTable`]
//! - [`FrameUnwrapper`] - answers time-of-flight queries against a table
//! - [`TofConfig`] - JSON description of a whole table build
//!
//! # Processing Pipeline
//!
//! 1. Draw neutrons from the source and keep the ones every chopper passes
//! 2. Histogram their flight times per distance and frame-time cell
//! 3. Unwrap recorded frame times through the resulting table

mod chopper;
mod error;
pub mod frame;
mod lut;
mod simulation;
mod source;
mod unwrap;

pub use chopper::{ChopperCascade, ChopperOpening, DiskChopper};
pub use error::{Error, Result, UnwrapError};
pub use frame::{fold_into_frame, pulse_period_ns};
pub use lut::{build_lookup_table, LookupTable, TableCell, TableCoverage, TableParts, TableSettings};
pub use simulation::{simulate, SimulatedNeutrons, SimulationSettings};
pub use source::SourceModel;
pub use unwrap::FrameUnwrapper;

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Everything needed to build a lookup table.
#[derive(Clone, Debug, PartialEq)]
pub struct TofConfig {
    pub source: SourceModel,
    pub choppers: Vec<DiskChopper>,
    pub table: TableSettings,
    pub simulation: SimulationSettings,
}

// Intermediate structs for the JSON schema (times in ms/us, angles in deg)
#[derive(Deserialize)]
struct JsonConfig {
    #[serde(default)]
    source: JsonSource,
    #[serde(default)]
    choppers: Vec<JsonChopper>,
    table: JsonTable,
    #[serde(default)]
    simulation: JsonSimulation,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonSource {
    frequency_hz: f64,
    pulse_duration_ms: f64,
    emission_delay_ms: f64,
    speed_min_m_per_s: f64,
    speed_max_m_per_s: f64,
    /// Overrides the speed band when present.
    wavelength_range_angstrom: Option<[f64; 2]>,
}

impl Default for JsonSource {
    fn default() -> Self {
        let ess = SourceModel::ess_defaults();
        Self {
            frequency_hz: ess.frequency_hz,
            pulse_duration_ms: ess.pulse_duration_ns * 1.0e-6,
            emission_delay_ms: ess.emission_delay_ns * 1.0e-6,
            speed_min_m_per_s: ess.speed_min_m_per_s,
            speed_max_m_per_s: ess.speed_max_m_per_s,
            wavelength_range_angstrom: None,
        }
    }
}

#[derive(Deserialize)]
struct JsonChopper {
    name: String,
    distance_m: f64,
    frequency_hz: f64,
    #[serde(default)]
    phase_deg: f64,
    openings_deg: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonTable {
    distance_min_m: Option<f64>,
    distance_max_m: Option<f64>,
    distance_resolution_m: f64,
    time_resolution_us: f64,
    error_threshold: Option<f64>,
}

impl Default for JsonTable {
    fn default() -> Self {
        Self {
            distance_min_m: None,
            distance_max_m: None,
            distance_resolution_m: 0.1,
            time_resolution_us: 100.0,
            error_threshold: Some(0.1),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonSimulation {
    neutrons: usize,
    seed: u64,
}

impl Default for JsonSimulation {
    fn default() -> Self {
        let settings = SimulationSettings::default();
        Self {
            neutrons: settings.neutrons,
            seed: settings.seed,
        }
    }
}

impl TofConfig {
    /// Load a table-build description from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes an invalid source, chopper or table grid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Load a table-build description from a JSON string.
    ///
    /// # Errors
    /// Same as [`Self::from_file`] minus the I/O.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let src = config.source;
        let mut source = SourceModel {
            frequency_hz: src.frequency_hz,
            pulse_duration_ns: src.pulse_duration_ms * 1.0e6,
            emission_delay_ns: src.emission_delay_ms * 1.0e6,
            speed_min_m_per_s: src.speed_min_m_per_s,
            speed_max_m_per_s: src.speed_max_m_per_s,
        };
        if let Some([lo, hi]) = src.wavelength_range_angstrom {
            if !(lo > 0.0 && hi > lo) {
                return Err(Error::InvalidSource(format!(
                    "wavelength range [{lo}, {hi}] angstrom is empty or non-positive"
                )));
            }
            source = source.with_wavelength_range(lo, hi);
        }
        source.validate()?;

        let choppers: Vec<DiskChopper> = config
            .choppers
            .into_iter()
            .map(|c| {
                c.openings_deg.iter().fold(
                    DiskChopper::new(c.name, c.distance_m, c.frequency_hz, c.phase_deg),
                    |chopper, &[open, close]| chopper.with_opening(open, close),
                )
            })
            .collect();
        for chopper in &choppers {
            chopper.validate()?;
        }

        let (Some(distance_min_m), Some(distance_max_m)) =
            (config.table.distance_min_m, config.table.distance_max_m)
        else {
            return Err(Error::InvalidSettings(
                "table needs distance_min_m and distance_max_m".to_string(),
            ));
        };
        let table = TableSettings::new(distance_min_m, distance_max_m)
            .with_distance_resolution(config.table.distance_resolution_m)
            .with_time_resolution(config.table.time_resolution_us * 1.0e3)
            .with_error_threshold(config.table.error_threshold);
        table.validate()?;

        Ok(Self {
            source,
            choppers,
            table,
            simulation: SimulationSettings::new(config.simulation.neutrons, config.simulation.seed),
        })
    }

    /// The configured choppers ordered by distance.
    ///
    /// # Errors
    /// Returns the first chopper validation error.
    pub fn cascade(&self) -> Result<ChopperCascade> {
        ChopperCascade::new(self.choppers.clone())
    }

    /// Runs the simulation and builds the table in one go.
    ///
    /// # Errors
    /// Propagates simulation and table construction errors.
    pub fn build_table(&self) -> Result<LookupTable> {
        let neutrons = simulate(&self.source, &self.cascade()?, &self.simulation)?;
        build_lookup_table(&neutrons, self.source.period_ns(), &self.table)
    }
}
