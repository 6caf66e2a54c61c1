//! Time-of-flight lookup table.
//!
//! The table maps (flight distance, frame-relative arrival time) to the
//! mean time-of-flight of the simulated neutrons arriving there. Distances
//! are grid points; frame times are cells of width `time_step_ns` tiling
//! one pulse period. Each cell also keeps the TOF spread, the mean arrival
//! frame time and the neutron count. A cell is valid when it saw at least
//! one neutron and, if a threshold is configured, its relative spread
//! `std / mean` stays within it. Cells mixing neutrons of different source
//! frames have a large spread and are rejected.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::error::{Error, Result};
use crate::frame::fold_into_frame;
use crate::simulation::SimulatedNeutrons;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Grid and acceptance settings for building a table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    pub distance_min_m: f64,
    pub distance_max_m: f64,
    pub distance_resolution_m: f64,
    pub time_resolution_ns: f64,
    /// Maximum accepted `std / mean` per cell; `None` accepts every
    /// non-empty cell.
    pub error_threshold: Option<f64>,
}

impl TableSettings {
    /// Settings for `[distance_min_m, distance_max_m]` with 0.1 m, 0.1 ms
    /// resolution and a 10 % relative error threshold.
    #[must_use]
    pub fn new(distance_min_m: f64, distance_max_m: f64) -> Self {
        Self {
            distance_min_m,
            distance_max_m,
            distance_resolution_m: 0.1,
            time_resolution_ns: 100_000.0,
            error_threshold: Some(0.1),
        }
    }

    #[must_use]
    pub fn with_distance_resolution(mut self, resolution_m: f64) -> Self {
        self.distance_resolution_m = resolution_m;
        self
    }

    #[must_use]
    pub fn with_time_resolution(mut self, resolution_ns: f64) -> Self {
        self.time_resolution_ns = resolution_ns;
        self
    }

    #[must_use]
    pub fn with_error_threshold(mut self, threshold: Option<f64>) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Checks ranges and resolutions.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSettings`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        let finite = self.distance_min_m.is_finite() && self.distance_max_m.is_finite();
        if !finite || self.distance_min_m < 0.0 || self.distance_max_m < self.distance_min_m {
            return Err(Error::InvalidSettings(format!(
                "distance range [{}, {}] m is invalid",
                self.distance_min_m, self.distance_max_m
            )));
        }
        if !(self.distance_resolution_m.is_finite() && self.distance_resolution_m > 0.0) {
            return Err(Error::InvalidSettings(format!(
                "distance resolution must be positive, got {} m",
                self.distance_resolution_m
            )));
        }
        if !(self.time_resolution_ns.is_finite() && self.time_resolution_ns > 0.0) {
            return Err(Error::InvalidSettings(format!(
                "time resolution must be positive, got {} ns",
                self.time_resolution_ns
            )));
        }
        if let Some(threshold) = self.error_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(Error::InvalidSettings(format!(
                    "error threshold must be positive, got {threshold}"
                )));
            }
        }
        Ok(())
    }

    /// Distance grid: evenly spaced points including both ends, spaced at
    /// most `distance_resolution_m` apart.
    #[must_use]
    pub fn distance_grid(&self) -> Vec<f64> {
        let span = self.distance_max_m - self.distance_min_m;
        let intervals = ((span / self.distance_resolution_m) - 1e-9).ceil().max(0.0) as usize;
        if intervals == 0 {
            return vec![self.distance_min_m];
        }
        let step = span / intervals as f64;
        (0..=intervals)
            .map(|i| self.distance_min_m + step * i as f64)
            .collect()
    }
}

/// Summary of a table's cell validity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCoverage {
    pub total_cells: usize,
    pub valid_cells: usize,
    /// Cells no simulated neutron reached.
    pub empty_cells: usize,
    /// Non-empty cells over the error threshold.
    pub rejected_cells: usize,
}

impl TableCoverage {
    /// Fraction of all cells that are valid.
    #[must_use]
    pub fn fraction_valid(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            self.valid_cells as f64 / self.total_cells as f64
        }
    }
}

/// One cell of a table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableCell {
    pub distance_m: f64,
    /// Centre of the frame-time cell, ns.
    pub frame_time_ns: f64,
    pub tof_ns: f64,
    pub tof_std_ns: f64,
    /// Mean frame time of the neutrons in the cell, ns.
    pub mean_frame_time_ns: f64,
    pub count: u32,
    pub valid: bool,
}

/// Plain representation of a [`LookupTable`] for persistence.
///
/// Arrays are indexed `[distance, time]`. Invalid cells hold zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableParts {
    pub distance_min_m: f64,
    pub distance_step_m: f64,
    pub pulse_period_ns: f64,
    pub time_step_ns: f64,
    pub error_threshold: Option<f64>,
    pub neutrons_simulated: usize,
    pub tof_ns: Array2<f64>,
    pub tof_std_ns: Array2<f64>,
    pub frame_time_ns: Array2<f64>,
    pub counts: Array2<u32>,
    pub valid: Array2<bool>,
}

/// Immutable (distance, frame time) -> time-of-flight table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableParts", into = "TableParts")]
pub struct LookupTable {
    parts: TableParts,
}

impl TryFrom<TableParts> for LookupTable {
    type Error = Error;

    fn try_from(parts: TableParts) -> Result<Self> {
        Self::from_parts(parts)
    }
}

impl From<LookupTable> for TableParts {
    fn from(table: LookupTable) -> Self {
        table.parts
    }
}

impl LookupTable {
    /// Builds a table from its parts, checking shapes and values.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] for mismatched array shapes,
    /// non-positive steps, or cells that are valid without a finite TOF.
    pub fn from_parts(parts: TableParts) -> Result<Self> {
        let shape = parts.tof_ns.dim();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(Error::InvalidTable("table has no cells".to_string()));
        }
        let shapes_match = parts.tof_std_ns.dim() == shape
            && parts.frame_time_ns.dim() == shape
            && parts.counts.dim() == shape
            && parts.valid.dim() == shape;
        if !shapes_match {
            return Err(Error::InvalidTable("table arrays differ in shape".to_string()));
        }
        let steps_ok = parts.pulse_period_ns.is_finite()
            && parts.pulse_period_ns > 0.0
            && parts.time_step_ns > 0.0
            && parts.distance_min_m.is_finite()
            && parts.distance_step_m.is_finite()
            && (parts.distance_step_m > 0.0 || shape.0 == 1);
        if !steps_ok {
            return Err(Error::InvalidTable(
                "distance step, time step and period must be positive".to_string(),
            ));
        }
        let expected_cells = (parts.pulse_period_ns / parts.time_step_ns).round() as usize;
        if expected_cells != shape.1 {
            return Err(Error::InvalidTable(format!(
                "{} time cells do not tile a {} ns period at {} ns",
                shape.1, parts.pulse_period_ns, parts.time_step_ns
            )));
        }
        let bad_cell = ndarray::Zip::from(&parts.valid)
            .and(&parts.tof_ns)
            .and(&parts.frame_time_ns)
            .fold(false, |bad, &valid, &tof, &frame| {
                bad || (valid && !(tof.is_finite() && frame.is_finite()))
            });
        if bad_cell {
            return Err(Error::InvalidTable(
                "valid cell without a finite time-of-flight".to_string(),
            ));
        }
        Ok(Self { parts })
    }

    /// Read-only access to the table arrays and metadata.
    #[must_use]
    pub fn parts(&self) -> &TableParts {
        &self.parts
    }

    #[must_use]
    pub fn into_parts(self) -> TableParts {
        self.parts
    }

    #[must_use]
    pub fn n_distances(&self) -> usize {
        self.parts.tof_ns.dim().0
    }

    #[must_use]
    pub fn n_times(&self) -> usize {
        self.parts.tof_ns.dim().1
    }

    #[must_use]
    pub fn pulse_period_ns(&self) -> f64 {
        self.parts.pulse_period_ns
    }

    #[must_use]
    pub fn time_step_ns(&self) -> f64 {
        self.parts.time_step_ns
    }

    #[must_use]
    pub fn distance_step_m(&self) -> f64 {
        self.parts.distance_step_m
    }

    #[must_use]
    pub fn error_threshold(&self) -> Option<f64> {
        self.parts.error_threshold
    }

    /// Number of neutrons simulated to build the table.
    #[must_use]
    pub fn neutrons_simulated(&self) -> usize {
        self.parts.neutrons_simulated
    }

    #[must_use]
    pub fn distance_at(&self, index: usize) -> f64 {
        self.parts.distance_min_m + self.parts.distance_step_m * index as f64
    }

    /// Distance grid points in m.
    #[must_use]
    pub fn distances(&self) -> Vec<f64> {
        (0..self.n_distances()).map(|i| self.distance_at(i)).collect()
    }

    /// `(first, last)` distance grid point in m.
    #[must_use]
    pub fn distance_range(&self) -> (f64, f64) {
        (self.distance_at(0), self.distance_at(self.n_distances() - 1))
    }

    /// Centre of a frame-time cell in ns.
    #[must_use]
    pub fn time_centre(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.parts.time_step_ns
    }

    /// Frame-time cell containing a frame-relative time.
    #[must_use]
    pub fn time_index(&self, frame_time_ns: f64) -> usize {
        let t = fold_into_frame(frame_time_ns, self.parts.pulse_period_ns);
        ((t / self.parts.time_step_ns) as usize).min(self.n_times() - 1)
    }

    /// Whether cell `(distance, time)` is valid; out-of-range is invalid.
    #[must_use]
    pub fn is_valid(&self, distance_index: usize, time_index: usize) -> bool {
        self.parts
            .valid
            .get((distance_index, time_index))
            .copied()
            .unwrap_or(false)
    }

    /// Mean TOF of a valid cell.
    #[must_use]
    pub fn tof(&self, distance_index: usize, time_index: usize) -> Option<f64> {
        if self.is_valid(distance_index, time_index) {
            Some(self.parts.tof_ns[(distance_index, time_index)])
        } else {
            None
        }
    }

    /// Mean TOF of a valid cell and the mean frame time it was observed at.
    #[must_use]
    pub fn tof_at_frame_time(&self, distance_index: usize, time_index: usize) -> Option<(f64, f64)> {
        let index = (distance_index, time_index);
        self.tof(distance_index, time_index)
            .map(|tof| (tof, self.parts.frame_time_ns[index]))
    }

    #[must_use]
    pub fn cell(&self, distance_index: usize, time_index: usize) -> Option<TableCell> {
        let index = (distance_index, time_index);
        Some(TableCell {
            distance_m: self.distance_at(distance_index),
            frame_time_ns: self.time_centre(time_index),
            tof_ns: *self.parts.tof_ns.get(index)?,
            tof_std_ns: *self.parts.tof_std_ns.get(index)?,
            mean_frame_time_ns: *self.parts.frame_time_ns.get(index)?,
            count: *self.parts.counts.get(index)?,
            valid: *self.parts.valid.get(index)?,
        })
    }

    /// Counts valid, empty and rejected cells.
    #[must_use]
    pub fn coverage(&self) -> TableCoverage {
        let mut coverage = TableCoverage {
            total_cells: self.parts.valid.len(),
            ..TableCoverage::default()
        };
        for (&valid, &count) in self.parts.valid.iter().zip(self.parts.counts.iter()) {
            if valid {
                coverage.valid_cells += 1;
            } else if count == 0 {
                coverage.empty_cells += 1;
            } else {
                coverage.rejected_cells += 1;
            }
        }
        coverage
    }
}

/// Running TOF mean and variance (Welford) and mean frame time of one cell.
#[derive(Clone, Copy, Debug, Default)]
struct CellAccumulator {
    count: u32,
    mean: f64,
    m2: f64,
    frame_mean: f64,
}

impl CellAccumulator {
    #[inline]
    fn push(&mut self, tof: f64, frame_time: f64) {
        self.count += 1;
        let n = f64::from(self.count);
        let delta = tof - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (tof - self.mean);
        self.frame_mean += (frame_time - self.frame_mean) / n;
    }

    fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / f64::from(self.count)).sqrt()
        }
    }
}

/// Compresses simulated neutrons into a lookup table.
///
/// # Errors
/// Returns an error for invalid settings or period, or when no neutron
/// survived the choppers.
pub fn build_lookup_table(
    neutrons: &SimulatedNeutrons,
    pulse_period_ns: f64,
    settings: &TableSettings,
) -> Result<LookupTable> {
    settings.validate()?;
    if !(pulse_period_ns.is_finite() && pulse_period_ns > 0.0) {
        return Err(Error::InvalidSettings(format!(
            "pulse period must be positive, got {pulse_period_ns} ns"
        )));
    }
    if neutrons.is_empty() {
        return Err(Error::NoSurvivors {
            simulated: neutrons.simulated,
        });
    }

    let distances = settings.distance_grid();
    let n_times = (pulse_period_ns / settings.time_resolution_ns).ceil().max(1.0) as usize;
    let time_step_ns = pulse_period_ns / n_times as f64;
    let distance_step_m = if distances.len() > 1 {
        distances[1] - distances[0]
    } else {
        0.0
    };

    let rows: Vec<Vec<CellAccumulator>> = distances
        .par_iter()
        .map(|&distance| {
            let mut row = vec![CellAccumulator::default(); n_times];
            for (&emission, &slowness) in neutrons
                .emission_time_ns
                .iter()
                .zip(&neutrons.slowness_ns_per_m)
            {
                let tof = distance * slowness;
                let frame_time = fold_into_frame(emission + tof, pulse_period_ns);
                let j = ((frame_time / time_step_ns) as usize).min(n_times - 1);
                row[j].push(tof, frame_time);
            }
            row
        })
        .collect();

    let shape = (distances.len(), n_times);
    let mut tof_ns = Array2::<f64>::zeros(shape);
    let mut tof_std_ns = Array2::<f64>::zeros(shape);
    let mut frame_time_ns = Array2::<f64>::zeros(shape);
    let mut counts = Array2::<u32>::zeros(shape);
    let mut valid = Array2::<bool>::from_elem(shape, false);
    for (i, row) in rows.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            if cell.count == 0 {
                continue;
            }
            let std = cell.std();
            tof_ns[(i, j)] = cell.mean;
            tof_std_ns[(i, j)] = std;
            frame_time_ns[(i, j)] = cell.frame_mean;
            counts[(i, j)] = cell.count;
            valid[(i, j)] = settings
                .error_threshold
                .map_or(true, |threshold| std <= threshold * cell.mean);
        }
    }

    let table = LookupTable::from_parts(TableParts {
        distance_min_m: distances[0],
        distance_step_m,
        pulse_period_ns,
        time_step_ns,
        error_threshold: settings.error_threshold,
        neutrons_simulated: neutrons.simulated,
        tof_ns,
        tof_std_ns,
        frame_time_ns,
        counts,
        valid,
    })?;

    let coverage = table.coverage();
    log::info!(
        "lookup table {}x{}: {} valid, {} empty, {} over threshold ({:.1}% valid)",
        table.n_distances(),
        table.n_times(),
        coverage.valid_cells,
        coverage.empty_cells,
        coverage.rejected_cells,
        100.0 * coverage.fraction_valid()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_neutron(emission: f64, slowness: f64) -> SimulatedNeutrons {
        SimulatedNeutrons {
            emission_time_ns: vec![emission],
            slowness_ns_per_m: vec![slowness],
            simulated: 1,
        }
    }

    #[test]
    fn test_distance_grid_includes_ends() {
        let grid = TableSettings::new(10.0, 11.0).distance_grid();
        assert_eq!(grid.len(), 11);
        assert_relative_eq!(grid[0], 10.0);
        assert_relative_eq!(grid[10], 11.0, epsilon = 1e-12);

        let coarse = TableSettings::new(10.0, 10.25)
            .with_distance_resolution(0.1)
            .distance_grid();
        assert_eq!(coarse.len(), 4);

        assert_eq!(TableSettings::new(5.0, 5.0).distance_grid(), vec![5.0]);
    }

    #[test]
    fn test_single_neutron_fills_one_cell_per_distance() {
        // 1 ms/m from t0 = 0.55 ms, 1 ms period, 0.1 ms cells.
        let neutrons = single_neutron(0.55e6, 1.0e6);
        let settings = TableSettings::new(10.0, 10.2).with_time_resolution(1.0e5);
        let table = build_lookup_table(&neutrons, 1.0e6, &settings).unwrap();

        assert_eq!(table.n_distances(), 3);
        assert_eq!(table.n_times(), 10);
        // At 10 m: tof 10 ms, arrival 10.55 ms, frame time 0.55 ms -> cell 5.
        assert_relative_eq!(table.tof(0, 5).unwrap(), 1.0e7, max_relative = 1e-12);
        // At 10.1 m: tof 10.1 ms, frame time 0.65 ms -> cell 6.
        assert_relative_eq!(table.tof(1, 6).unwrap(), 1.01e7, max_relative = 1e-12);
        let coverage = table.coverage();
        assert_eq!(coverage.valid_cells, 3);
        assert_eq!(coverage.empty_cells, 27);
        assert_eq!(table.neutrons_simulated(), 1);
    }

    #[test]
    fn test_frame_overlap_is_rejected() {
        // Two neutrons land in the same cell one period apart.
        let neutrons = SimulatedNeutrons {
            emission_time_ns: vec![0.0, 0.0],
            slowness_ns_per_m: vec![0.1e6, 0.2e6],
            simulated: 2,
        };
        let settings = TableSettings::new(10.0, 10.0).with_time_resolution(1.0e5);
        let table = build_lookup_table(&neutrons, 1.0e6, &settings).unwrap();
        let coverage = table.coverage();
        assert_eq!(coverage.valid_cells, 0);
        assert_eq!(coverage.rejected_cells, 1);

        let lenient = settings.with_error_threshold(None);
        let table = build_lookup_table(&neutrons, 1.0e6, &lenient).unwrap();
        assert_eq!(table.coverage().valid_cells, 1);
    }

    #[test]
    fn test_no_survivors() {
        let neutrons = SimulatedNeutrons {
            simulated: 500,
            ..SimulatedNeutrons::default()
        };
        let result = build_lookup_table(&neutrons, 1.0e6, &TableSettings::new(1.0, 2.0));
        assert!(matches!(result, Err(Error::NoSurvivors { simulated: 500 })));
    }

    #[test]
    fn test_from_parts_rejects_shape_mismatch() {
        let table = build_lookup_table(
            &single_neutron(0.0, 1.0e6),
            1.0e6,
            &TableSettings::new(1.0, 2.0),
        )
        .unwrap();
        let mut parts = table.into_parts();
        parts.counts = Array2::zeros((1, 1));
        assert!(matches!(
            LookupTable::from_parts(parts),
            Err(Error::InvalidTable(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_cells() {
        let neutrons = SimulatedNeutrons {
            emission_time_ns: vec![0.0, 1.0e5, 2.0e5],
            slowness_ns_per_m: vec![0.25e6, 0.26e6, 0.27e6],
            simulated: 10,
        };
        let table =
            build_lookup_table(&neutrons, 1.0e6, &TableSettings::new(2.0, 3.0)).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: LookupTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
