//! Frame unwrapping through a time-of-flight lookup table.
//!
//! A query `(distance, frame time)` is answered from the table cell holding
//! it. When that cell is valid the result blends the four surrounding grid
//! nodes (distance grid points by frame-time cell centres), weighting each
//! bilinearly, skipping invalid nodes and renormalising. Every node
//! contributes its mean TOF shifted by the query's offset from the mean
//! frame time of the node's neutrons, since at fixed distance a later
//! arrival means a longer flight. When the containing cell is invalid the
//! nearest valid cell among its eight neighbours is used with the same
//! shift; otherwise the frame cannot be resolved.
//!
//! Frame time is periodic: the neighbour before the first time cell is the
//! last cell of the previous frame, and the one after the last cell is the
//! first cell of the next frame. Such nodes are shifted by one pulse period.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]

use crate::error::UnwrapError;
use crate::frame::fold_into_frame;
use crate::lut::LookupTable;
use rayon::prelude::*;
use std::sync::Arc;

/// Tolerance on the distance range for rounding in grid construction.
const DISTANCE_EPSILON_M: f64 = 1.0e-9;

/// Shared, read-only frame unwrapper.
#[derive(Clone, Debug)]
pub struct FrameUnwrapper {
    table: Arc<LookupTable>,
}

impl FrameUnwrapper {
    #[must_use]
    pub fn new(table: Arc<LookupTable>) -> Self {
        Self { table }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<LookupTable> {
        &self.table
    }

    #[must_use]
    pub fn pulse_period_ns(&self) -> f64 {
        self.table.pulse_period_ns()
    }

    /// Time-of-flight in ns of a neutron recorded `frame_time_ns` after a
    /// pulse at `distance_m` from the source.
    ///
    /// # Errors
    /// Returns [`UnwrapError::DistanceOutOfRange`] outside the table grid
    /// and [`UnwrapError::UnresolvableFrame`] where no valid cell is close.
    pub fn unwrap(&self, distance_m: f64, frame_time_ns: f64) -> Result<f64, UnwrapError> {
        if !(distance_m.is_finite() && frame_time_ns.is_finite()) {
            return Err(UnwrapError::NonFinite);
        }
        let table = &*self.table;
        let (min_m, max_m) = table.distance_range();
        if distance_m < min_m - DISTANCE_EPSILON_M || distance_m > max_m + DISTANCE_EPSILON_M {
            return Err(UnwrapError::DistanceOutOfRange {
                distance_m,
                min_m,
                max_m,
            });
        }

        let t = fold_into_frame(frame_time_ns, table.pulse_period_ns());
        let n_d = table.n_distances();
        let u = if n_d > 1 {
            ((distance_m - min_m) / table.distance_step_m()).clamp(0.0, (n_d - 1) as f64)
        } else {
            0.0
        };
        let i_c = (u.round() as usize).min(n_d - 1);
        let j_c = table.time_index(t);

        if table.is_valid(i_c, j_c) {
            Ok(self.interpolate(u, t, i_c, j_c))
        } else {
            self.nearest_neighbour(t, i_c, j_c)
                .ok_or(UnwrapError::UnresolvableFrame {
                    distance_m,
                    frame_time_ns,
                })
        }
    }

    /// Unwraps many frame times at one distance in parallel.
    #[must_use]
    pub fn unwrap_batch(&self, distance_m: f64, frame_times_ns: &[f64]) -> Vec<Result<f64, UnwrapError>> {
        frame_times_ns
            .par_iter()
            .map(|&t| self.unwrap(distance_m, t))
            .collect()
    }

    /// TOF of node `(i, j)` shifted to the query time; `j` may lie one
    /// frame before or after the table.
    #[inline]
    fn shifted(&self, i: usize, j: i64, t: f64) -> Option<f64> {
        let (j, offset_ns) = self.wrap_time_index(j);
        self.table
            .tof_at_frame_time(i, j)
            .map(|(tof, frame_time)| tof + (t - (frame_time + offset_ns)))
    }

    /// Time cell folded into the table and the frame-time offset of its frame.
    #[inline]
    fn wrap_time_index(&self, j: i64) -> (usize, f64) {
        let n = self.table.n_times() as i64;
        let wrapped = j.rem_euclid(n);
        let frames = (j - wrapped) / n;
        (wrapped as usize, frames as f64 * self.table.pulse_period_ns())
    }

    fn interpolate(&self, u: f64, t: f64, i_c: usize, j_c: usize) -> f64 {
        let table = &*self.table;
        let n_d = table.n_distances();
        let i0 = (u.floor() as usize).min(n_d.saturating_sub(2));
        let i1 = (i0 + 1).min(n_d - 1);
        let wi = if i1 > i0 { u - i0 as f64 } else { 0.0 };

        let v = t / table.time_step_ns() - 0.5;
        let j0 = v.floor() as i64;
        let wj = v - j0 as f64;

        let nodes = [
            (i0, j0, (1.0 - wi) * (1.0 - wj)),
            (i1, j0, wi * (1.0 - wj)),
            (i0, j0 + 1, (1.0 - wi) * wj),
            (i1, j0 + 1, wi * wj),
        ];

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (i, j, w) in nodes {
            if w <= 0.0 {
                continue;
            }
            if let Some(value) = self.shifted(i, j, t) {
                sum += w * value;
                weight += w;
            }
        }

        if weight > 1.0e-12 {
            sum / weight
        } else {
            // Only zero-weight nodes around: fall back to the containing cell.
            self.shifted(i_c, j_c as i64, t).unwrap_or(f64::NAN)
        }
    }

    /// Nearest valid cell at Chebyshev distance 1, ties broken by Euclidean
    /// index distance and then by `(distance, time)` index.
    fn nearest_neighbour(&self, t: f64, i_c: usize, j_c: usize) -> Option<f64> {
        let table = &*self.table;
        let mut best: Option<(i64, usize, i64)> = None;
        for di in -1i64..=1 {
            for dj in -1i64..=1 {
                if di == 0 && dj == 0 {
                    continue;
                }
                let i = i_c as i64 + di;
                let j = j_c as i64 + dj;
                if i < 0 {
                    continue;
                }
                let i = i as usize;
                if !table.is_valid(i, self.wrap_time_index(j).0) {
                    continue;
                }
                let candidate = (di * di + dj * dj, i, j);
                if best.map_or(true, |b| candidate < b) {
                    best = Some(candidate);
                }
            }
        }
        best.and_then(|(_, i, j)| self.shifted(i, j, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::{build_lookup_table, TableParts, TableSettings};
    use crate::simulation::SimulatedNeutrons;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// 2 distances x 4 time cells of 250 ns, period 1000 ns.
    fn small_table(valid: [[bool; 4]; 2]) -> FrameUnwrapper {
        let mut tof = Array2::zeros((2, 4));
        let mut frame = Array2::zeros((2, 4));
        let mut mask = Array2::from_elem((2, 4), false);
        let mut counts = Array2::zeros((2, 4));
        for i in 0..2 {
            for j in 0..4 {
                if valid[i][j] {
                    // exact TOF = 10_000 * (i + 1) + frame-time centre
                    let centre = 125.0 + 250.0 * j as f64;
                    tof[(i, j)] = 10_000.0 * (i as f64 + 1.0) + centre;
                    frame[(i, j)] = centre;
                    mask[(i, j)] = true;
                    counts[(i, j)] = 1;
                }
            }
        }
        let table = LookupTable::from_parts(TableParts {
            distance_min_m: 1.0,
            distance_step_m: 1.0,
            pulse_period_ns: 1_000.0,
            time_step_ns: 250.0,
            error_threshold: None,
            neutrons_simulated: 8,
            tof_ns: tof,
            tof_std_ns: Array2::zeros((2, 4)),
            frame_time_ns: frame,
            counts,
            valid: mask,
        })
        .unwrap();
        FrameUnwrapper::new(Arc::new(table))
    }

    /// Same cells `(time index, tof, mean frame time)` at both distances,
    /// 10 us apart.
    fn table_from_cells(cells: &[(usize, f64, f64)]) -> FrameUnwrapper {
        let mut tof = Array2::zeros((2, 4));
        let mut frame = Array2::zeros((2, 4));
        let mut mask = Array2::from_elem((2, 4), false);
        let mut counts = Array2::zeros((2, 4));
        for i in 0..2 {
            for &(j, cell_tof, frame_time) in cells {
                tof[(i, j)] = cell_tof + 10_000.0 * i as f64;
                frame[(i, j)] = frame_time;
                mask[(i, j)] = true;
                counts[(i, j)] = 1;
            }
        }
        let table = LookupTable::from_parts(TableParts {
            distance_min_m: 1.0,
            distance_step_m: 1.0,
            pulse_period_ns: 1_000.0,
            time_step_ns: 250.0,
            error_threshold: None,
            neutrons_simulated: 8,
            tof_ns: tof,
            tof_std_ns: Array2::zeros((2, 4)),
            frame_time_ns: frame,
            counts,
            valid: mask,
        })
        .unwrap();
        FrameUnwrapper::new(Arc::new(table))
    }

    #[test]
    fn test_neighbour_across_frame_start() {
        // Only the last cell is valid; a query early in the frame continues
        // the band of the previous frame.
        let unwrapper = table_from_cells(&[(3, 10_875.0, 875.0)]);
        let tof = unwrapper.unwrap(1.0, 50.0).unwrap();
        assert_relative_eq!(tof, 11_050.0, epsilon = 1e-9);
    }

    #[test]
    fn test_interpolation_wraps_frame_edges() {
        // Cell 0 holds arrivals one period after cell 3's pulse.
        let unwrapper = table_from_cells(&[(0, 11_125.0, 125.0), (3, 10_885.0, 875.0)]);
        // t = 10 ns: 0.46 of the wrapped last cell (11_020) and 0.54 of
        // cell 0 (11_010).
        let tof = unwrapper.unwrap(1.0, 10.0).unwrap();
        assert_relative_eq!(tof, 0.46 * 11_020.0 + 0.54 * 11_010.0, epsilon = 1e-6);
        // t = 990 ns: 0.54 of cell 3 (11_000) and 0.46 of the next frame's
        // cell 0 (10_990).
        let tof = unwrapper.unwrap(1.0, 990.0).unwrap();
        assert_relative_eq!(tof, 0.54 * 11_000.0 + 0.46 * 10_990.0, epsilon = 1e-6);
    }

    #[test]
    fn test_interpolation_on_linear_table_is_exact() {
        let unwrapper = small_table([[true; 4]; 2]);
        // At 1 m every node agrees on 10_000 + t.
        assert_relative_eq!(unwrapper.unwrap(1.0, 300.0).unwrap(), 10_300.0, epsilon = 1e-9);
        // Half way between distances blends 10_000 and 20_000.
        assert_relative_eq!(unwrapper.unwrap(1.5, 300.0).unwrap(), 15_300.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frame_time_is_folded() {
        let unwrapper = small_table([[true; 4]; 2]);
        let direct = unwrapper.unwrap(1.0, 300.0).unwrap();
        let folded = unwrapper.unwrap(1.0, 2_300.0).unwrap();
        assert_relative_eq!(direct, folded, epsilon = 1e-9);
    }

    #[test]
    fn test_unwrap_is_idempotent() {
        let unwrapper = small_table([[true, false, true, true], [true, true, false, true]]);
        for &(d, t) in &[(1.0, 10.0), (1.3, 400.0), (2.0, 999.0), (1.7, 610.0)] {
            let first = unwrapper.unwrap(d, t);
            let second = unwrapper.unwrap(d, t);
            match (first, second) {
                (Ok(a), Ok(b)) => assert_eq!(a.to_bits(), b.to_bits()),
                (a, b) => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn test_invalid_cell_uses_nearest_neighbour() {
        // Cell (0, 1) invalid; its closest valid neighbours are (0, 0),
        // (0, 2) and (1, 1) at index distance 1; (0, 0) wins the tie.
        let unwrapper = small_table([[true, false, true, true], [true, true, true, true]]);
        let tof = unwrapper.unwrap(1.0, 300.0).unwrap();
        assert_relative_eq!(tof, 10_300.0, epsilon = 1e-9);
    }

    #[test]
    fn test_isolated_invalid_region_is_unresolvable() {
        // Neither neighbour of cell 0, including the wrapped last cell, is valid.
        let unwrapper = small_table([[false, false, true, false], [false, false, true, false]]);
        assert!(matches!(
            unwrapper.unwrap(1.0, 100.0),
            Err(UnwrapError::UnresolvableFrame { .. })
        ));
    }

    #[test]
    fn test_distance_out_of_range() {
        let unwrapper = small_table([[true; 4]; 2]);
        assert!(matches!(
            unwrapper.unwrap(2.5, 100.0),
            Err(UnwrapError::DistanceOutOfRange { .. })
        ));
        assert!(matches!(
            unwrapper.unwrap(0.5, 100.0),
            Err(UnwrapError::DistanceOutOfRange { .. })
        ));
        assert_eq!(unwrapper.unwrap(f64::NAN, 1.0), Err(UnwrapError::NonFinite));
    }

    #[test]
    fn test_unwrap_recovers_simulated_tof() {
        // Monochromatic neutrons with a 100 ns pulse at 2 ms/m.
        let n = 200;
        let neutrons = SimulatedNeutrons {
            emission_time_ns: (0..n).map(|k| f64::from(k) * 0.5).collect(),
            slowness_ns_per_m: vec![2.0e6; n as usize],
            simulated: n as usize,
        };
        let settings = TableSettings::new(10.0, 12.0)
            .with_distance_resolution(0.5)
            .with_time_resolution(50_000.0);
        let table = build_lookup_table(&neutrons, 1.0e7, &settings).unwrap();
        let unwrapper = FrameUnwrapper::new(Arc::new(table));

        // Emitted at 50 ns, flight 11 m -> tof 22 ms, frame time 2.00005 ms.
        // The only valid node holds neutrons arriving 0.25 ns earlier on average.
        let frame = fold_into_frame(50.0 + 22.0e6, 1.0e7);
        let tof = unwrapper.unwrap(11.0, frame).unwrap();
        assert_relative_eq!(tof, 22.0e6, max_relative = 1e-5);

        let batch = unwrapper.unwrap_batch(11.0, &[frame, frame]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], Ok(tof));
    }
}
