//! Structure of Arrays (`SoA`) batches for raw and converted events.
//!
//! Raw detector and monitor data arrive as [`EventBatch`]es with a
//! frame-relative time per event. Histogrammed data uses the same layout
//! with one entry per bin: the bin centre as time and the count as weight.

use crate::error::{Error, Result};
use crate::geometry::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Raw events in frame-relative time.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventBatch {
    /// Detector pixel identifier (ignored for monitors).
    pub pixel_id: Vec<u32>,
    /// Time since the most recent source pulse, ns.
    pub frame_time_ns: Vec<f64>,
    /// Event weight (1 for raw events, counts for histogram bins).
    pub weight: Vec<f32>,
}

impl EventBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pixel_id: Vec::with_capacity(capacity),
            frame_time_ns: Vec::with_capacity(capacity),
            weight: Vec::with_capacity(capacity),
        }
    }

    /// Builds a batch from a histogram of one pixel (or monitor).
    ///
    /// # Errors
    /// Returns an error unless there is exactly one more edge than counts.
    pub fn from_histogram(pixel_id: u32, edges_ns: &[f64], counts: &[f32]) -> Result<Self> {
        if edges_ns.len() != counts.len() + 1 {
            return Err(Error::InvalidHistogram {
                counts: counts.len(),
                edges: edges_ns.len(),
            });
        }
        let mut batch = Self::with_capacity(counts.len());
        for (edges, &count) in edges_ns.windows(2).zip(counts) {
            batch.push(pixel_id, 0.5 * (edges[0] + edges[1]), count);
        }
        Ok(batch)
    }

    /// Returns the number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frame_time_ns.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame_time_ns.is_empty()
    }

    /// Clears all columns.
    pub fn clear(&mut self) {
        self.pixel_id.clear();
        self.frame_time_ns.clear();
        self.weight.clear();
    }

    /// Appends all events from another batch to this one.
    pub fn append(&mut self, other: &EventBatch) {
        self.pixel_id.extend_from_slice(&other.pixel_id);
        self.frame_time_ns.extend_from_slice(&other.frame_time_ns);
        self.weight.extend_from_slice(&other.weight);
    }

    /// Pushes a single event.
    pub fn push(&mut self, pixel_id: u32, frame_time_ns: f64, weight: f32) {
        self.pixel_id.push(pixel_id);
        self.frame_time_ns.push(frame_time_ns);
        self.weight.push(weight);
    }

    /// Checks that all columns have the same length.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] naming the first short column.
    pub fn validate(&self) -> Result<()> {
        let expected = self.frame_time_ns.len();
        check_len("pixel_id", expected, self.pixel_id.len())?;
        check_len("weight", expected, self.weight.len())
    }
}

/// Monitor events converted to time-of-flight and wavelength.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitorBatch {
    pub tof_ns: Vec<f64>,
    pub wavelength_angstrom: Vec<f64>,
    pub weight: Vec<f32>,
}

impl MonitorBatch {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tof_ns: Vec::with_capacity(capacity),
            wavelength_angstrom: Vec::with_capacity(capacity),
            weight: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tof_ns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tof_ns.is_empty()
    }

    pub fn push(&mut self, tof_ns: f64, wavelength_angstrom: f64, weight: f32) {
        self.tof_ns.push(tof_ns);
        self.wavelength_angstrom.push(wavelength_angstrom);
        self.weight.push(weight);
    }
}

/// Detector events converted to energy and momentum transfer.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvertedBatch {
    /// Index of the source event in its [`EventBatch`].
    pub event_index: Vec<u64>,
    pub pixel_id: Vec<u32>,
    pub weight: Vec<f32>,
    /// Time-of-flight from source to sample, ns.
    pub sample_tof_ns: Vec<f64>,
    pub incident_wavelength_angstrom: Vec<f64>,
    pub incident_energy_mev: Vec<f64>,
    pub final_energy_mev: Vec<f64>,
    /// Incident minus final energy, meV.
    pub energy_transfer_mev: Vec<f64>,
    /// Momentum transfer in the laboratory frame, 1/angstrom.
    pub q_lab: Vec<Vec3>,
    /// Momentum transfer in the sample-table frame, 1/angstrom.
    pub q_sample_table: Vec<Vec3>,
    /// Sample-table angle of the run, degrees.
    pub a3_deg: Vec<f64>,
    /// Lab scattering angle of the pixel, degrees.
    pub a4_deg: Vec<f64>,
}

/// One converted detector event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertedEvent {
    pub event_index: u64,
    pub pixel_id: u32,
    pub weight: f32,
    pub sample_tof_ns: f64,
    pub incident_wavelength_angstrom: f64,
    pub incident_energy_mev: f64,
    pub final_energy_mev: f64,
    pub energy_transfer_mev: f64,
    pub q_lab: Vec3,
    pub q_sample_table: Vec3,
    pub a3_deg: f64,
    pub a4_deg: f64,
}

impl ConvertedBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            event_index: Vec::with_capacity(capacity),
            pixel_id: Vec::with_capacity(capacity),
            weight: Vec::with_capacity(capacity),
            sample_tof_ns: Vec::with_capacity(capacity),
            incident_wavelength_angstrom: Vec::with_capacity(capacity),
            incident_energy_mev: Vec::with_capacity(capacity),
            final_energy_mev: Vec::with_capacity(capacity),
            energy_transfer_mev: Vec::with_capacity(capacity),
            q_lab: Vec::with_capacity(capacity),
            q_sample_table: Vec::with_capacity(capacity),
            a3_deg: Vec::with_capacity(capacity),
            a4_deg: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.event_index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_index.is_empty()
    }

    pub fn push(&mut self, event: &ConvertedEvent) {
        self.event_index.push(event.event_index);
        self.pixel_id.push(event.pixel_id);
        self.weight.push(event.weight);
        self.sample_tof_ns.push(event.sample_tof_ns);
        self.incident_wavelength_angstrom
            .push(event.incident_wavelength_angstrom);
        self.incident_energy_mev.push(event.incident_energy_mev);
        self.final_energy_mev.push(event.final_energy_mev);
        self.energy_transfer_mev.push(event.energy_transfer_mev);
        self.q_lab.push(event.q_lab);
        self.q_sample_table.push(event.q_sample_table);
        self.a3_deg.push(event.a3_deg);
        self.a4_deg.push(event.a4_deg);
    }

    /// Appends all events from another batch to this one.
    pub fn append(&mut self, other: &ConvertedBatch) {
        self.event_index.extend_from_slice(&other.event_index);
        self.pixel_id.extend_from_slice(&other.pixel_id);
        self.weight.extend_from_slice(&other.weight);
        self.sample_tof_ns.extend_from_slice(&other.sample_tof_ns);
        self.incident_wavelength_angstrom
            .extend_from_slice(&other.incident_wavelength_angstrom);
        self.incident_energy_mev
            .extend_from_slice(&other.incident_energy_mev);
        self.final_energy_mev.extend_from_slice(&other.final_energy_mev);
        self.energy_transfer_mev
            .extend_from_slice(&other.energy_transfer_mev);
        self.q_lab.extend_from_slice(&other.q_lab);
        self.q_sample_table.extend_from_slice(&other.q_sample_table);
        self.a3_deg.extend_from_slice(&other.a3_deg);
        self.a4_deg.extend_from_slice(&other.a4_deg);
    }

    /// Returns the event at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ConvertedEvent> {
        if index >= self.len() {
            return None;
        }
        Some(ConvertedEvent {
            event_index: self.event_index[index],
            pixel_id: self.pixel_id[index],
            weight: self.weight[index],
            sample_tof_ns: self.sample_tof_ns[index],
            incident_wavelength_angstrom: self.incident_wavelength_angstrom[index],
            incident_energy_mev: self.incident_energy_mev[index],
            final_energy_mev: self.final_energy_mev[index],
            energy_transfer_mev: self.energy_transfer_mev[index],
            q_lab: self.q_lab[index],
            q_sample_table: self.q_sample_table[index],
            a3_deg: self.a3_deg[index],
            a4_deg: self.a4_deg[index],
        })
    }

    /// Iterates over the events in order.
    pub fn iter(&self) -> impl Iterator<Item = ConvertedEvent> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

fn check_len(column: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            column,
            expected,
            actual,
        })
    }
}
