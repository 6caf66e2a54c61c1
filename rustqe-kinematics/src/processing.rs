//! Event conversion: frame time to energy and momentum transfer.
//!
//! Events are converted in parallel and collected in input order. An event
//! that cannot be converted is dropped and counted in the bank's
//! [`RejectionReport`]; a bank that loses every event is an error carrying
//! that report.

use crate::error::{KinematicsError, Result};
use crate::geometry::{PixelKinematics, RotationState, SecondaryGeometry};
use crate::primary::PrimaryBeamline;
use crate::report::{RejectionReason, RejectionReport};
use crate::transfer::{energy_transfer, momentum_transfer, to_sample_table};
use rayon::prelude::*;
use rustqe_core::units::wavelength_from_tof;
use rustqe_core::{BankId, ConvertedBatch, ConvertedEvent, EventBatch, MonitorBatch};
use rustqe_tof::{fold_into_frame, FrameUnwrapper};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How the time-of-flight at the sample is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeAtSample {
    /// Shift the detector frame time back by the secondary flight time and
    /// unwrap at the sample distance.
    #[default]
    FrameShift,
    /// Unwrap at the full source-to-detector distance, then subtract the
    /// secondary flight time.
    DetectorUnwrap,
}

/// Options of a conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub time_at_sample: TimeAtSample,
}

impl ConversionSettings {
    #[must_use]
    pub fn with_time_at_sample(mut self, mode: TimeAtSample) -> Self {
        self.time_at_sample = mode;
        self
    }
}

/// Converted events of one bank and the events it dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BankConversion {
    pub events: ConvertedBatch,
    pub report: RejectionReport,
    /// Angles the bank was converted with.
    pub rotation: RotationState,
}

/// Conversions of every bank of one run, keyed by bank id.
#[derive(Clone, Debug, Default)]
pub struct RunConversion {
    pub banks: BTreeMap<BankId, Arc<BankConversion>>,
}

impl RunConversion {
    /// All converted events in bank order.
    #[must_use]
    pub fn events(&self) -> ConvertedBatch {
        let total = self.banks.values().map(|b| b.events.len()).sum();
        let mut out = ConvertedBatch::with_capacity(total);
        for bank in self.banks.values() {
            out.append(&bank.events);
        }
        out
    }

    /// Rejections summed over banks.
    #[must_use]
    pub fn report(&self) -> RejectionReport {
        let mut report = RejectionReport::new();
        for bank in self.banks.values() {
            report.merge(&bank.report);
        }
        report
    }

    /// Angles of the run, taken from its first bank.
    #[must_use]
    pub fn rotation(&self) -> Option<RotationState> {
        self.banks.values().next().map(|b| b.rotation)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.values().map(|b| b.events.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Monitor spectrum and the monitor events that could not be unwrapped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MonitorConversion {
    pub spectrum: MonitorBatch,
    pub report: RejectionReport,
}

/// Everything a bank conversion needs besides its events.
#[derive(Clone, Copy, Debug)]
pub struct ConversionContext<'a> {
    pub geometry: &'a SecondaryGeometry,
    pub beamline: &'a PrimaryBeamline,
    pub rotation: &'a RotationState,
    pub unwrapper: &'a FrameUnwrapper,
    pub settings: &'a ConversionSettings,
}

impl ConversionContext<'_> {
    /// Time-of-flight from source to sample for one detected event.
    fn sample_tof(
        &self,
        pixel: &PixelKinematics,
        frame_time_ns: f64,
    ) -> std::result::Result<f64, RejectionReason> {
        let l1 = self.beamline.source_sample_distance_m;
        let tof = match self.settings.time_at_sample {
            TimeAtSample::FrameShift => {
                let at_sample = fold_into_frame(
                    frame_time_ns - pixel.secondary_tof_ns,
                    self.unwrapper.pulse_period_ns(),
                );
                self.unwrapper.unwrap(l1, at_sample)?
            }
            TimeAtSample::DetectorUnwrap => {
                let distance = l1 + pixel.secondary_path_m();
                self.unwrapper.unwrap(distance, frame_time_ns)? - pixel.secondary_tof_ns
            }
        };
        if tof > 0.0 {
            Ok(tof)
        } else {
            Err(RejectionReason::NonPositiveTof)
        }
    }

    fn convert_event(
        &self,
        index: usize,
        events: &EventBatch,
    ) -> std::result::Result<ConvertedEvent, RejectionReason> {
        let pixel_id = events.pixel_id[index];
        let frame_time_ns = events.frame_time_ns[index];
        if !frame_time_ns.is_finite() {
            return Err(RejectionReason::NonFiniteTime);
        }
        let pixel = self
            .geometry
            .pixel(pixel_id)
            .ok_or(RejectionReason::UnknownPixel)?;

        let sample_tof_ns = self.sample_tof(pixel, frame_time_ns)?;
        let incident = self.beamline.incident(sample_tof_ns);
        let q_lab = momentum_transfer(&incident, pixel);
        Ok(ConvertedEvent {
            event_index: index as u64,
            pixel_id,
            weight: events.weight[index],
            sample_tof_ns,
            incident_wavelength_angstrom: incident.wavelength_angstrom,
            incident_energy_mev: incident.energy_mev,
            final_energy_mev: pixel.final_energy_mev,
            energy_transfer_mev: energy_transfer(incident.energy_mev, pixel.final_energy_mev),
            q_lab,
            q_sample_table: to_sample_table(q_lab, self.rotation),
            a3_deg: self.rotation.a3_deg,
            a4_deg: pixel.a4_deg,
        })
    }
}

/// Converts the events of one bank.
///
/// # Errors
/// Returns an error for a malformed batch or beamline, and
/// [`KinematicsError::AllEventsRejected`] when the bank had events but none
/// could be converted.
pub fn convert_bank(events: &EventBatch, context: &ConversionContext<'_>) -> Result<BankConversion> {
    events.validate()?;
    context.beamline.validate()?;

    let outcomes: Vec<std::result::Result<ConvertedEvent, RejectionReason>> = (0..events.len())
        .into_par_iter()
        .map(|i| context.convert_event(i, events))
        .collect();

    let mut conversion = BankConversion {
        events: ConvertedBatch::with_capacity(outcomes.len()),
        report: RejectionReport::new(),
        rotation: *context.rotation,
    };
    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(event) => {
                conversion.events.push(event);
                conversion.report.record_converted();
            }
            Err(reason) => conversion
                .report
                .record_rejected(events.pixel_id[i], *reason),
        }
    }

    if conversion.report.all_rejected() {
        log::warn!("no event of the bank converted: {}", conversion.report);
        return Err(KinematicsError::AllEventsRejected {
            report: Box::new(conversion.report),
        });
    }
    let report = &conversion.report;
    if report.rejected_events() > 0 {
        log::warn!("{report}");
    } else {
        log::debug!("converted {} events", report.converted_events);
    }
    Ok(conversion)
}

/// Converts several banks of one run in parallel.
///
/// # Errors
/// Returns the first bank error in bank order.
pub fn convert_banks(
    banks: &[(BankId, &EventBatch, &SecondaryGeometry)],
    beamline: &PrimaryBeamline,
    rotation: &RotationState,
    unwrapper: &FrameUnwrapper,
    settings: &ConversionSettings,
) -> Result<RunConversion> {
    let results: Vec<(BankId, Result<BankConversion>)> = banks
        .par_iter()
        .map(|&(bank, events, geometry)| {
            let context = ConversionContext {
                geometry,
                beamline,
                rotation,
                unwrapper,
                settings,
            };
            (bank, convert_bank(events, &context))
        })
        .collect();

    let mut run = RunConversion::default();
    let mut ordered = results;
    ordered.sort_by_key(|(bank, _)| *bank);
    for (bank, result) in ordered {
        run.banks.insert(bank, Arc::new(result?));
    }
    Ok(run)
}

/// Unwraps monitor events recorded `distance_m` from the source.
///
/// Monitors see the direct beam, so the unwrapped time gives the wavelength
/// directly. Events that cannot be unwrapped are counted, not converted.
///
/// # Errors
/// Returns an error for a malformed batch.
pub fn convert_monitor(
    events: &EventBatch,
    distance_m: f64,
    unwrapper: &FrameUnwrapper,
) -> Result<MonitorConversion> {
    events.validate()?;
    let tofs = unwrapper.unwrap_batch(distance_m, &events.frame_time_ns);

    let mut conversion = MonitorConversion {
        spectrum: MonitorBatch::with_capacity(tofs.len()),
        report: RejectionReport::new(),
    };
    for (i, tof) in tofs.into_iter().enumerate() {
        match tof {
            Ok(tof) if tof > 0.0 => {
                conversion
                    .spectrum
                    .push(tof, wavelength_from_tof(tof, distance_m), events.weight[i]);
                conversion.report.record_converted();
            }
            Ok(_) => conversion
                .report
                .record_rejected(events.pixel_id[i], RejectionReason::NonPositiveTof),
            Err(err) => conversion
                .report
                .record_rejected(events.pixel_id[i], err.into()),
        }
    }
    if conversion.report.rejected_events() > 0 {
        log::warn!("monitor at {distance_m} m: {}", conversion.report);
    }
    Ok(conversion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DetectorPixel;
    use approx::assert_relative_eq;
    use rustqe_core::units::tof_from_wavelength;
    use rustqe_core::Vec3;
    use rustqe_tof::{build_lookup_table, SimulatedNeutrons, TableSettings};

    const PG002: f64 = 3.355;

    /// Table of a single neutron emitted at t = 0 with a fixed slowness.
    fn single_line_table(slowness_ns_per_m: f64) -> FrameUnwrapper {
        let neutrons = SimulatedNeutrons {
            emission_time_ns: vec![0.0],
            slowness_ns_per_m: vec![slowness_ns_per_m],
            simulated: 1,
        };
        let settings = TableSettings::new(9.5, 12.5)
            .with_distance_resolution(0.05)
            .with_time_resolution(1.0e4)
            .with_error_threshold(None);
        let table = build_lookup_table(&neutrons, 1.0e9 / 14.0, &settings).unwrap();
        FrameUnwrapper::new(Arc::new(table))
    }

    /// Pixels deflecting by 90 deg with secondary paths of 2 m and 10 m.
    fn elastic_setup() -> (SecondaryGeometry, FrameUnwrapper, f64) {
        let pixels = [
            DetectorPixel::new(11, Vec3::X, Vec3::Y, PG002),
            DetectorPixel::new(12, Vec3::X * 5.0, Vec3::Y * 5.0, PG002),
        ];
        let geometry = SecondaryGeometry::build(&pixels, 0.0).unwrap();
        let lambda = 2.0 * PG002 * std::f64::consts::FRAC_PI_4.sin();
        let unwrapper = single_line_table(tof_from_wavelength(lambda, 1.0));
        (geometry, unwrapper, lambda)
    }

    #[test]
    fn test_elastic_event_has_zero_energy_transfer() {
        let (geometry, unwrapper, lambda) = elastic_setup();
        let beamline = PrimaryBeamline::new(10.0);
        let rotation = RotationState::new(30.0, 0.0);
        let detector_tof = tof_from_wavelength(lambda, 12.0);
        let mut events = EventBatch::with_capacity(1);
        events.push(11, fold_into_frame(detector_tof, unwrapper.pulse_period_ns()), 2.0);

        for mode in [TimeAtSample::FrameShift, TimeAtSample::DetectorUnwrap] {
            let settings = ConversionSettings::default().with_time_at_sample(mode);
            let context = ConversionContext {
                geometry: &geometry,
                beamline: &beamline,
                rotation: &rotation,
                unwrapper: &unwrapper,
                settings: &settings,
            };
            let out = convert_bank(&events, &context).unwrap();
            assert_eq!(out.events.len(), 1);
            let event = out.events.get(0).unwrap();
            assert_relative_eq!(
                event.sample_tof_ns,
                tof_from_wavelength(lambda, 10.0),
                max_relative = 1e-9
            );
            assert_relative_eq!(
                event.incident_energy_mev,
                event.final_energy_mev,
                max_relative = 1e-9
            );
            assert!(event.energy_transfer_mev.abs() < 1e-9 * event.final_energy_mev);
            assert_relative_eq!(event.weight, 2.0);
            assert_eq!(out.rotation, rotation);
            assert_relative_eq!(event.a3_deg, 30.0);
            assert_relative_eq!(event.a4_deg, 90.0, epsilon = 1e-12);
            assert_relative_eq!(
                event.q_lab.norm(),
                event.q_sample_table.norm(),
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_bank_with_no_convertible_event_fails() {
        let (geometry, unwrapper, lambda) = elastic_setup();
        let rotation = RotationState::default();
        let settings = ConversionSettings::default();
        let far = PrimaryBeamline::new(50.0);

        let mut events = EventBatch::with_capacity(1);
        events.push(11, tof_from_wavelength(lambda, 12.0), 1.0);
        let context = ConversionContext {
            geometry: &geometry,
            beamline: &far,
            rotation: &rotation,
            unwrapper: &unwrapper,
            settings: &settings,
        };
        events.push(99, tof_from_wavelength(lambda, 12.0), 1.0);
        match convert_bank(&events, &context) {
            Err(KinematicsError::AllEventsRejected { report }) => {
                assert_eq!(report.total_events, 2);
                assert_eq!(report.converted_events, 0);
                assert_eq!(report.count(RejectionReason::DistanceOutOfRange), 1);
                assert_eq!(report.count(RejectionReason::UnknownPixel), 1);
                assert_eq!(report.pixel_rejections(11), 1);
                assert_eq!(report.pixel_rejections(99), 1);
            }
            other => panic!("expected every event rejected, got {other:?}"),
        }

        // An empty bank is not an error.
        let out = convert_bank(&EventBatch::default(), &context).unwrap();
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_rejections_are_counted_per_pixel() {
        let (geometry, unwrapper, lambda) = elastic_setup();
        let beamline = PrimaryBeamline::new(10.0);
        let rotation = RotationState::default();
        let settings =
            ConversionSettings::default().with_time_at_sample(TimeAtSample::DetectorUnwrap);
        let context = ConversionContext {
            geometry: &geometry,
            beamline: &beamline,
            rotation: &rotation,
            unwrapper: &unwrapper,
            settings: &settings,
        };

        // Pixel 12 is 20 m from the source, past the 12.5 m table.
        let mut events = EventBatch::with_capacity(3);
        events.push(11, tof_from_wavelength(lambda, 12.0), 1.0);
        events.push(12, tof_from_wavelength(lambda, 20.0), 1.0);
        events.push(99, tof_from_wavelength(lambda, 12.0), 1.0);

        let out = convert_bank(&events, &context).unwrap();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events.event_index, vec![0]);
        assert_eq!(out.report.count(RejectionReason::DistanceOutOfRange), 1);
        assert_eq!(out.report.count(RejectionReason::UnknownPixel), 1);
        assert_eq!(out.report.pixel_rejections(12), 1);
        assert_eq!(out.report.pixel_rejections(11), 0);
        assert!(out.events.iter().all(|e| e.pixel_id != 12));
    }

    #[test]
    fn test_banks_keyed_by_id() {
        let (geometry, unwrapper, lambda) = elastic_setup();
        let mut events = EventBatch::with_capacity(1);
        events.push(11, tof_from_wavelength(lambda, 12.0), 1.0);
        let banks = [
            (BankId(7), &events, &geometry),
            (BankId(2), &events, &geometry),
        ];
        let run = convert_banks(
            &banks,
            &PrimaryBeamline::new(10.0),
            &RotationState::default(),
            &unwrapper,
            &ConversionSettings::default(),
        )
        .unwrap();
        assert_eq!(run.banks.keys().copied().collect::<Vec<_>>(), vec![BankId(2), BankId(7)]);
        assert_eq!(run.len(), 2);
        assert_eq!(run.events().len(), 2);
        assert_eq!(run.report().converted_events, 2);
        assert_eq!(run.rotation(), Some(RotationState::default()));
        assert_eq!(RunConversion::default().rotation(), None);
    }

    #[test]
    fn test_monitor_spectrum() {
        let (_, unwrapper, lambda) = elastic_setup();
        let mut events = EventBatch::with_capacity(2);
        events.push(0, tof_from_wavelength(lambda, 11.0), 3.0);
        events.push(0, f64::NAN, 1.0);
        let out = convert_monitor(&events, 11.0, &unwrapper).unwrap();
        assert_eq!(out.spectrum.len(), 1);
        assert_relative_eq!(out.spectrum.wavelength_angstrom[0], lambda, max_relative = 1e-9);
        assert_eq!(out.report.count(RejectionReason::NonFiniteTime), 1);
    }
}
