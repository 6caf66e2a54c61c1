//! Accounting of events dropped during conversion.

use rustqe_tof::UnwrapError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why an event was not converted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Flight distance outside the lookup table.
    DistanceOutOfRange,
    /// No valid table cell near the event's frame time.
    UnresolvableFrame,
    /// Frame time or distance is NaN or infinite.
    NonFiniteTime,
    /// Pixel id absent from the bank geometry.
    UnknownPixel,
    /// Time-of-flight at the sample is zero or negative.
    NonPositiveTof,
}

impl From<UnwrapError> for RejectionReason {
    fn from(err: UnwrapError) -> Self {
        match err {
            UnwrapError::DistanceOutOfRange { .. } => Self::DistanceOutOfRange,
            UnwrapError::UnresolvableFrame { .. } => Self::UnresolvableFrame,
            UnwrapError::NonFinite => Self::NonFiniteTime,
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DistanceOutOfRange => "distance out of range",
            Self::UnresolvableFrame => "unresolvable frame",
            Self::NonFiniteTime => "non-finite time",
            Self::UnknownPixel => "unknown pixel",
            Self::NonPositiveTof => "non-positive time-of-flight",
        };
        f.write_str(name)
    }
}

/// Event counts by outcome, reason and pixel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReport {
    pub total_events: u64,
    pub converted_events: u64,
    pub by_reason: BTreeMap<RejectionReason, u64>,
    /// Rejected events per pixel id.
    pub by_pixel: BTreeMap<u32, u64>,
}

impl RejectionReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_converted(&mut self) {
        self.total_events += 1;
        self.converted_events += 1;
    }

    pub fn record_rejected(&mut self, pixel_id: u32, reason: RejectionReason) {
        self.total_events += 1;
        *self.by_reason.entry(reason).or_insert(0) += 1;
        *self.by_pixel.entry(pixel_id).or_insert(0) += 1;
    }

    #[must_use]
    pub fn rejected_events(&self) -> u64 {
        self.total_events - self.converted_events
    }

    #[must_use]
    pub fn count(&self, reason: RejectionReason) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn pixel_rejections(&self, pixel_id: u32) -> u64 {
        self.by_pixel.get(&pixel_id).copied().unwrap_or(0)
    }

    /// Fraction of events rejected, 0 for an empty report.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejected_fraction(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.rejected_events() as f64 / self.total_events as f64
        }
    }

    /// True when there were events and none converted.
    #[must_use]
    pub fn all_rejected(&self) -> bool {
        self.total_events > 0 && self.converted_events == 0
    }

    pub fn merge(&mut self, other: &RejectionReport) {
        self.total_events += other.total_events;
        self.converted_events += other.converted_events;
        for (&reason, &n) in &other.by_reason {
            *self.by_reason.entry(reason).or_insert(0) += n;
        }
        for (&pixel, &n) in &other.by_pixel {
            *self.by_pixel.entry(pixel).or_insert(0) += n;
        }
    }
}

impl fmt::Display for RejectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} events rejected",
            self.rejected_events(),
            self.total_events
        )?;
        for (reason, n) in &self.by_reason {
            write!(f, ", {reason}: {n}")?;
        }
        Ok(())
    }
}
