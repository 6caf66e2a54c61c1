//! Source-frame timing helpers.
//!

/// Pulse period in ns for a source frequency in Hz.
#[inline]
#[must_use]
pub fn pulse_period_ns(frequency_hz: f64) -> f64 {
    1.0e9 / frequency_hz
}

/// Fold an absolute time into `[0, period)`.
///
/// Converts simulated arrival times into the frame-relative times a
/// data-acquisition system records.
#[inline]
#[must_use]
pub fn fold_into_frame(time_ns: f64, period_ns: f64) -> f64 {
    let folded = time_ns.rem_euclid(period_ns);
    // rem_euclid of a tiny negative value rounds up to the period itself
    if folded >= period_ns {
        0.0
    } else {
        folded
    }
}

/// Index of the source frame containing an absolute time.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn frame_index(time_ns: f64, period_ns: f64) -> i64 {
    (time_ns / period_ns).floor() as i64
}
