//! One-dimensional unwrapping along array axes.
//!
//! NaN samples are skipped: the finite samples of a lane are unwrapped in
//! order as if they were contiguous, so a gap in the mask is bridged rather
//! than restarting the lane.

use ndarray::{Array2, ArrayViewMut1, Axis, Zip};

/// Unwrap one lane in place.
///
/// Every step `d` between consecutive finite samples contributes
/// `-round(d / period) * period` to a running correction (ties round to even).
pub fn unwrap_lane(mut lane: ArrayViewMut1<f64>, period: f64) {
    let mut correction = 0.0;
    let mut previous: Option<f64> = None;
    for value in lane.iter_mut() {
        if value.is_nan() {
            continue;
        }
        let raw = *value;
        if let Some(prev) = previous {
            correction -= ((raw - prev) / period).round_ties_even() * period;
        }
        previous = Some(raw);
        *value = raw + correction;
    }
}

/// Unwrap every lane of `phase` along `axis` (`Axis(0)` walks down columns).
pub fn unwrap_along(phase: &Array2<f64>, axis: Axis, period: f64) -> Array2<f64> {
    let mut out = phase.clone();
    Zip::from(out.lanes_mut(axis)).par_for_each(|lane| unwrap_lane(lane, period));
    out
}

/// Unwrap along `first` and then along the other axis of the result.
pub fn unwrap_two_pass(phase: &Array2<f64>, first: Axis, period: f64) -> Array2<f64> {
    let second = if first == Axis(0) { Axis(1) } else { Axis(0) };
    unwrap_along(&unwrap_along(phase, first, period), second, period)
}
