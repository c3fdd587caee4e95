//! Mask-aware 2D phase unwrapping by reconciliation of two unwrap orders.
//!
//! The wrapped map is unwrapped twice, columns first and rows first. On a
//! consistent surface both results differ by a single multiple of the period;
//! pixels where they disagree are *problematic* and are resolved from local
//! derivatives, or dropped.
//!
//! # Algorithm
//!
//! 1. Two-pass 1D unwrap, columns then rows and rows then columns.
//! 2. Offset between the results over the common valid pixels, rounded to a
//!    whole period. Pixels off that offset by more than the tolerance are
//!    problematic; the offset is re-estimated without them.
//! 3. More than 5% problematic pixels, or an offset spread above the tolerance,
//!    marks the result unreliable: only agreeing pixels are kept.
//!    Otherwise problematic pixels are repaired or set to NaN.
//! 4. Holes left inside the valid region of a reliable map are filled by
//!    linear interpolation along rows then columns, and reported in [`UnwrapOutcome::filled_mask`].
//!
//! The method assumes a well-sampled, mostly connected aperture. Sparse or
//! fragmented masks routinely end up flagged unreliable.

pub mod axis;

use log::{debug, warn};
use ndarray::{Array2, Axis, Zip};

use crate::demodulation::WrappedPhaseMap;
use crate::error::{MetrologyError, Result};
use crate::interp::fill_nan_linear_where;
use crate::mask::Mask;

pub use axis::{unwrap_along, unwrap_lane, unwrap_two_pass};

/// Fraction of problematic pixels above which the unwrap is unreliable
pub const MAX_PROBLEMATIC_RATIO: f64 = 0.05;

/// Agreement tolerance between the two unwrap orders, as a fraction of the
/// period (π/10000 for a 2π period).
pub const OFFSET_TOLERANCE_FRACTION: f64 = 1.0 / 20000.0;

/// Continuous phase in waves (cycles of the unwrap period), NaN where invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwrappedPhaseMap {
    pub waves: Array2<f64>,
}

impl UnwrappedPhaseMap {
    pub fn new(waves: Array2<f64>) -> Self {
        Self { waves }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.waves.dim()
    }

    pub fn valid_mask(&self) -> Mask {
        Mask::from_finite(&self.waves)
    }

    /// Surface multiplied by `factor`, e.g. a wedge factor of 0.5 for double pass.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.waves.mapv(|w| w * factor))
    }
}

/// Agreement statistics of the two unwrap orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnwrapDiagnostics {
    /// Population standard deviation of the offset over agreeing pixels
    /// (infinite with fewer than two of them), radians
    pub offset_std: f64,
    /// Distance between the first mean offset and its whole-period rounding, radians
    pub initial_offset_error: f64,
    /// Problematic pixels over common valid pixels
    pub problematic_ratio: f64,
    /// Whole-period offset between the two unwrap orders, radians
    pub offset: f64,
}

/// Result of [`unwrap`].
#[derive(Debug, Clone)]
pub struct UnwrapOutcome {
    pub unwrapped: UnwrappedPhaseMap,
    /// False when the two unwrap orders disagree too much to trust the map
    pub reliable: bool,
    /// Pixels where the unwrap orders disagreed, or valid input pixels that
    /// were dropped
    pub problem_mask: Array2<bool>,
    /// Pixels whose value was interpolated from their neighbours
    pub filled_mask: Array2<bool>,
    pub diagnostics: UnwrapDiagnostics,
}

impl UnwrapOutcome {
    pub fn problem_count(&self) -> usize {
        self.problem_mask.iter().filter(|&&p| p).count()
    }

    pub fn filled_count(&self) -> usize {
        self.filled_mask.iter().filter(|&&p| p).count()
    }
}

/// Options of [`unwrap_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnwrapOptions {
    /// Phase period in radians
    pub period: f64,
    /// Interpolate holes left inside the valid region of a reliable map
    pub fill_holes: bool,
}

impl Default for UnwrapOptions {
    fn default() -> Self {
        Self {
            period: 2.0 * std::f64::consts::PI,
            fill_holes: true,
        }
    }
}

/// Unwrap `wrapped` with the given period and hole filling enabled.
///
/// Fails only for a non-positive period; numerical trouble is reported
/// through [`UnwrapOutcome::reliable`] and the per-pixel masks.
pub fn unwrap(wrapped: &WrappedPhaseMap, period: f64) -> Result<UnwrapOutcome> {
    unwrap_with(
        wrapped,
        &UnwrapOptions {
            period,
            fill_holes: true,
        },
    )
}

/// Unwrap `wrapped` according to `options`.
pub fn unwrap_with(wrapped: &WrappedPhaseMap, options: &UnwrapOptions) -> Result<UnwrapOutcome> {
    let period = options.period;
    if !(period.is_finite() && period > 0.0) {
        return Err(MetrologyError::InvalidParameter(format!(
            "unwrap period must be positive, got {period}"
        )));
    }
    let input = &wrapped.phase;
    let input_valid = input.mapv(|v| !v.is_nan());
    let tolerance = period * OFFSET_TOLERANCE_FRACTION;

    let cols = unwrap_two_pass(input, Axis(0), period);
    let rows = unwrap_two_pass(input, Axis(1), period);

    let common = Zip::from(&cols)
        .and(&rows)
        .map_collect(|c, r| !c.is_nan() && !r.is_nan());
    let offsets: Vec<f64> = Zip::from(&cols)
        .and(&rows)
        .and(&common)
        .fold(Vec::new(), |mut acc, &c, &r, &ok| {
            if ok {
                acc.push(c - r);
            }
            acc
        });
    let n_common = offsets.len();

    let first_mean = mean(&offsets).unwrap_or(0.0);
    let mut offset = period * (first_mean / period).round_ties_even();
    let initial_offset_error = (offset - first_mean).abs();

    let problematic = Zip::from(&cols)
        .and(&rows)
        .and(&common)
        .map_collect(|c, r, &ok| ok && (c - r - offset).abs() > tolerance);
    let n_problematic = problematic.iter().filter(|&&p| p).count();

    let agreeing: Vec<f64> = Zip::from(&cols)
        .and(&rows)
        .and(&common)
        .and(&problematic)
        .fold(Vec::new(), |mut acc, &c, &r, &ok, &bad| {
            if ok && !bad {
                acc.push(c - r);
            }
            acc
        });
    let offset_std = if agreeing.len() >= 2 {
        let m = mean(&agreeing).unwrap_or(0.0);
        offset = period * (m / period).round_ties_even();
        population_std(&agreeing, m)
    } else {
        f64::INFINITY
    };

    let problematic_ratio = if n_common == 0 {
        1.0
    } else {
        n_problematic as f64 / n_common as f64
    };
    let diagnostics = UnwrapDiagnostics {
        offset_std,
        initial_offset_error,
        problematic_ratio,
        offset,
    };

    let serious = problematic_ratio > MAX_PROBLEMATIC_RATIO || offset_std > tolerance;
    let mut result = if serious {
        warn!(
            "unwrap unreliable: {:.2}% problematic pixels, offset spread {:.3e} rad",
            100.0 * problematic_ratio,
            offset_std
        );
        keep_agreeing(&cols, &common, &problematic)
    } else {
        merge_orders(&cols, &rows, &problematic, offset, period)
    };

    let mut problem_mask = problematic;
    Zip::from(&mut problem_mask)
        .and(&input_valid)
        .and(&result)
        .for_each(|p, &valid, &v| *p = *p || (valid && v.is_nan()));

    let filled_mask = if options.fill_holes && !serious {
        fill_holes(&mut result, &input_valid)
    } else {
        Array2::from_elem(result.dim(), false)
    };

    debug!(
        "unwrap: {} common pixels, {} problematic, offset {:.3} rad, {} filled",
        n_common,
        n_problematic,
        offset,
        filled_mask.iter().filter(|&&f| f).count()
    );

    result.mapv_inplace(|v| v / period);
    Ok(UnwrapOutcome {
        unwrapped: UnwrappedPhaseMap::new(result),
        reliable: !serious,
        problem_mask,
        filled_mask,
        diagnostics,
    })
}

/// Columns-first result restricted to pixels where both orders agree.
fn keep_agreeing(
    cols: &Array2<f64>,
    common: &Array2<bool>,
    problematic: &Array2<bool>,
) -> Array2<f64> {
    let mut result = cols.clone();
    Zip::from(&mut result)
        .and(common)
        .and(problematic)
        .for_each(|v, &ok, &bad| {
            if !ok || bad {
                *v = f64::NAN;
            }
        });
    result
}

/// Columns-first result completed from the rows-first result.
///
/// A problematic pixel on the image border is dropped. Inside, the derivative
/// of each unwrap order across the pixel decides which one to trust: a jump
/// larger than a period, or no usable derivative, disqualifies that order.
fn merge_orders(
    cols: &Array2<f64>,
    rows: &Array2<f64>,
    problematic: &Array2<bool>,
    offset: f64,
    period: f64,
) -> Array2<f64> {
    let mut result = cols.clone();
    Zip::from(&mut result).and(rows).for_each(|v, &r| {
        if v.is_nan() && !r.is_nan() {
            *v = r + offset;
        }
    });

    let (nrows, ncols) = cols.dim();
    for ((i, j), _) in problematic.indexed_iter().filter(|(_, &bad)| bad) {
        if i == 0 || j == 0 || i == nrows - 1 || j == ncols - 1 {
            result[[i, j]] = f64::NAN;
            continue;
        }
        let col_problem = unstable(
            [cols[[i, j - 1]], cols[[i, j]], cols[[i, j + 1]]],
            period,
        );
        let row_problem = unstable(
            [rows[[i - 1, j]], rows[[i, j]], rows[[i + 1, j]]],
            period,
        );
        result[[i, j]] = match (col_problem, row_problem) {
            (true, false) => rows[[i, j]] + offset,
            (false, true) => cols[[i, j]],
            _ => f64::NAN,
        };
    }
    result
}

/// True when a 3-sample neighbourhood has a jump above `period` or no finite step.
fn unstable(samples: [f64; 3], period: f64) -> bool {
    let steps: Vec<f64> = samples
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| !d.is_nan())
        .collect();
    steps.is_empty() || steps.iter().any(|d| d.abs() > period)
}

/// Interpolate NaN pixels of `map` lying inside `region`, along rows then
/// columns. Returns the filled pixels.
pub fn fill_holes(map: &mut Array2<f64>, region: &Array2<bool>) -> Array2<bool> {
    let mut filled = Array2::from_elem(map.dim(), false);
    for axis in [Axis(1), Axis(0)] {
        for ((mut lane, fillable), mut flags) in map
            .lanes_mut(axis)
            .into_iter()
            .zip(region.lanes(axis))
            .zip(filled.lanes_mut(axis))
        {
            let mut values = lane.to_vec();
            let fillable = fillable.to_vec();
            for idx in fill_nan_linear_where(&mut values, &fillable) {
                lane[idx] = values[idx];
                flags[idx] = true;
            }
        }
    }
    filled
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demodulation::wrap_phase;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::f64::consts::PI;

    fn wrapped_from(truth: &Array2<f64>) -> WrappedPhaseMap {
        WrappedPhaseMap {
            phase: truth.mapv(|v| if v.is_nan() { f64::NAN } else { wrap_phase(v) }),
        }
    }

    fn assert_matches_up_to_constant(waves: &Array2<f64>, truth_rad: &Array2<f64>) {
        let mut reference: Option<f64> = None;
        for (&w, &t) in waves.iter().zip(truth_rad.iter()) {
            if t.is_nan() {
                assert!(w.is_nan());
                continue;
            }
            let diff = w - t / (2.0 * PI);
            let offset = *reference.get_or_insert(diff);
            assert_abs_diff_eq!(diff, offset, epsilon = 1e-9);
        }
        let offset = reference.unwrap();
        assert_abs_diff_eq!(offset, offset.round(), epsilon = 1e-9);
    }

    #[test]
    fn test_plane_unwraps_to_constant_offset() {
        let truth = Array2::from_shape_fn((48, 64), |(i, j)| 0.8 * j as f64 - 0.55 * i as f64);
        let outcome = unwrap(&wrapped_from(&truth), 2.0 * PI).unwrap();

        assert!(outcome.reliable);
        assert_eq!(outcome.problem_count(), 0);
        assert_eq!(outcome.filled_count(), 0);
        assert!(outcome.diagnostics.offset_std < PI / 10000.0);
        assert_abs_diff_eq!(outcome.diagnostics.problematic_ratio, 0.0);
        assert_matches_up_to_constant(&outcome.unwrapped.waves, &truth);
    }

    #[test]
    fn test_masked_pixels_stay_nan() {
        let truth = Array2::from_shape_fn((40, 40), |(i, j)| {
            let (x, y) = (j as f64 - 19.5, i as f64 - 19.5);
            if x * x + y * y > 18.0 * 18.0 {
                f64::NAN
            } else {
                0.02 * (x * x + y * y)
            }
        });
        let outcome = unwrap(&wrapped_from(&truth), 2.0 * PI).unwrap();
        assert!(outcome.reliable);
        assert_matches_up_to_constant(&outcome.unwrapped.waves, &truth);
        assert_eq!(outcome.filled_count(), 0);
    }

    #[test]
    fn test_residue_pair_is_filled_inside_disk() {
        // Opposite phase vortices two pixels apart inside a curved surface
        let vortex = |i: usize, j: usize, x0: f64| (i as f64 - 19.5).atan2(j as f64 - x0);
        let truth = Array2::from_shape_fn((40, 40), |(i, j)| {
            let (x, y) = (j as f64 - 19.5, i as f64 - 19.5);
            if x * x + y * y > 18.0 * 18.0 {
                f64::NAN
            } else {
                0.02 * (x * x + y * y) + vortex(i, j, 19.5) - vortex(i, j, 21.5)
            }
        });
        let outcome = unwrap(&wrapped_from(&truth), 2.0 * PI).unwrap();

        assert!(outcome.reliable);
        assert!(outcome.problem_count() > 0);
        assert!(outcome.filled_count() > 0);
        for ((i, j), &w) in outcome.unwrapped.waves.indexed_iter() {
            let inside = !truth[[i, j]].is_nan();
            assert_eq!(w.is_finite(), inside, "pixel ({i}, {j})");
            if outcome.filled_mask[[i, j]] {
                assert!(inside);
                assert!(outcome.problem_mask[[i, j]]);
            }
        }
    }

    #[test]
    fn test_noise_is_flagged_unreliable() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let noise = Array2::from_shape_fn((32, 32), |_| rng.random_range(-PI..PI));
        let outcome = unwrap(&WrappedPhaseMap { phase: noise }, 2.0 * PI).unwrap();
        assert!(!outcome.reliable);
        assert!(outcome.problem_count() > 0);
        assert!(outcome.unwrapped.waves.iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_invalid_period() {
        let wrapped = WrappedPhaseMap {
            phase: Array2::zeros((4, 4)),
        };
        assert!(unwrap(&wrapped, 0.0).is_err());
        assert!(unwrap(&wrapped, f64::NAN).is_err());
    }

    #[test]
    fn test_all_nan_input() {
        let wrapped = WrappedPhaseMap {
            phase: Array2::from_elem((5, 5), f64::NAN),
        };
        let outcome = unwrap(&wrapped, 2.0 * PI).unwrap();
        assert!(!outcome.reliable);
        assert!(outcome.unwrapped.waves.iter().all(|v| v.is_nan()));
        assert_eq!(outcome.problem_count(), 0);
    }

    #[test]
    fn test_unstable_neighbourhood() {
        assert!(!unstable([0.0, 1.0, 2.0], 2.0 * PI));
        assert!(unstable([0.0, 7.0, 7.5], 2.0 * PI));
        assert!(unstable([f64::NAN, 1.0, f64::NAN], 2.0 * PI));
        assert!(!unstable([f64::NAN, 1.0, 1.5], 2.0 * PI));
    }

    #[test]
    fn test_merge_repairs_from_stable_order() {
        let period = 2.0 * PI;
        let cols = Array2::from_shape_fn((3, 3), |(_, j)| j as f64);
        let mut rows = cols.clone();
        let mut problematic = Array2::from_elem((3, 3), false);

        // Columns-first result jumps at the centre, rows-first does not
        let mut bad_cols = cols.clone();
        bad_cols[[1, 1]] += period * 2.0;
        problematic[[1, 1]] = true;
        let merged = merge_orders(&bad_cols, &rows, &problematic, 0.0, period);
        assert_abs_diff_eq!(merged[[1, 1]], 1.0);

        // Rows-first result jumps: keep the columns-first value
        rows[[1, 1]] += period * 2.0;
        let merged = merge_orders(&cols, &rows, &problematic, 0.0, period);
        assert_abs_diff_eq!(merged[[1, 1]], 1.0);

        // Border pixels are dropped
        problematic[[0, 1]] = true;
        let merged = merge_orders(&cols, &rows, &problematic, 0.0, period);
        assert!(merged[[0, 1]].is_nan());
    }

    #[test]
    fn test_fill_holes_inside_region_only() {
        let mut map = Array2::from_shape_fn((4, 5), |(i, j)| (i + j) as f64);
        map[[1, 2]] = f64::NAN;
        map[[3, 4]] = f64::NAN;
        let mut region = Array2::from_elem((4, 5), true);
        region[[3, 4]] = false;

        let filled = fill_holes(&mut map, &region);
        assert_abs_diff_eq!(map[[1, 2]], 3.0);
        assert!(filled[[1, 2]]);
        assert!(map[[3, 4]].is_nan());
        assert!(!filled[[3, 4]]);
    }
}
