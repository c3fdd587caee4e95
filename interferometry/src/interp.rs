//! Linear interpolation helpers.
//!
//! - **Point interpolation**: [`interp`] with linear extrapolation outside the
//!   sampled range
//! - **Gap filling**: [`fill_nan_linear`] replaces NaN samples of a lane from
//!   its finite neighbours

use thiserror::Error;

/// Errors that can occur during interpolation operations.
#[derive(Error, Debug, PartialEq)]
pub enum InterpError {
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in strictly ascending order")]
    UnsortedData,
}

/// Linear interpolation on 1D data, extrapolating linearly from the end
/// segments outside `[xs[0], xs[n-1]]`.
///
/// # Arguments
///
/// * `x` - The x-coordinate at which to interpolate
/// * `xs` - Array of x-coordinates (strictly ascending)
/// * `ys` - Array of corresponding y-values (must match length of xs)
///
/// # Examples
///
/// ```rust
/// use interferometry::interp::interp;
///
/// let xs = [0.0, 1.0, 2.0];
/// let ys = [0.0, 2.0, 3.0];
/// assert_eq!(interp(0.5, &xs, &ys).unwrap(), 1.0);
/// assert_eq!(interp(3.0, &xs, &ys).unwrap(), 4.0);
/// assert_eq!(interp(-1.0, &xs, &ys).unwrap(), -2.0);
/// ```
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }
    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }
    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpError::UnsortedData);
    }

    // Segment whose end points bracket x (end segments extrapolate)
    let idx = xs.partition_point(|&xi| xi <= x).clamp(1, xs.len() - 1);
    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);

    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Replace NaN samples of `values` by linear interpolation over sample index,
/// extrapolating past the first and last finite samples.
///
/// Lanes with fewer than two finite samples are left untouched. Returns the
/// indices that were filled.
pub fn fill_nan_linear(values: &mut [f64]) -> Vec<usize> {
    let fillable = vec![true; values.len()];
    fill_nan_linear_where(values, &fillable)
}

/// Same as [`fill_nan_linear`], restricted to samples flagged in `fillable`.
///
/// NaN samples outside `fillable` stay NaN.
pub fn fill_nan_linear_where(values: &mut [f64], fillable: &[bool]) -> Vec<usize> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as f64, v))
        .unzip();
    if xs.len() < 2 || xs.len() == values.len() {
        return Vec::new();
    }

    let mut filled = Vec::new();
    for (i, (v, &fill)) in values.iter_mut().zip(fillable).enumerate() {
        if fill && v.is_nan() {
            if let Ok(estimate) = interp(i as f64, &xs, &ys) {
                *v = estimate;
                filled.push(i);
            }
        }
    }
    filled
}
