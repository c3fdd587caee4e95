//! Frame preprocessing ahead of demodulation.
//!
//! Gaussian smoothing is separable: a normalised 1-D kernel truncated at
//! four standard deviations is applied along rows, then along columns.
//! Samples beyond the border are mirrored about the frame edge
//! (`d c b a | a b c d | d c b a`).

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis, Zip};

use crate::demodulation::InterferogramSet;
use crate::error::{MetrologyError, Result};

/// Kernel half-width in standard deviations
const TRUNCATE_SIGMAS: f64 = 4.0;

/// Normalised 1-D Gaussian kernel of `2·radius + 1` taps.
///
/// `radius = round(4σ)`, so σ below 0.125 yields the identity kernel.
pub fn gaussian_kernel_1d(sigma: f64) -> Array1<f64> {
    let radius = (TRUNCATE_SIGMAS * sigma + 0.5) as usize;
    let mut kernel = Array1::from_shape_fn(2 * radius + 1, |i| {
        let x = i as f64 - radius as f64;
        (-(x * x) / (2.0 * sigma * sigma)).exp()
    });
    let sum = kernel.sum();
    if sum > 0.0 {
        kernel.mapv_inplace(|v| v / sum);
    }
    kernel
}

/// Mirror `index` into `0..len` with edge samples repeated.
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

fn convolve_lane(input: ArrayView1<f64>, mut output: ArrayViewMut1<f64>, kernel: &Array1<f64>) {
    let n = input.len();
    let radius = (kernel.len() / 2) as isize;
    for (i, out) in output.iter_mut().enumerate() {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| w * input[reflect(i as isize + k as isize - radius, n)])
            .sum();
    }
}

fn check_sigma(sigma: f64) -> Result<()> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(())
    } else {
        Err(MetrologyError::InvalidParameter(format!(
            "smoothing sigma must be positive, got {sigma}"
        )))
    }
}

fn filter_with_kernel(image: &Array2<f64>, kernel: &Array1<f64>) -> Array2<f64> {
    if image.is_empty() {
        return image.clone();
    }
    let mut rows = Array2::<f64>::zeros(image.dim());
    Zip::from(image.lanes(Axis(1)))
        .and(rows.lanes_mut(Axis(1)))
        .par_for_each(|src, dst| convolve_lane(src, dst, kernel));

    let mut smoothed = Array2::<f64>::zeros(image.dim());
    Zip::from(rows.lanes(Axis(0)))
        .and(smoothed.lanes_mut(Axis(0)))
        .par_for_each(|src, dst| convolve_lane(src, dst, kernel));
    smoothed
}

/// Gaussian-smoothed copy of `image`, same shape.
///
/// NaN samples spread over the kernel footprint.
pub fn gaussian_filter(image: &Array2<f64>, sigma: f64) -> Result<Array2<f64>> {
    check_sigma(sigma)?;
    Ok(filter_with_kernel(image, &gaussian_kernel_1d(sigma)))
}

/// Smooth every frame of a set with the same kernel.
pub fn smooth_set(frames: &InterferogramSet, sigma: f64) -> Result<InterferogramSet> {
    check_sigma(sigma)?;
    debug!("smoothing {} frames with sigma {sigma}", frames.size());
    let kernel = gaussian_kernel_1d(sigma);
    frames.map_frames(|frame| filter_with_kernel(frame, &kernel))
}
