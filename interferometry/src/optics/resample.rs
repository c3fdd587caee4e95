//! Bilinear resampling of frames onto a new grid.
//!
//! Pixel centres are aligned: output pixel `d` samples the input at
//! `(d + 0.5)·scale − 0.5`, clamped to the input extent.

use ndarray::Array2;
use num_complex::Complex64;
use std::ops::{Add, Mul};

use crate::error::{ensure_shape, MetrologyError, Result};
use crate::mask::Mask;

/// Values that can be blended with real weights.
pub trait Blend: Copy + Add<Output = Self> + Mul<f64, Output = Self> {}

impl Blend for f64 {}
impl Blend for Complex64 {}

/// Lower index, upper index and weight of the upper sample for output `d`.
fn source_position(d: usize, src_len: usize, dst_len: usize) -> (usize, usize, f64) {
    let scale = src_len as f64 / dst_len as f64;
    let pos = ((d as f64 + 0.5) * scale - 0.5).clamp(0.0, (src_len - 1) as f64);
    let low = pos.floor() as usize;
    let high = (low + 1).min(src_len - 1);
    (low, high, pos - low as f64)
}

/// Resample `src` to `shape` (rows, columns).
///
/// Complex values are blended component-wise, which interpolates real and
/// imaginary parts independently.
pub fn resize_bilinear<T: Blend>(src: &Array2<T>, shape: (usize, usize)) -> Result<Array2<T>> {
    let (h, w) = src.dim();
    if h == 0 || w == 0 || shape.0 == 0 || shape.1 == 0 {
        return Err(MetrologyError::InvalidParameter(format!(
            "cannot resample {h}x{w} frame to {}x{}",
            shape.0, shape.1
        )));
    }
    let rows: Vec<_> = (0..shape.0).map(|d| source_position(d, h, shape.0)).collect();
    let cols: Vec<_> = (0..shape.1).map(|d| source_position(d, w, shape.1)).collect();

    Ok(Array2::from_shape_fn(shape, |(i, j)| {
        let (y_low, y_high, y_weight) = rows[i];
        let (x_low, x_high, x_weight) = cols[j];
        let q11 = src[[y_low, x_low]];
        let q12 = src[[y_high, x_low]];
        let q21 = src[[y_low, x_high]];
        let q22 = src[[y_high, x_high]];
        q11 * ((1.0 - x_weight) * (1.0 - y_weight))
            + q21 * (x_weight * (1.0 - y_weight))
            + q12 * ((1.0 - x_weight) * y_weight)
            + q22 * (x_weight * y_weight)
    }))
}

/// Resampled aperture and wavefront of a masked surface.
#[derive(Debug, Clone)]
pub struct ResampledAperture {
    /// Aperture transmission in [0, 1], fractional on the edge
    pub amplitude: Array2<f64>,
    /// Wavefront in waves, zero where the amplitude vanishes
    pub wavefront: Array2<f64>,
}

/// Resample a masked wavefront without letting invalid pixels leak in.
///
/// Pixels invalid in the mask or non-finite in the wavefront carry zero
/// weight; the wavefront is the weighted average of its valid neighbours.
/// Rows and columns are scaled independently, so a non-square wavefront
/// resampled onto a square grid is stretched anisotropically.
pub fn resample_aperture(
    wavefront: &Array2<f64>,
    mask: &Mask,
    shape: (usize, usize),
) -> Result<ResampledAperture> {
    ensure_shape("aperture mask", wavefront.dim(), mask.shape())?;

    let mut weights = Array2::<f64>::zeros(wavefront.dim());
    let mut weighted = Array2::<f64>::zeros(wavefront.dim());
    for ((idx, &w), &ok) in wavefront.indexed_iter().zip(mask.valid().iter()) {
        if ok && w.is_finite() {
            weights[idx] = 1.0;
            weighted[idx] = w;
        }
    }

    let amplitude = resize_bilinear(&weights, shape)?;
    let mut resampled = resize_bilinear(&weighted, shape)?;
    for (w, &a) in resampled.iter_mut().zip(amplitude.iter()) {
        *w = if a > 0.0 { *w / a } else { 0.0 };
    }
    Ok(ResampledAperture {
        amplitude,
        wavefront: resampled,
    })
}
