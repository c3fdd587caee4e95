//! Summary statistics of measured surfaces.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peak-to-valley and RMS of the finite pixels of a surface.
///
/// Units follow the input, waves for every map produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStatistics {
    pub peak_to_valley: f64,
    /// Population standard deviation about the mean
    pub rms: f64,
    pub mean: f64,
    pub valid_pixels: usize,
}

impl SurfaceStatistics {
    /// Statistics over the finite pixels of `surface`.
    ///
    /// A surface without finite pixels yields NaN statistics and zero
    /// `valid_pixels`.
    pub fn of(surface: &Array2<f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in surface.iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self {
                peak_to_valley: f64::NAN,
                rms: f64::NAN,
                mean: f64::NAN,
                valid_pixels: 0,
            };
        }

        let mean = sum / count as f64;
        let variance = surface
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        Self {
            peak_to_valley: max - min,
            rms: variance.sqrt(),
            mean,
            valid_pixels: count,
        }
    }

    /// Same statistics with waves converted to nanometres.
    pub fn to_nanometers(&self, wavelength_nm: f64) -> Self {
        Self {
            peak_to_valley: self.peak_to_valley * wavelength_nm,
            rms: self.rms * wavelength_nm,
            mean: self.mean * wavelength_nm,
            valid_pixels: self.valid_pixels,
        }
    }
}

impl fmt::Display for SurfaceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PV {:.4}, RMS {:.4} over {} pixels",
            self.peak_to_valley, self.rms, self.valid_pixels
        )
    }
}
