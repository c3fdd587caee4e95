//! Modulation transfer function.

use log::warn;
use ndarray::Array2;
use num_complex::Complex64;

use super::fft::centered_fft2;
use super::psf::Psf;

/// Modulus of the optical transfer function, zero frequency at `ne / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mtf {
    pub modulation: Array2<f64>,
    /// False when the transform vanished and no normalisation applied
    pub normalized: bool,
}

impl Mtf {
    /// Profile from zero frequency along the positive column axis.
    pub fn horizontal_profile(&self) -> Vec<f64> {
        let (h, w) = self.modulation.dim();
        (w / 2..w).map(|j| self.modulation[[h / 2, j]]).collect()
    }
}

/// `|FFT2(PSF)|` with centred shifts, divided by its maximum.
pub fn mtf(psf: &Psf) -> Mtf {
    mtf_of(&psf.intensity)
}

/// [`mtf`] of a bare intensity array.
pub fn mtf_of(intensity: &Array2<f64>) -> Mtf {
    let field = intensity.mapv(|v| Complex64::new(v, 0.0));
    let mut modulation = centered_fft2(&field).mapv(|c| c.norm());

    let peak = modulation.iter().copied().fold(0.0, f64::max);
    let normalized = peak > 0.0;
    if normalized {
        modulation.mapv_inplace(|v| v / peak);
    } else {
        warn!("MTF has zero peak, left unnormalised");
    }
    Mtf {
        modulation,
        normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ImageSize;
    use crate::mask::Mask;
    use crate::optics::psf::psf;
    use approx::assert_relative_eq;

    #[test]
    fn test_diffraction_limited_mtf() {
        let mask = Mask::unit_disk(ImageSize::from_width_height(64, 64));
        let psf = psf(&Array2::zeros((64, 64)), &mask, 2, 128).unwrap();
        let mtf = mtf(&psf);

        assert!(mtf.normalized);
        assert_relative_eq!(mtf.modulation[[64, 64]], 1.0, epsilon = 1e-12);

        let profile = mtf.horizontal_profile();
        assert_eq!(profile.len(), 64);
        for k in 0..30 {
            assert!(profile[k + 1] <= profile[k] + 1e-9, "MTF rises at {k}");
        }
        // Cut-off at the pupil diameter, 32 samples
        assert!(profile[40..].iter().all(|&v| v < 1e-9));
        // Symmetric about zero frequency
        assert_relative_eq!(mtf.modulation[[64, 60]], mtf.modulation[[64, 68]], epsilon = 1e-12);
    }

    #[test]
    fn test_zero_psf_is_left_alone() {
        let mtf = mtf_of(&Array2::zeros((8, 8)));
        assert!(!mtf.normalized);
        assert!(mtf.modulation.iter().all(|&v| v == 0.0));
    }
}
