//! Encircled ("circled") energy of a PSF around its centroid.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, Result};

/// Cumulative energy fraction against integer radius in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircledEnergy {
    /// Radii in PSF pixels, `0, 1, .., r_max`
    pub radii: Vec<f64>,
    /// Fraction of energy strictly inside each radius
    pub energy: Vec<f64>,
    /// Same curve for the reference PSF, when given
    pub reference: Option<Vec<f64>>,
}

impl CircledEnergy {
    /// Radii converted to micrometres in the focal plane.
    ///
    /// One PSF pixel spans `λ·N / 2^zoom`.
    pub fn radii_micrometers(&self, wavelength_nm: f64, f_number: f64, zoom: u32) -> Vec<f64> {
        let pixel_um = wavelength_nm * 1e-3 * f_number / 2f64.powi(zoom as i32);
        self.radii.iter().map(|r| r * pixel_um).collect()
    }

    /// Smallest radius (pixels) enclosing at least `fraction` of the energy.
    pub fn radius_enclosing(&self, fraction: f64) -> Option<f64> {
        self.energy
            .iter()
            .position(|&e| e >= fraction)
            .map(|i| self.radii[i])
    }
}

/// Intensity-weighted centroid `(x, y)` in pixels, `None` for zero energy.
pub fn centroid(intensity: &Array2<f64>) -> Option<(f64, f64)> {
    let mut total = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for ((row, col), &v) in intensity.indexed_iter() {
        total += v;
        sx += col as f64 * v;
        sy += row as f64 * v;
    }
    (total > 0.0).then(|| (sx / total, sy / total))
}

/// Energy fraction inside integer radii `0..=r_max` around the centroid.
///
/// `r_max` exceeds the distance to the farthest corner, so the curve ends at
/// exactly 1. A PSF with no energy yields a curve of zeros.
fn energy_curve(intensity: &Array2<f64>, r_max: usize) -> Vec<f64> {
    let Some((cx, cy)) = centroid(intensity) else {
        return vec![0.0; r_max + 1];
    };
    // Pixel at distance d first counts for radius floor(d) + 1
    let mut bins = vec![0.0; r_max + 1];
    for ((row, col), &v) in intensity.indexed_iter() {
        let d = (col as f64 - cx).hypot(row as f64 - cy);
        let k = (d.floor() as usize + 1).min(r_max);
        bins[k] += v;
    }
    let mut cumulative = 0.0;
    let mut curve: Vec<f64> = bins
        .iter()
        .map(|b| {
            cumulative += b;
            cumulative
        })
        .collect();
    let total = cumulative;
    for e in curve.iter_mut() {
        *e /= total;
    }
    curve
}

/// Circled-energy curve of `psf`, and of `reference` when given.
///
/// Each curve is taken around its own centroid and normalised by its own
/// energy.
pub fn circled_energy(
    psf: &Array2<f64>,
    reference: Option<&Array2<f64>>,
) -> Result<CircledEnergy> {
    if let Some(reference) = reference {
        ensure_shape("circled energy reference", psf.dim(), reference.dim())?;
    }
    let (h, w) = psf.dim();
    let r_max = (h as f64).hypot(w as f64).ceil() as usize + 1;

    Ok(CircledEnergy {
        radii: (0..=r_max).map(|r| r as f64).collect(),
        energy: energy_curve(psf, r_max),
        reference: reference.map(|r| energy_curve(r, r_max)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetrologyError;
    use crate::grid::ImageSize;
    use crate::mask::Mask;
    use crate::optics::psf::psf_with_reference;
    use crate::zernike::{ZernikeBasis, ZernikeIndexing};
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_centroid() {
        let image = array![
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 1.0, 1.0, 1.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0]
        ];
        assert_eq!(centroid(&image), Some((2.0, 2.0)));
        assert_eq!(centroid(&Array2::zeros((3, 3))), None);
    }

    #[test]
    fn test_point_source_curve() {
        let mut image = Array2::<f64>::zeros((9, 9));
        image[[4, 4]] = 2.0;
        let ce = circled_energy(&image, None).unwrap();
        assert_eq!(ce.energy[0], 0.0);
        assert_eq!(ce.energy[1], 1.0);
        assert_eq!(*ce.energy.last().unwrap(), 1.0);
        assert_eq!(ce.radius_enclosing(0.5), Some(1.0));
    }

    #[test]
    fn test_airy_curve_monotone_and_bounded() {
        let size = ImageSize::from_width_height(64, 64);
        let mask = Mask::unit_disk(size);
        let basis = ZernikeBasis::new(ZernikeIndexing::Fringe, 9, size).unwrap();
        let coma = basis.combine(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1]);
        let (measured, reference) = psf_with_reference(&coma, &mask, 2, 128).unwrap();

        let ce = circled_energy(&measured.intensity, Some(&reference.intensity)).unwrap();
        let reference_curve = ce.reference.clone().unwrap();
        for curve in [&ce.energy, &reference_curve] {
            assert!(curve.windows(2).all(|w| w[1] >= w[0]));
            assert_eq!(*curve.last().unwrap(), 1.0);
        }
        // Aberrations spread energy outwards
        let r = 5;
        assert!(reference_curve[r] > ce.energy[r]);
        // Most of the diffraction-limited energy sits inside the first dark ring
        assert!(reference_curve[6] > 0.8);
    }

    #[test]
    fn test_zero_energy_and_shape_checks() {
        let ce = circled_energy(&Array2::zeros((4, 4)), None).unwrap();
        assert!(ce.energy.iter().all(|&e| e == 0.0));

        let err = circled_energy(&Array2::zeros((4, 4)), Some(&Array2::zeros((4, 5))));
        assert!(matches!(err, Err(MetrologyError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_micrometre_radii() {
        let ce = CircledEnergy {
            radii: vec![0.0, 1.0, 2.0],
            energy: vec![0.0, 0.5, 1.0],
            reference: None,
        };
        let um = ce.radii_micrometers(632.8, 10.0, 2);
        assert_relative_eq!(um[1], 1.582, epsilon = 1e-12);
        assert_relative_eq!(um[2], 3.164, epsilon = 1e-12);
    }
}
