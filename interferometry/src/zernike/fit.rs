//! Least-squares Zernike decomposition of an unwrapped surface.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::basis::ZernikeBasis;
use super::indexing::{ZernikeIndexing, ZernikeMode};
use crate::error::{ensure_shape, MetrologyError, Result};
use crate::grid::ImageSize;
use crate::mask::Mask;
use crate::unwrap::UnwrappedPhaseMap;

/// Smallest accepted ratio between the extreme singular values of the
/// design matrix before the system is treated as rank deficient. Also the
/// cutoff handed to the SVD solve.
const RANK_TOLERANCE: f64 = 1e-10;

/// Fitted Zernike coefficients in waves, tagged with their ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZernikeCoefficients {
    pub indexing: ZernikeIndexing,
    pub values: Vec<f64>,
}

impl ZernikeCoefficients {
    pub fn new(indexing: ZernikeIndexing, values: Vec<f64>) -> Self {
        Self { indexing, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<f64> {
        self.values.get(position).copied()
    }

    /// Coefficient of `mode`, zero when the mode was not fitted.
    pub fn of_mode(&self, mode: ZernikeMode) -> f64 {
        self.indexing
            .position(mode)
            .and_then(|p| self.get(p))
            .unwrap_or(0.0)
    }

    /// `(mode, coefficient)` pairs in storage order.
    pub fn iter_modes(&self) -> impl Iterator<Item = (ZernikeMode, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(p, &c)| self.indexing.mode(p).map(|mode| (mode, c)))
    }

    /// Zero every coefficient whose magnitude is below `floor`.
    pub fn zero_below(&mut self, floor: f64) {
        for c in self.values.iter_mut() {
            if c.abs() < floor {
                *c = 0.0;
            }
        }
    }

    /// Coefficients converted from waves to nanometres.
    pub fn to_nanometers(&self, wavelength_nm: f64) -> Vec<f64> {
        self.values.iter().map(|c| c * wavelength_nm).collect()
    }

    /// Coefficients converted from waves to micrometres.
    pub fn to_micrometers(&self, wavelength_nm: f64) -> Vec<f64> {
        self.values.iter().map(|c| c * wavelength_nm * 1e-3).collect()
    }

    /// Same coefficients laid out in another ordering.
    ///
    /// Modes absent from `target` are dropped; target positions without a
    /// source coefficient are zero.
    pub fn reindexed(&self, target: ZernikeIndexing, count: usize) -> Option<Self> {
        let modes = target.modes(count)?;
        let values = modes.into_iter().map(|mode| self.of_mode(mode)).collect();
        Some(Self::new(target, values))
    }
}

/// Fit `max_order` Zernike terms of `indexing` to `unwrapped` over `mask`.
///
/// Pixels must be valid in the mask and finite in the map to take part.
///
/// # Returns
/// Coefficients in waves (position 0 is piston), or
/// `NumericalNonConvergence` when fewer valid pixels than terms exist or the
/// system is rank deficient.
pub fn fit_zernike(
    unwrapped: &UnwrappedPhaseMap,
    mask: &Mask,
    max_order: usize,
    indexing: ZernikeIndexing,
) -> Result<ZernikeCoefficients> {
    let basis = ZernikeBasis::new(indexing, max_order, ImageSize::from(unwrapped.shape()))?;
    fit_with_basis(unwrapped, mask, &basis)
}

/// Fit over a precomputed basis (reused across several maps of one shape).
pub fn fit_with_basis(
    unwrapped: &UnwrappedPhaseMap,
    mask: &Mask,
    basis: &ZernikeBasis,
) -> Result<ZernikeCoefficients> {
    ensure_shape("Zernike fit mask", unwrapped.shape(), mask.shape())?;
    ensure_shape("Zernike basis", unwrapped.shape(), basis.size().shape())?;
    let max_order = basis.len();

    let pixels: Vec<(usize, usize)> = unwrapped
        .waves
        .indexed_iter()
        .filter(|&((i, j), v)| v.is_finite() && mask.is_valid(i, j))
        .map(|(idx, _)| idx)
        .collect();
    let valid_pixels = pixels.len();
    let non_convergence = MetrologyError::NumericalNonConvergence {
        max_order,
        valid_pixels,
    };
    if max_order == 0 || valid_pixels < max_order {
        return Err(non_convergence);
    }

    // Design matrix M (pixels x terms), column-major
    let design: Vec<f64> = (0..max_order)
        .into_par_iter()
        .flat_map_iter(|k| {
            let term = basis.term(k);
            pixels.iter().map(move |&idx| term.map_or(0.0, |t| t[idx]))
        })
        .collect();
    let a_matrix = DMatrix::from_vec(valid_pixels, max_order, design);
    let target = DVector::from_iterator(
        valid_pixels,
        pixels.iter().map(|&idx| unwrapped.waves[idx]),
    );

    // Solve M c = φ in the least-squares sense
    let svd = a_matrix.svd(true, true);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !(s_max > 0.0 && s_min / s_max > RANK_TOLERANCE) {
        debug!("Zernike design matrix singular values span [{s_min:.3e}, {s_max:.3e}]");
        return Err(non_convergence);
    }
    let solution = svd
        .solve(&target, RANK_TOLERANCE)
        .map_err(|_| non_convergence)?;

    info!(
        "fitted {} {:?} Zernike terms on {} pixels",
        max_order,
        basis.indexing(),
        valid_pixels
    );
    Ok(ZernikeCoefficients::new(
        basis.indexing(),
        solution.iter().copied().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn disk_setup(indexing: ZernikeIndexing, terms: usize) -> (ZernikeBasis, Mask) {
        let size = ImageSize::from_width_height(64, 64);
        (
            ZernikeBasis::new(indexing, terms, size).unwrap(),
            Mask::unit_disk(size),
        )
    }

    fn surface_from(basis: &ZernikeBasis, mask: &Mask, weights: &[f64]) -> UnwrappedPhaseMap {
        UnwrappedPhaseMap::new(mask.apply(&basis.combine(weights)).unwrap())
    }

    #[test]
    fn test_one_hot_recovery() {
        let (basis, mask) = disk_setup(ZernikeIndexing::Fringe, 15);
        // Tilt x, defocus, astigmatism 0°
        for position in [1, 3, 4] {
            let mut weights = vec![0.0; 15];
            weights[position] = 0.25;
            let map = surface_from(&basis, &mask, &weights);
            let coeffs = fit_with_basis(&map, &mask, &basis).unwrap();
            for (p, &c) in coeffs.values.iter().enumerate() {
                assert_abs_diff_eq!(c, weights[p], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_fit_ignores_nan_pixels() {
        let (basis, mask) = disk_setup(ZernikeIndexing::Noll, 6);
        let weights = [0.1, -0.2, 0.05, 0.3, 0.0, -0.1];
        let mut map = surface_from(&basis, &mask, &weights);
        for j in 20..30 {
            map.waves[[32, j]] = f64::NAN;
        }
        let coeffs = fit_with_basis(&map, &mask, &basis).unwrap();
        for (c, w) in coeffs.values.iter().zip(weights.iter()) {
            assert_abs_diff_eq!(c, w, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_small_aperture_high_order_fit() {
        // 5 px disk in a 64x64 frame: high orders are nearly collinear there
        let size = ImageSize::from_width_height(64, 64);
        let basis = ZernikeBasis::new(ZernikeIndexing::Fringe, 15, size).unwrap();
        let mask = Mask::circular(size, 31.5, 31.5, 5.0);
        let weights: Vec<f64> = (0..15).map(|k| 0.3 - 0.04 * k as f64).collect();
        let map = surface_from(&basis, &mask, &weights);

        let coeffs = fit_with_basis(&map, &mask, &basis).unwrap();
        for (c, w) in coeffs.values.iter().zip(&weights) {
            assert_abs_diff_eq!(c, w, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_too_few_pixels_does_not_converge() {
        let size = ImageSize::from_width_height(32, 32);
        let mask = Mask::circular(size, 16.0, 16.0, 1.0);
        let map = UnwrappedPhaseMap::new(Array2::zeros((32, 32)));
        let err = fit_zernike(&map, &mask, 15, ZernikeIndexing::Fringe).unwrap_err();
        assert!(matches!(
            err,
            MetrologyError::NumericalNonConvergence {
                max_order: 15,
                valid_pixels: 5
            }
        ));
    }

    #[test]
    fn test_rank_deficient_region() {
        // A single row of pixels cannot separate y-dependent terms
        let mut valid = Array2::from_elem((32, 32), false);
        for j in 0..32 {
            valid[[16, j]] = true;
        }
        let mask = Mask::new(valid);
        let map = UnwrappedPhaseMap::new(Array2::zeros((32, 32)));
        assert!(matches!(
            fit_zernike(&map, &mask, 6, ZernikeIndexing::Noll),
            Err(MetrologyError::NumericalNonConvergence { .. })
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let map = UnwrappedPhaseMap::new(Array2::zeros((8, 8)));
        let mask = Mask::all_valid(ImageSize::from_width_height(4, 8));
        assert!(matches!(
            fit_zernike(&map, &mask, 3, ZernikeIndexing::Noll),
            Err(MetrologyError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_coefficient_helpers() {
        let mut coeffs = ZernikeCoefficients::new(ZernikeIndexing::Fringe, vec![0.5, 1e-4, -0.2, 0.1]);
        assert_eq!(coeffs.of_mode(ZernikeMode::new(1, -1)), -0.2);
        assert_eq!(coeffs.of_mode(ZernikeMode::new(4, 0)), 0.0);

        coeffs.zero_below(1e-3);
        assert_eq!(coeffs.values, vec![0.5, 0.0, -0.2, 0.1]);
        assert_abs_diff_eq!(coeffs.to_micrometers(632.8)[0], 0.3164, epsilon = 1e-12);
        assert_abs_diff_eq!(coeffs.to_nanometers(632.8)[2], -126.56, epsilon = 1e-9);

        let noll = coeffs.reindexed(ZernikeIndexing::Noll, 4).unwrap();
        // Noll position 3 is defocus, Fringe position 3 as well
        assert_eq!(noll.values, vec![0.5, 0.0, -0.2, 0.1]);
        let ansi = coeffs.reindexed(ZernikeIndexing::Ansi, 3).unwrap();
        assert_eq!(ansi.values, vec![0.5, -0.2, 0.0]);
    }
}
