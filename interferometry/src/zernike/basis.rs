//! Zernike polynomials evaluated on a frame grid.
//!
//! Polynomials are RMS-normalised over the unit disk:
//!
//! ```text
//! Z(n, m) = N(n, m) · R(n, |m|)(ρ) · { cos(mθ)   m > 0
//!                                    { sin(|m|θ) m < 0
//!                                    { 1         m = 0
//! ```
//!
//! The grid spans `[-1, 1]` along both axes of the frame; values outside the
//! unit disk are evaluated as well and excluded through the fit mask.

use ndarray::{Array2, Zip};
use rayon::prelude::*;

use super::indexing::{ZernikeIndexing, ZernikeMode};
use crate::error::{MetrologyError, Result};
use crate::grid::ImageSize;

/// Radial polynomial `R(n, |m|)` at radius `rho`.
pub fn radial(n: u32, m: i32, rho: f64) -> f64 {
    let abs_m = m.unsigned_abs();
    if abs_m > n || (n - abs_m) % 2 != 0 {
        return 0.0;
    }
    let half_sum = (n + abs_m) / 2;
    let half_diff = (n - abs_m) / 2;
    (0..=half_diff)
        .map(|s| {
            let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
            let coeff = factorial(n - s)
                / (factorial(s) * factorial(half_sum - s) * factorial(half_diff - s));
            sign * coeff * rho.powi((n - 2 * s) as i32)
        })
        .sum()
}

fn factorial(k: u32) -> f64 {
    (1..=k).map(f64::from).product()
}

/// Normalised Zernike polynomial at polar coordinates `(rho, theta)`.
pub fn zernike(mode: ZernikeMode, rho: f64, theta: f64) -> f64 {
    let angular = match mode.m {
        0 => 1.0,
        m if m > 0 => (m as f64 * theta).cos(),
        m => (m.unsigned_abs() as f64 * theta).sin(),
    };
    mode.normalization() * radial(mode.n, mode.m, rho) * angular
}

/// Zernike modes of one ordering evaluated over a frame.
#[derive(Debug, Clone)]
pub struct ZernikeBasis {
    indexing: ZernikeIndexing,
    modes: Vec<ZernikeMode>,
    size: ImageSize,
    terms: Vec<Array2<f64>>,
}

impl ZernikeBasis {
    /// Evaluate the first `count` modes of `indexing` over a frame of `size`.
    ///
    /// Fails with `InvalidParameter` if the ordering has fewer than `count` terms.
    pub fn new(indexing: ZernikeIndexing, count: usize, size: ImageSize) -> Result<Self> {
        let modes = indexing.modes(count).ok_or_else(|| {
            MetrologyError::InvalidParameter(format!(
                "{indexing:?} indexing has no {count} terms"
            ))
        })?;

        let (x, y) = size.normalized_coordinates();
        let mut rho = Array2::<f64>::zeros(size.shape());
        let mut theta = Array2::<f64>::zeros(size.shape());
        Zip::from(&mut rho)
            .and(&mut theta)
            .and(&x)
            .and(&y)
            .for_each(|r, t, &x, &y| {
                *r = x.hypot(y);
                *t = y.atan2(x);
            });

        let terms = modes
            .par_iter()
            .map(|&mode| {
                Zip::from(&rho)
                    .and(&theta)
                    .map_collect(|&r, &t| zernike(mode, r, t))
            })
            .collect();

        Ok(Self {
            indexing,
            modes,
            size,
            terms,
        })
    }

    pub fn indexing(&self) -> ZernikeIndexing {
        self.indexing
    }

    pub fn modes(&self) -> &[ZernikeMode] {
        &self.modes
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluated term at `position`.
    pub fn term(&self, position: usize) -> Option<&Array2<f64>> {
        self.terms.get(position)
    }

    /// `Σ weights[i]·Z_i` over the frame, extra weights beyond the basis ignored.
    pub fn combine(&self, weights: &[f64]) -> Array2<f64> {
        let mut surface = Array2::<f64>::zeros(self.size.shape());
        for (term, &w) in self.terms.iter().zip(weights) {
            if w != 0.0 {
                surface.scaled_add(w, term);
            }
        }
        surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Mask;
    use approx::assert_relative_eq;

    #[test]
    fn test_radial_polynomials() {
        let rho = 0.6;
        assert_relative_eq!(radial(0, 0, rho), 1.0);
        assert_relative_eq!(radial(1, 1, rho), rho);
        assert_relative_eq!(radial(2, 0, rho), 2.0 * rho * rho - 1.0);
        assert_relative_eq!(radial(3, 1, rho), 3.0 * rho.powi(3) - 2.0 * rho, epsilon = 1e-12);
        assert_relative_eq!(
            radial(4, 0, rho),
            6.0 * rho.powi(4) - 6.0 * rho * rho + 1.0,
            epsilon = 1e-12
        );
        assert_eq!(radial(3, 0, rho), 0.0);
        // R(n, m)(1) = 1 for every valid pair
        for (n, m) in [(5, 1), (6, 4), (8, 0), (12, 0)] {
            assert_relative_eq!(radial(n, m, 1.0), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normalised_low_orders() {
        let (rho, theta) = (0.5, 0.3);
        assert_relative_eq!(zernike(ZernikeMode::new(1, 1), rho, theta), 2.0 * rho * theta.cos());
        assert_relative_eq!(zernike(ZernikeMode::new(1, -1), rho, theta), 2.0 * rho * theta.sin());
        assert_relative_eq!(
            zernike(ZernikeMode::new(2, 0), rho, theta),
            3f64.sqrt() * (2.0 * rho * rho - 1.0)
        );
        assert_relative_eq!(
            zernike(ZernikeMode::new(2, -2), rho, theta),
            6f64.sqrt() * rho * rho * (2.0 * theta).sin(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_basis_is_orthonormal_on_disk() {
        let size = ImageSize::from_width_height(201, 201);
        let basis = ZernikeBasis::new(ZernikeIndexing::Fringe, 9, size).unwrap();
        let disk = Mask::unit_disk(size);
        let n = disk.count() as f64;

        for a in 0..basis.len() {
            for b in 0..basis.len() {
                let mut dot = 0.0;
                Zip::from(basis.term(a).unwrap())
                    .and(basis.term(b).unwrap())
                    .and(disk.valid())
                    .for_each(|&za, &zb, &ok| {
                        if ok {
                            dot += za * zb;
                        }
                    });
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!(
                    (dot / n - expected).abs() < 0.05,
                    "<Z{a}, Z{b}> = {}",
                    dot / n
                );
            }
        }
    }

    #[test]
    fn test_combine_and_bounds() {
        let size = ImageSize::from_width_height(16, 12);
        let basis = ZernikeBasis::new(ZernikeIndexing::Noll, 4, size).unwrap();
        assert_eq!(basis.len(), 4);
        let surface = basis.combine(&[0.5, 0.0, 0.0, 0.0, 9.0]);
        assert!(surface.iter().all(|&v| (v - 0.5).abs() < 1e-12));
        assert!(ZernikeBasis::new(ZernikeIndexing::Fringe, 40, size).is_err());
    }
}
