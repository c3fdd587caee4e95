//! Named aberration groups and their removal from a measured surface.
//!
//! Groups are defined by their `(n, m)` modes so that a selection means the
//! same thing whatever ordering the coefficients use.

use log::debug;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::basis::ZernikeBasis;
use super::fit::ZernikeCoefficients;
use super::indexing::{ZernikeIndexing, ZernikeMode};
use crate::error::{ensure_shape, MetrologyError, Result};
use crate::grid::ImageSize;
use crate::unwrap::UnwrappedPhaseMap;

/// Classical aberration families, suffixed by their wavefront order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aberration {
    Piston,
    Tilt,
    Defocus,
    Astigmatism3,
    Coma3,
    Spherical3,
    Trefoil5,
    Astigmatism5,
    Coma5,
    Spherical5,
    Quadrafoil7,
    Trefoil7,
    Astigmatism7,
    Coma7,
    Spherical7,
    Pentafoil9,
    Quadrafoil9,
    Trefoil9,
    Astigmatism9,
    Coma9,
    Spherical9,
    Spherical11,
}

impl Aberration {
    pub const ALL: [Aberration; 22] = [
        Aberration::Piston,
        Aberration::Tilt,
        Aberration::Defocus,
        Aberration::Astigmatism3,
        Aberration::Coma3,
        Aberration::Spherical3,
        Aberration::Trefoil5,
        Aberration::Astigmatism5,
        Aberration::Coma5,
        Aberration::Spherical5,
        Aberration::Quadrafoil7,
        Aberration::Trefoil7,
        Aberration::Astigmatism7,
        Aberration::Coma7,
        Aberration::Spherical7,
        Aberration::Pentafoil9,
        Aberration::Quadrafoil9,
        Aberration::Trefoil9,
        Aberration::Astigmatism9,
        Aberration::Coma9,
        Aberration::Spherical9,
        Aberration::Spherical11,
    ];

    /// Radial degree and azimuthal order `(n, |m|)` of the group.
    fn order(&self) -> (u32, u32) {
        match self {
            Aberration::Piston => (0, 0),
            Aberration::Tilt => (1, 1),
            Aberration::Defocus => (2, 0),
            Aberration::Astigmatism3 => (2, 2),
            Aberration::Coma3 => (3, 1),
            Aberration::Spherical3 => (4, 0),
            Aberration::Trefoil5 => (3, 3),
            Aberration::Astigmatism5 => (4, 2),
            Aberration::Coma5 => (5, 1),
            Aberration::Spherical5 => (6, 0),
            Aberration::Quadrafoil7 => (4, 4),
            Aberration::Trefoil7 => (5, 3),
            Aberration::Astigmatism7 => (6, 2),
            Aberration::Coma7 => (7, 1),
            Aberration::Spherical7 => (8, 0),
            Aberration::Pentafoil9 => (5, 5),
            Aberration::Quadrafoil9 => (6, 4),
            Aberration::Trefoil9 => (7, 3),
            Aberration::Astigmatism9 => (8, 2),
            Aberration::Coma9 => (9, 1),
            Aberration::Spherical9 => (10, 0),
            Aberration::Spherical11 => (12, 0),
        }
    }

    /// Zernike modes of the group (cosine then sine for `m ≠ 0`).
    pub fn modes(&self) -> Vec<ZernikeMode> {
        let (n, m) = self.order();
        if m == 0 {
            vec![ZernikeMode::new(n, 0)]
        } else {
            vec![ZernikeMode::new(n, m as i32), ZernikeMode::new(n, -(m as i32))]
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aberration::Piston => "piston",
            Aberration::Tilt => "tilt",
            Aberration::Defocus => "defocus",
            Aberration::Astigmatism3 => "astigmatism3",
            Aberration::Coma3 => "coma3",
            Aberration::Spherical3 => "spherical3",
            Aberration::Trefoil5 => "trefoil5",
            Aberration::Astigmatism5 => "astigmatism5",
            Aberration::Coma5 => "coma5",
            Aberration::Spherical5 => "spherical5",
            Aberration::Quadrafoil7 => "quadrafoil7",
            Aberration::Trefoil7 => "trefoil7",
            Aberration::Astigmatism7 => "astigmatism7",
            Aberration::Coma7 => "coma7",
            Aberration::Spherical7 => "spherical7",
            Aberration::Pentafoil9 => "pentafoil9",
            Aberration::Quadrafoil9 => "quadrafoil9",
            Aberration::Trefoil9 => "trefoil9",
            Aberration::Astigmatism9 => "astigmatism9",
            Aberration::Coma9 => "coma9",
            Aberration::Spherical9 => "spherical9",
            Aberration::Spherical11 => "spherical11",
        }
    }

    /// Group containing `mode`, if any.
    pub fn of_mode(mode: ZernikeMode) -> Option<Aberration> {
        Self::ALL
            .into_iter()
            .find(|a| a.order() == (mode.n, mode.m.unsigned_abs()))
    }
}

impl std::str::FromStr for Aberration {
    type Err = MetrologyError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        // Short aliases for the primary aberrations
        let key = match key.as_str() {
            "astigmatism" | "astig" | "astig3" => "astigmatism3",
            "coma" => "coma3",
            "spherical" | "sphere" | "sphere3" => "spherical3",
            "trefoil" => "trefoil5",
            "focus" => "defocus",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|a| a.name() == key)
            .ok_or_else(|| MetrologyError::InvalidParameter(format!("unknown aberration '{s}'")))
    }
}

/// Set of coefficient positions selected for removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AberrationSelection {
    positions: BTreeSet<usize>,
}

impl AberrationSelection {
    /// Select explicit coefficient positions.
    pub fn from_positions<I: IntoIterator<Item = usize>>(positions: I) -> Self {
        Self {
            positions: positions.into_iter().collect(),
        }
    }

    /// Select every mode of `groups` present in the first `count` positions
    /// of `indexing`.
    pub fn from_groups(groups: &[Aberration], indexing: ZernikeIndexing, count: usize) -> Self {
        let positions = groups
            .iter()
            .flat_map(|g| g.modes())
            .filter_map(|mode| indexing.position(mode))
            .filter(|&p| p < count)
            .collect();
        Self { positions }
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.contains(&position)
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Surface with the selected aberrations subtracted, in waves.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedWavefront {
    pub waves: Array2<f64>,
    /// Sum of the subtracted terms, evaluated over the whole frame
    pub correction: Array2<f64>,
}

impl CorrectedWavefront {
    pub fn shape(&self) -> (usize, usize) {
        self.waves.dim()
    }
}

/// Subtract `Σ c_i Z_i` over the selected positions from `unwrapped`.
///
/// NaN pixels of the input stay NaN. Selected positions beyond the
/// coefficient vector are ignored.
pub fn remove_aberrations(
    unwrapped: &UnwrappedPhaseMap,
    coefficients: &ZernikeCoefficients,
    selected: &AberrationSelection,
) -> Result<CorrectedWavefront> {
    let basis = ZernikeBasis::new(
        coefficients.indexing,
        coefficients.len(),
        ImageSize::from(unwrapped.shape()),
    )?;
    remove_with_basis(unwrapped, coefficients, selected, &basis)
}

/// [`remove_aberrations`] over a precomputed basis.
pub fn remove_with_basis(
    unwrapped: &UnwrappedPhaseMap,
    coefficients: &ZernikeCoefficients,
    selected: &AberrationSelection,
    basis: &ZernikeBasis,
) -> Result<CorrectedWavefront> {
    ensure_shape("aberration removal basis", unwrapped.shape(), basis.size().shape())?;
    if basis.indexing() != coefficients.indexing {
        return Err(MetrologyError::InvalidParameter(format!(
            "basis uses {:?} indexing, coefficients use {:?}",
            basis.indexing(),
            coefficients.indexing
        )));
    }
    let weights: Vec<f64> = coefficients
        .values
        .iter()
        .enumerate()
        .map(|(p, &c)| if selected.contains(p) { c } else { 0.0 })
        .collect();
    let correction = basis.combine(&weights);

    let mut waves = unwrapped.waves.clone();
    Zip::from(&mut waves)
        .and(&correction)
        .for_each(|w, &c| *w -= c);

    debug!(
        "removed {} terms from {}x{} surface",
        selected.positions().filter(|&p| p < coefficients.len()).count(),
        unwrapped.shape().1,
        unwrapped.shape().0
    );
    Ok(CorrectedWavefront { waves, correction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Mask;
    use crate::stats::SurfaceStatistics;
    use crate::zernike::fit::fit_with_basis;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_group_positions_in_fringe() {
        let fringe = ZernikeIndexing::Fringe;
        let expected: [(Aberration, &[usize]); 6] = [
            (Aberration::Piston, &[0]),
            (Aberration::Tilt, &[1, 2]),
            (Aberration::Defocus, &[3]),
            (Aberration::Trefoil5, &[9, 10]),
            (Aberration::Spherical5, &[15]),
            (Aberration::Spherical11, &[36]),
        ];
        for (group, positions) in expected {
            let selection = AberrationSelection::from_groups(&[group], fringe, 37);
            assert_eq!(selection.positions().collect::<Vec<_>>(), positions.to_vec());
        }
        // Groups beyond the fitted terms select nothing
        assert!(AberrationSelection::from_groups(&[Aberration::Coma9], fringe, 16).is_empty());
    }

    #[test]
    fn test_groups_cover_fringe_set_once() {
        let mut seen = BTreeSet::new();
        for group in Aberration::ALL {
            for mode in group.modes() {
                let p = ZernikeIndexing::Fringe.position(mode).unwrap();
                assert!(seen.insert(p));
                assert_eq!(Aberration::of_mode(mode), Some(group));
            }
        }
        assert_eq!(seen.len(), 37);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Tilt".parse::<Aberration>().unwrap(), Aberration::Tilt);
        assert_eq!("coma".parse::<Aberration>().unwrap(), Aberration::Coma3);
        assert_eq!("astigmatism5".parse::<Aberration>().unwrap(), Aberration::Astigmatism5);
        assert!("wobble".parse::<Aberration>().is_err());
        for group in Aberration::ALL {
            assert_eq!(group.name().parse::<Aberration>().unwrap(), group);
        }
    }

    #[test]
    fn test_full_removal_leaves_flat_surface() {
        let size = ImageSize::from_width_height(48, 48);
        let mask = Mask::unit_disk(size);
        let basis = ZernikeBasis::new(ZernikeIndexing::Fringe, 16, size).unwrap();
        let weights: Vec<f64> = (0..16).map(|k| 0.05 * (k as f64 - 7.5)).collect();
        let unwrapped = UnwrappedPhaseMap::new(mask.apply(&basis.combine(&weights)).unwrap());

        let coeffs = fit_with_basis(&unwrapped, &mask, &basis).unwrap();
        let all = AberrationSelection::from_positions(0..16);
        let corrected = remove_with_basis(&unwrapped, &coeffs, &all, &basis).unwrap();

        let stats = SurfaceStatistics::of(&corrected.waves);
        assert_abs_diff_eq!(stats.rms, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.peak_to_valley, 0.0, epsilon = 1e-8);
        for (c, u) in corrected.waves.iter().zip(unwrapped.waves.iter()) {
            assert_eq!(c.is_nan(), u.is_nan());
        }
    }

    #[test]
    fn test_partial_removal_keeps_other_terms() {
        let size = ImageSize::from_width_height(40, 40);
        let basis = ZernikeBasis::new(ZernikeIndexing::Noll, 6, size).unwrap();
        let weights = [0.0, 0.3, 0.0, 0.2, 0.0, 0.0];
        let unwrapped = UnwrappedPhaseMap::new(basis.combine(&weights));
        let coeffs = ZernikeCoefficients::new(ZernikeIndexing::Noll, weights.to_vec());

        let tilt = AberrationSelection::from_groups(&[Aberration::Tilt], ZernikeIndexing::Noll, 6);
        let corrected = remove_with_basis(&unwrapped, &coeffs, &tilt, &basis).unwrap();
        let defocus_only = basis.combine(&[0.0, 0.0, 0.0, 0.2, 0.0, 0.0]);
        for (c, d) in corrected.waves.iter().zip(defocus_only.iter()) {
            assert_abs_diff_eq!(c, d, epsilon = 1e-12);
        }

        let ansi_basis = ZernikeBasis::new(ZernikeIndexing::Ansi, 6, size).unwrap();
        assert!(remove_with_basis(&unwrapped, &coeffs, &tilt, &ansi_basis).is_err());
    }
}
