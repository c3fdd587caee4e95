//! Single-index orderings of Zernike modes.
//!
//! A mode is identified by its radial degree `n` and azimuthal frequency `m`
//! (`m > 0` cosine, `m < 0` sine). Coefficient vectors are addressed by a
//! 0-based position whose meaning depends on the [`ZernikeIndexing`]; position
//! 0 is piston in every ordering.

use serde::{Deserialize, Serialize};

/// Radial degree and signed azimuthal frequency of a Zernike mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZernikeMode {
    pub n: u32,
    pub m: i32,
}

impl ZernikeMode {
    pub const fn new(n: u32, m: i32) -> Self {
        Self { n, m }
    }

    /// RMS normalisation over the unit disk.
    pub fn normalization(&self) -> f64 {
        let n = self.n as f64;
        if self.m == 0 {
            (n + 1.0).sqrt()
        } else {
            (2.0 * (n + 1.0)).sqrt()
        }
    }
}

/// Number of terms of the Fringe ordering
pub const FRINGE_TERMS: usize = 37;

/// Ordering used to lay Zernike modes out in coefficient vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZernikeIndexing {
    /// University of Arizona Fringe ordering, 37 terms
    Fringe,
    /// Noll (1976) ordering
    Noll,
    /// OSA/ANSI Z80.28 ordering
    Ansi,
}

impl ZernikeIndexing {
    /// Largest supported number of terms, `None` when unbounded.
    pub fn max_terms(&self) -> Option<usize> {
        match self {
            ZernikeIndexing::Fringe => Some(FRINGE_TERMS),
            ZernikeIndexing::Noll | ZernikeIndexing::Ansi => None,
        }
    }

    /// Mode stored at 0-based `position`.
    pub fn mode(&self, position: usize) -> Option<ZernikeMode> {
        match self {
            ZernikeIndexing::Fringe => fringe_mode(position),
            ZernikeIndexing::Noll => Some(noll_mode(position + 1)),
            ZernikeIndexing::Ansi => Some(ansi_mode(position)),
        }
    }

    /// 0-based position of `mode`, `None` if the ordering does not hold it.
    pub fn position(&self, mode: ZernikeMode) -> Option<usize> {
        if mode.m.unsigned_abs() > mode.n || (mode.n - mode.m.unsigned_abs()) % 2 != 0 {
            return None;
        }
        match self {
            ZernikeIndexing::Ansi => {
                let n = mode.n as i64;
                Some(((n * (n + 2) + mode.m as i64) / 2) as usize)
            }
            ZernikeIndexing::Noll => {
                let n = mode.n as usize;
                let first = n * (n + 1) / 2;
                (first..first + n + 1).find(|&p| noll_mode(p + 1) == mode)
            }
            ZernikeIndexing::Fringe => (0..FRINGE_TERMS).find(|&p| fringe_mode(p) == Some(mode)),
        }
    }

    /// Modes of the first `count` positions.
    pub fn modes(&self, count: usize) -> Option<Vec<ZernikeMode>> {
        (0..count).map(|p| self.mode(p)).collect()
    }
}

/// Degree `n` of the row holding the `index`-th mode when rows hold
/// `n + 1` modes each (Noll and ANSI triangular layout, 0-based index).
fn triangular_row(index: usize) -> usize {
    let mut n = 0;
    while (n + 1) * (n + 2) / 2 <= index {
        n += 1;
    }
    n
}

/// Noll mode for the 1-based index `j`.
fn noll_mode(j: usize) -> ZernikeMode {
    let n = triangular_row(j - 1);
    let p = j - n * (n + 1) / 2;
    let abs_m = (if n % 2 == 0 {
        2 * (p / 2)
    } else {
        2 * ((p - 1) / 2) + 1
    }) as i32;
    let m = if abs_m == 0 || j % 2 == 0 { abs_m } else { -abs_m };
    ZernikeMode::new(n as u32, m)
}

fn ansi_mode(j: usize) -> ZernikeMode {
    let n = triangular_row(j);
    let m = 2 * j as i64 - (n * (n + 2)) as i64;
    ZernikeMode::new(n as u32, m as i32)
}

/// Fringe ordering: terms grouped by `(n + |m|) / 2`, decreasing `|m|` inside
/// a group, cosine before sine. The 37th term is the (12, 0) spherical.
fn fringe_mode(position: usize) -> Option<ZernikeMode> {
    if position >= FRINGE_TERMS {
        return None;
    }
    if position == FRINGE_TERMS - 1 {
        return Some(ZernikeMode::new(12, 0));
    }
    let mut remaining = position;
    for group in 0u32.. {
        for abs_m in (0..=group).rev() {
            let n = 2 * group - abs_m;
            let count = if abs_m == 0 { 1 } else { 2 };
            if remaining < count {
                let m = if remaining == 0 { abs_m as i32 } else { -(abs_m as i32) };
                return Some(ZernikeMode::new(n, m));
            }
            remaining -= count;
        }
    }
    None
}
