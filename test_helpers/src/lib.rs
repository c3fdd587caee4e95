//! Testing infrastructure for the interferometry workspace.
//!
//! Generators for synthetic phase-shifted interferograms with known ground
//! truth.
//!
//! # Synthetic Acquisitions
//! Frames follow the five-step convention used by the demodulator,
//! `I_k = A + B·cos(φ + π − k·π/2)` for `k = 0..5`, so a phase map `φ` fed
//! through [`phase_shifted_frames`] demodulates back to `φ` wrapped into
//! `(-π, π]`.
//!
//! ```rust
//! use test_helpers::{phase_shifted_frames, polynomial_phase};
//!
//! // Tilt plus defocus, in waves, over a 32x32 frame
//! let phase = polynomial_phase(32, 32, |x, y| 0.5 * x + 0.3 * (x * x + y * y));
//! let frames = phase_shifted_frames(&phase, 100.0, 50.0);
//! assert_eq!(frames[0].dim(), (32, 32));
//! ```

use ndarray::Array2;
use std::f64::consts::PI;

/// Phase map in radians from a surface given in waves over `[-1, 1]²`.
///
/// `x` runs along columns and `y` along rows, both spanning the full frame.
pub fn polynomial_phase<F>(rows: usize, cols: usize, surface: F) -> Array2<f64>
where
    F: Fn(f64, f64) -> f64,
{
    let coord = |i: usize, n: usize| {
        if n > 1 {
            -1.0 + 2.0 * i as f64 / (n - 1) as f64
        } else {
            -1.0
        }
    };
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        2.0 * PI * surface(coord(j, cols), coord(i, rows))
    })
}

/// Five interferograms of `phase` with bias `bias` and fringe modulation
/// `modulation`.
pub fn phase_shifted_frames(phase: &Array2<f64>, bias: f64, modulation: f64) -> [Array2<f64>; 5] {
    std::array::from_fn(|k| {
        let step = k as f64 * PI / 2.0;
        phase.mapv(|p| bias + modulation * (p + PI - step).cos())
    })
}

/// Disk of `true` pixels centred in the frame.
pub fn centered_disk(rows: usize, cols: usize, radius: f64) -> Array2<bool> {
    let cy = (rows as f64 - 1.0) / 2.0;
    let cx = (cols as f64 - 1.0) / 2.0;
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        (j as f64 - cx).hypot(i as f64 - cy) <= radius
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polynomial_phase_corners() {
        let phase = polynomial_phase(3, 5, |x, y| x + 2.0 * y);
        assert!((phase[[0, 0]] - 2.0 * PI * -3.0).abs() < 1e-12);
        assert!((phase[[2, 4]] - 2.0 * PI * 3.0).abs() < 1e-12);
        assert!(phase[[1, 2]].abs() < 1e-12);
    }

    #[test]
    fn test_frames_follow_phase_steps() {
        let phase = Array2::from_elem((2, 2), 0.0);
        let frames = phase_shifted_frames(&phase, 10.0, 4.0);
        // cos(π), cos(π/2), cos(0), cos(-π/2), cos(-π)
        let expected = [6.0, 10.0, 14.0, 10.0, 6.0];
        for (frame, want) in frames.iter().zip(expected) {
            assert!((frame[[0, 0]] - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_centered_disk() {
        let disk = centered_disk(5, 5, 1.0);
        assert!(disk[[2, 2]]);
        assert!(disk[[1, 2]]);
        assert!(!disk[[1, 1]]);
        assert_eq!(disk.iter().filter(|&&v| v).count(), 5);
    }

    #[test]
    fn test_frames_demodulate_to_phase() {
        let phase = Array2::from_shape_vec((1, 4), vec![-2.5, -0.3, 1.1, 3.0]).unwrap();
        let [i0, i1, i2, i3, i4] = phase_shifted_frames(&phase, 80.0, 30.0);
        for j in 0..4 {
            let recovered = (2.0 * (i3[[0, j]] - i1[[0, j]]))
                .atan2(2.0 * i2[[0, j]] - i4[[0, j]] - i0[[0, j]]);
            assert!((recovered - phase[[0, j]]).abs() < 1e-12);
        }
    }
}
