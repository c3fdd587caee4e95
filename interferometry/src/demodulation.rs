//! Five-frame phase demodulation.
//!
//! Implements the Hariharan error-compensating algorithm:
//!
//! ```text
//! phase = atan2(2·(I₃ − I₁), 2·I₂ − I₄ − I₀)
//! ```
//!
//! with frames `I₀..I₄` recorded at π/2 phase steps spanning 2π. For the
//! returned phase to equal the phase under test `φ`, frame `k` follows
//! `I_k = A + B·cos(φ + π − k·π/2)`, that is the reference retards by π/2
//! between frames and the central frame carries no relative shift.
//!
//! The result is wrapped to (−π, π] and NaN outside the mask.

use log::debug;
use ndarray::{Array2, Zip};

use crate::error::{ensure_shape, Result};
use crate::grid::ImageSize;
use crate::mask::{BoundingBox, Mask};

/// Number of phase-shifted frames consumed by the demodulator
pub const FRAMES_PER_SET: usize = 5;

/// Five same-shape intensity frames of one phase-shifting acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct InterferogramSet {
    frames: [Array2<f64>; FRAMES_PER_SET],
}

impl InterferogramSet {
    /// Build a set, failing with `ShapeMismatch` unless all frames agree.
    pub fn new(frames: [Array2<f64>; FRAMES_PER_SET]) -> Result<Self> {
        let shape = frames[0].dim();
        for frame in &frames[1..] {
            ensure_shape("interferogram frames", shape, frame.dim())?;
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Array2<f64>; FRAMES_PER_SET] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Array2<f64>> {
        self.frames.get(index)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.frames[0].dim()
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::from(self.shape())
    }

    /// Apply `f` to every frame, keeping the set shape-consistent.
    pub fn map_frames<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&Array2<f64>) -> Array2<f64>,
    {
        let [a, b, c, d, e] = &self.frames;
        Self::new([f(a), f(b), f(c), f(d), f(e)])
    }

    /// Crop every frame to `region`.
    pub fn crop(&self, region: &BoundingBox) -> Self {
        let [a, b, c, d, e] = &self.frames;
        Self {
            frames: [
                region.crop(a),
                region.crop(b),
                region.crop(c),
                region.crop(d),
                region.crop(e),
            ],
        }
    }
}

/// Wrapped phase in radians, NaN where invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedPhaseMap {
    pub phase: Array2<f64>,
}

impl WrappedPhaseMap {
    pub fn shape(&self) -> (usize, usize) {
        self.phase.dim()
    }

    /// Pixels carrying a finite phase value.
    pub fn valid_mask(&self) -> Mask {
        Mask::from_finite(&self.phase)
    }
}

/// Demodulate five phase-shifted frames into a wrapped phase map.
///
/// Uses the Hariharan estimate `atan2(2(I3 − I1), 2I2 − I4 − I0)`. Frames
/// shaped `A + B·cos(φ + π − kπ/2)` demodulate to `wrap(φ)`. Frames shaped
/// `A(1 + C·cos(φ + kπ/2))` demodulate to `wrap(π − φ)`, the same surface
/// mirrored in sign plus a half-wave piston.
///
/// # Arguments
/// * `frames` - Intensity frames of one acquisition
/// * `mask` - Validity mask with the frame shape
///
/// # Returns
/// Wrapped phase in radians, NaN at invalid pixels, or `ShapeMismatch` if the
/// mask shape differs from the frames.
pub fn demodulate(frames: &InterferogramSet, mask: &Mask) -> Result<WrappedPhaseMap> {
    ensure_shape("demodulation mask", frames.shape(), mask.shape())?;
    let [i0, i1, i2, i3, i4] = frames.frames();

    let mut phase = Array2::<f64>::zeros(frames.shape());
    Zip::from(&mut phase)
        .and(i0)
        .and(i1)
        .and(i2)
        .and(i3)
        .and(i4)
        .for_each(|p, &i0, &i1, &i2, &i3, &i4| {
            *p = (2.0 * (i3 - i1)).atan2(2.0 * i2 - i4 - i0);
        });
    Zip::from(&mut phase).and(mask.valid()).for_each(|p, &ok| {
        if !ok {
            *p = f64::NAN;
        }
    });

    debug!(
        "demodulated {} frames, {} valid pixels",
        frames.size(),
        mask.count()
    );
    Ok(WrappedPhaseMap { phase })
}

/// Wrap a phase in radians to (−π, π].
pub fn wrap_phase(phase: f64) -> f64 {
    use std::f64::consts::PI;
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}
