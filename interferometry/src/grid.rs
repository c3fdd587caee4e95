//! Frame dimensions and normalised pupil coordinates.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions structure
///
/// Represents the width and height of an interferogram or any map derived from
/// it. Arrays follow the row-major `(height, width)` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Frame width in pixels
    pub width: usize,
    /// Frame height in pixels
    pub height: usize,
}

impl ImageSize {
    /// Create a new ImageSize
    pub fn from_width_height(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Size of an existing array (`dim()` is `(rows, cols)`)
    pub fn of<T>(array: &Array2<T>) -> Self {
        let (height, width) = array.dim();
        Self { width, height }
    }

    /// Shape tuple in ndarray order `(height, width)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Create a NaN-filled map with this size
    pub fn nan_array(&self) -> Array2<f64> {
        Array2::from_elem(self.shape(), f64::NAN)
    }

    /// Get total number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Pupil coordinates normalised to `[-1, 1]` along both axes.
    ///
    /// Returns `(x, y)` grids where `x` varies along columns and `y` along
    /// rows, each spanning the full frame extent.
    pub fn normalized_coordinates(&self) -> (Array2<f64>, Array2<f64>) {
        let xs = linspace(-1.0, 1.0, self.width);
        let ys = linspace(-1.0, 1.0, self.height);
        let x = Array2::from_shape_fn(self.shape(), |(_, j)| xs[j]);
        let y = Array2::from_shape_fn(self.shape(), |(i, _)| ys[i]);
        (x, y)
    }
}

impl From<(usize, usize)> for ImageSize {
    /// From an ndarray `(rows, cols)` shape
    fn from(shape: (usize, usize)) -> Self {
        Self {
            width: shape.1,
            height: shape.0,
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Evenly spaced samples over the closed interval `[start, stop]`.
///
/// A single sample sits at `start`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    if n == 1 {
        return Array1::from_elem(1, start);
    }
    Array1::linspace(start, stop, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_shape_conventions() {
        let size = ImageSize::from_width_height(6, 4);
        assert_eq!(size.shape(), (4, 6));
        assert_eq!(size.pixel_count(), 24);
        assert_eq!(size.to_string(), "6x4");
        assert_eq!(ImageSize::from((4, 6)), size);
        assert_eq!(ImageSize::of(&Array2::<f64>::zeros((4, 6))), size);
    }

    #[test]
    fn test_normalized_coordinates_span_unit_square() {
        let (x, y) = ImageSize::from_width_height(5, 3).normalized_coordinates();
        assert_relative_eq!(x[[0, 0]], -1.0);
        assert_relative_eq!(x[[2, 4]], 1.0);
        assert_relative_eq!(x[[1, 2]], 0.0);
        assert_relative_eq!(y[[0, 3]], -1.0);
        assert_relative_eq!(y[[2, 0]], 1.0);
        assert_relative_eq!(y[[1, 1]], 0.0);
    }

    #[test]
    fn test_single_sample_linspace() {
        assert_eq!(linspace(-1.0, 1.0, 1).to_vec(), vec![-1.0]);
    }
}
