//! Two-dimensional FFT helpers on ndarray grids.
//!
//! Transforms are unnormalised (rustfft convention). Shifts follow the usual
//! convention that puts the zero frequency at index `n / 2`.

use ndarray::{Array2, Axis, Zip};
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Move the zero frequency from index 0 to the centre of each axis.
pub fn fftshift<T: Clone>(array: &Array2<T>) -> Array2<T> {
    let (h, w) = array.dim();
    roll(array, h / 2, w / 2)
}

/// Inverse of [`fftshift`], also correct for odd sizes.
pub fn ifftshift<T: Clone>(array: &Array2<T>) -> Array2<T> {
    let (h, w) = array.dim();
    roll(array, h - h / 2, w - w / 2)
}

/// Circular shift by `(dr, dc)`: `out[(i + dr) % h][(j + dc) % w] = in[i][j]`.
fn roll<T: Clone>(array: &Array2<T>, dr: usize, dc: usize) -> Array2<T> {
    let (h, w) = array.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        array[[(i + h - dr % h) % h, (j + w - dc % w) % w]].clone()
    })
}

/// Forward 2-D FFT in place: every row, then every column.
pub fn fft2_inplace(data: &mut Array2<Complex64>) {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    for (axis, len) in [(Axis(1), w), (Axis(0), h)] {
        let fft = planner.plan_fft_forward(len);
        Zip::from(data.lanes_mut(axis)).par_for_each(|mut lane| {
            let mut buffer = lane.to_vec();
            fft.process(&mut buffer);
            for (dst, src) in lane.iter_mut().zip(buffer) {
                *dst = src;
            }
        });
    }
}

/// `fftshift(fft2(ifftshift(data)))`: centred input, centred spectrum.
pub fn centered_fft2(data: &Array2<Complex64>) -> Array2<Complex64> {
    let mut spectrum = ifftshift(data);
    fft2_inplace(&mut spectrum);
    fftshift(&spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_shift_even_and_odd() {
        let even = array![[0, 1, 2, 3]];
        assert_eq!(fftshift(&even), array![[2, 3, 0, 1]]);
        assert_eq!(ifftshift(&fftshift(&even)), even);

        let odd = array![[0], [1], [2], [3], [4]];
        assert_eq!(fftshift(&odd), array![[3], [4], [0], [1], [2]]);
        assert_eq!(ifftshift(&fftshift(&odd)), odd);
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let mut data = Array2::<Complex64>::zeros((4, 6));
        data[[0, 0]] = Complex64::new(1.0, 0.0);
        fft2_inplace(&mut data);
        for v in data.iter() {
            assert_abs_diff_eq!(v.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_centered_constant_peaks_at_centre() {
        let data = Array2::from_elem((8, 8), Complex64::new(1.0, 0.0));
        let spectrum = centered_fft2(&data);
        assert_abs_diff_eq!(spectrum[[4, 4]].re, 64.0, epsilon = 1e-9);
        let off_peak: f64 = spectrum
            .indexed_iter()
            .filter(|(idx, _)| *idx != (4, 4))
            .map(|(_, v)| v.norm())
            .sum();
        assert_abs_diff_eq!(off_peak, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_row_frequency_lands_on_column_axis() {
        // exp(2πi·j/8) along each row concentrates at column frequency 1
        let data = Array2::from_shape_fn((4, 8), |(_, j)| {
            Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI * j as f64 / 8.0)
        });
        let mut spectrum = data.clone();
        fft2_inplace(&mut spectrum);
        assert_abs_diff_eq!(spectrum[[0, 1]].norm(), 32.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum[[0, 0]].norm(), 0.0, epsilon = 1e-9);
    }
}
