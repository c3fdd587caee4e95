//! Point-spread function of a measured wavefront.
//!
//! The wavefront and its aperture are resampled to an `N_phi × N_phi` pupil
//! grid with `N_phi = ne / 2^zoom`, centred in an `ne × ne` zero-padded frame,
//! and propagated to the focal plane with a centred FFT. The zoom exponent sets
//! the focal-plane sampling: each PSF pixel spans `λ·N / 2^zoom`.

use log::{debug, warn};
use ndarray::{s, Array2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

use super::fft::centered_fft2;
use super::resample::{resample_aperture, ResampledAperture};
use crate::error::{MetrologyError, Result};
use crate::mask::Mask;

/// Default floor of the logarithmic PSF view
pub const DEFAULT_DB_FLOOR: f64 = -30.0;

/// Focal-plane intensity, centred on index `ne / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Psf {
    pub intensity: Array2<f64>,
    /// Zoom exponent the PSF was computed with
    pub zoom: u32,
    /// Side of the pupil grid, `ne / 2^zoom`
    pub pupil_samples: usize,
    /// False when the reference peak was zero and no normalisation applied
    pub normalized: bool,
}

impl Psf {
    pub fn size(&self) -> usize {
        self.intensity.nrows()
    }

    pub fn peak(&self) -> f64 {
        self.intensity.iter().copied().fold(0.0, f64::max)
    }

    /// Intensity in decibels, clipped below `floor_db`.
    pub fn to_decibels(&self, floor_db: f64) -> Array2<f64> {
        let floor = 10f64.powf(floor_db / 10.0);
        self.intensity.mapv(|v| 10.0 * v.max(floor).log10())
    }
}

fn pupil_samples(zoom: u32, ne: usize) -> Result<usize> {
    match ne.checked_shr(zoom) {
        Some(n) if n > 0 => Ok(n),
        _ => Err(MetrologyError::InvalidParameter(format!(
            "PSF grid of {ne} samples too small for zoom {zoom}"
        ))),
    }
}

/// Focal-plane intensity of `amplitude·exp(i·2π·phase)` centred in `ne × ne`.
fn propagate(aperture: &ResampledAperture, phase_scale: f64, ne: usize) -> Array2<f64> {
    let n_phi = aperture.amplitude.nrows();
    let offset = (ne - n_phi) / 2;
    let mut field = Array2::<Complex64>::zeros((ne, ne));
    Zip::from(field.slice_mut(s![offset..offset + n_phi, offset..offset + n_phi]))
        .and(&aperture.amplitude)
        .and(&aperture.wavefront)
        .for_each(|p, &a, &w| {
            if a > 0.0 {
                *p = Complex64::from_polar(a, 2.0 * PI * w * phase_scale);
            }
        });
    centered_fft2(&field).mapv(|c| c.norm_sqr())
}

/// PSF of `wavefront` (waves) through `mask`, normalised by the peak of the
/// unaberrated PSF of the same aperture.
///
/// The aperture is resampled onto a square `N_phi × N_phi` pupil grid; a
/// non-square wavefront is scaled anisotropically to fill it.
///
/// # Arguments
/// * `wavefront` - Surface in waves; NaN pixels are excluded from the aperture
/// * `mask` - Aperture, same shape as the wavefront
/// * `zoom` - Focal-plane oversampling exponent
/// * `ne` - Side of the zero-padded PSF grid
pub fn psf(wavefront: &Array2<f64>, mask: &Mask, zoom: u32, ne: usize) -> Result<Psf> {
    psf_with_reference(wavefront, mask, zoom, ne).map(|(measured, _)| measured)
}

/// Measured PSF and the diffraction-limited reference, both normalised by the
/// reference peak.
pub fn psf_with_reference(
    wavefront: &Array2<f64>,
    mask: &Mask,
    zoom: u32,
    ne: usize,
) -> Result<(Psf, Psf)> {
    let n_phi = pupil_samples(zoom, ne)?;
    let aperture = resample_aperture(wavefront, mask, (n_phi, n_phi))?;

    let mut measured = propagate(&aperture, 1.0, ne);
    let mut reference = propagate(&aperture, 0.0, ne);

    let peak = reference.iter().copied().fold(0.0, f64::max);
    let normalized = peak > 0.0;
    if normalized {
        measured.mapv_inplace(|v| v / peak);
        reference.mapv_inplace(|v| v / peak);
    } else {
        warn!("reference PSF has zero peak, PSF left unnormalised");
    }
    debug!("PSF on {ne}x{ne} grid, pupil {n_phi}x{n_phi} (zoom {zoom})");

    let build = |intensity| Psf {
        intensity,
        zoom,
        pupil_samples: n_phi,
        normalized,
    };
    Ok((build(measured), build(reference)))
}

/// Diffraction-limited PSF of the aperture alone, peak 1.
pub fn reference_psf(mask: &Mask, zoom: u32, ne: usize) -> Result<Psf> {
    let flat = Array2::<f64>::zeros(mask.shape());
    psf_with_reference(&flat, mask, zoom, ne).map(|(_, reference)| reference)
}
