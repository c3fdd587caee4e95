//! End-to-end analysis of one phase-shifting acquisition.
//!
//! Stages run strictly downstream:
//!
//! ```text
//! frames + mask → (crop, smoothing) → wrapped phase → unwrapped surface
//!   → Zernike coefficients → corrected surface → PSF, MTF, circled energy
//! ```
//!
//! Cancellation is cooperative and checked between stages only.

use log::{debug, info};
use ndarray::Array2;
use npyz::npz::NpzWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::AnalysisConfig;
use crate::dataset::{write_entry, DatasetError};
use crate::demodulation::{demodulate, InterferogramSet, WrappedPhaseMap};
use crate::error::{MetrologyError, Result};
use crate::mask::{BoundingBox, Mask, MaskPolicy};
use crate::optics::{circled_energy, mtf, psf_with_reference, CircledEnergy, Mtf, Psf};
use crate::preprocess::smooth_set;
use crate::stats::SurfaceStatistics;
use crate::unwrap::{unwrap_with, UnwrapOptions, UnwrapOutcome, UnwrappedPhaseMap};
use crate::zernike::{
    fit_with_basis, remove_with_basis, AberrationSelection, CorrectedWavefront, SeidelAberrations,
    ZernikeBasis, ZernikeCoefficients,
};

/// Every product of one analysis.
#[derive(Debug, Clone)]
pub struct WavefrontAnalysis {
    pub config: AnalysisConfig,
    /// Region of the original frames analysed, when cropped to the mask
    pub crop: Option<BoundingBox>,
    pub mask: Mask,
    pub wrapped: WrappedPhaseMap,
    pub unwrap_outcome: UnwrapOutcome,
    /// Unwrapped surface scaled by the wedge factor, waves
    pub surface: UnwrappedPhaseMap,
    pub coefficients: ZernikeCoefficients,
    pub seidel: SeidelAberrations,
    pub corrected: CorrectedWavefront,
    pub surface_statistics: SurfaceStatistics,
    pub corrected_statistics: SurfaceStatistics,
    pub psf: Psf,
    pub reference_psf: Psf,
    pub mtf: Mtf,
    pub circled_energy: CircledEnergy,
}

fn check_cancelled(cancel: Option<&AtomicBool>, stage: &'static str) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(MetrologyError::Cancelled(stage)),
        _ => Ok(()),
    }
}

/// Run every stage on `frames`.
///
/// # Arguments
/// * `frames` - One five-frame acquisition
/// * `policy` - Source of pixel validity
/// * `config` - Analysis parameters, validated before any stage runs
/// * `cancel` - Optional flag polled between stages
///
/// # Returns
/// The full set of products, or the first hard error. An unreliable unwrap is
/// not an error: it is logged and reported in
/// [`WavefrontAnalysis::unwrap_outcome`].
pub fn analyze(
    frames: &InterferogramSet,
    policy: &MaskPolicy,
    config: &AnalysisConfig,
    cancel: Option<&AtomicBool>,
) -> Result<WavefrontAnalysis> {
    config.validate()?;

    check_cancelled(cancel, "mask")?;
    let mut mask = policy.resolve(frames.frames())?;
    let mut frames = frames.clone();
    let crop = if config.crop_to_mask {
        let region = mask.bounding_box().ok_or(MetrologyError::EmptyMask)?;
        frames = frames.crop(&region);
        mask = mask.crop(&region);
        debug!("cropped to {} at ({}, {})", region.size(), region.min_col, region.min_row);
        Some(region)
    } else {
        None
    };
    if let Some(sigma) = config.smoothing_sigma {
        check_cancelled(cancel, "smoothing")?;
        frames = smooth_set(&frames, sigma)?;
    }

    check_cancelled(cancel, "demodulation")?;
    let wrapped = demodulate(&frames, &mask)?;

    check_cancelled(cancel, "unwrap")?;
    let unwrap_outcome = unwrap_with(
        &wrapped,
        &UnwrapOptions {
            period: config.period,
            fill_holes: config.fill_holes,
        },
    )?;
    let surface = unwrap_outcome.unwrapped.scaled(config.wedge_factor);

    check_cancelled(cancel, "fit")?;
    let basis = ZernikeBasis::new(config.indexing, config.max_order, frames.size())?;
    let mut coefficients = fit_with_basis(&surface, &mask, &basis)?;
    if let Some(floor) = config.coefficient_floor {
        coefficients.zero_below(floor);
    }
    let seidel = SeidelAberrations::from_coefficients(&coefficients);

    let selection =
        AberrationSelection::from_groups(&config.aberrations, config.indexing, config.max_order);
    let corrected = remove_with_basis(&surface, &coefficients, &selection, &basis)?;
    let surface_statistics = SurfaceStatistics::of(&surface.waves);
    let corrected_statistics = SurfaceStatistics::of(&corrected.waves);

    check_cancelled(cancel, "psf")?;
    let (psf, reference_psf) =
        psf_with_reference(&corrected.waves, &mask, config.psf_zoom, config.psf_size)?;
    let mtf = mtf(&psf);
    let circled_energy = circled_energy(&psf.intensity, Some(&reference_psf.intensity))?;

    info!(
        "surface {}, corrected {} (waves), Strehl {:.3}",
        surface_statistics,
        corrected_statistics,
        psf.peak()
    );

    Ok(WavefrontAnalysis {
        config: config.clone(),
        crop,
        mask,
        wrapped,
        unwrap_outcome,
        surface,
        coefficients,
        seidel,
        corrected,
        surface_statistics,
        corrected_statistics,
        psf,
        reference_psf,
        mtf,
        circled_energy,
    })
}

fn dims(array: &Array2<impl Sized>) -> [u64; 2] {
    let (h, w) = array.dim();
    [h as u64, w as u64]
}

impl WavefrontAnalysis {
    /// Peak of the PSF relative to the diffraction-limited peak.
    pub fn strehl_ratio(&self) -> f64 {
        self.psf.peak()
    }

    /// Corrected surface in nanometres.
    pub fn corrected_nanometers(&self) -> Array2<f64> {
        self.corrected.waves.mapv(|w| w * self.config.wavelength_nm)
    }

    /// Write every map and curve to an `.npz` archive.
    pub fn save_npz(&self, path: &Path) -> Result<()> {
        self.write_products(path).map_err(DatasetError::from)?;
        debug!("wrote analysis products to {}", path.display());
        Ok(())
    }

    fn write_products(&self, path: &Path) -> std::io::Result<()> {
        let mut npz = NpzWriter::create(path)?;
        let maps: [(&str, &Array2<f64>); 6] = [
            ("wrapped_phase", &self.wrapped.phase),
            ("unwrapped_phase", &self.surface.waves),
            ("corrected_phase", &self.corrected.waves),
            ("psf", &self.psf.intensity),
            ("reference_psf", &self.reference_psf.intensity),
            ("mtf", &self.mtf.modulation),
        ];
        for (name, map) in maps {
            write_entry(&mut npz, name, &dims(map), map.iter().copied())?;
        }
        for (name, flags) in [
            ("mask", self.mask.valid()),
            ("problem_mask", &self.unwrap_outcome.problem_mask),
            ("filled_mask", &self.unwrap_outcome.filled_mask),
        ] {
            write_entry(&mut npz, name, &dims(flags), flags.iter().map(|&b| b as u8))?;
        }

        let coefficients = &self.coefficients.values;
        write_entry(
            &mut npz,
            "coefficients",
            &[coefficients.len() as u64],
            coefficients.iter().copied(),
        )?;
        let ce = &self.circled_energy;
        let radii_um =
            ce.radii_micrometers(self.config.wavelength_nm, self.config.f_number, self.psf.zoom);
        let curves = [
            Some(("circled_energy_radii_um", &radii_um)),
            Some(("circled_energy", &ce.energy)),
            ce.reference.as_ref().map(|r| ("circled_energy_reference", r)),
        ];
        for (name, curve) in curves.into_iter().flatten() {
            write_entry(&mut npz, name, &[curve.len() as u64], curve.iter().copied())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ImageSize;
    use crate::zernike::Aberration;
    use std::f64::consts::PI;

    /// Five frames of a tilted plane plus defocus over a centred disk.
    fn acquisition(size: usize) -> (InterferogramSet, Mask) {
        let image_size = ImageSize::from_width_height(size, size);
        let (x, y) = image_size.normalized_coordinates();
        let phase = (&x * 1.5 + &y * 0.5 + (&x * &x + &y * &y) * 0.8) * (2.0 * PI);
        let frames = std::array::from_fn(|k| {
            phase.mapv(|p| 100.0 + 50.0 * (p + PI - k as f64 * PI / 2.0).cos())
        });
        let mask = Mask::circular(image_size, size as f64 / 2.0, size as f64 / 2.0, size as f64 / 3.0);
        (InterferogramSet::new(frames).unwrap(), mask)
    }

    #[test]
    fn test_tilt_and_defocus_are_removed() {
        let (frames, mask) = acquisition(96);
        let config = AnalysisConfig {
            max_order: 9,
            psf_size: 128,
            ..Default::default()
        };
        let analysis = analyze(&frames, &MaskPolicy::Single(mask), &config, None).unwrap();

        assert!(analysis.unwrap_outcome.reliable);
        assert!(analysis.crop.is_some());
        assert!(analysis.surface_statistics.peak_to_valley > 1.0);
        assert!(analysis.corrected_statistics.rms < 1e-3);
        assert!(analysis.strehl_ratio() > 0.99);
        assert!(analysis.seidel.tilt.magnitude > 0.5);
        assert_eq!(analysis.coefficients.len(), 9);
    }

    #[test]
    fn test_invalid_pixels_stay_nan() {
        let (frames, mask) = acquisition(64);
        let config = AnalysisConfig {
            max_order: 6,
            psf_size: 64,
            crop_to_mask: false,
            ..Default::default()
        };
        let analysis = analyze(&frames, &MaskPolicy::Single(mask.clone()), &config, None).unwrap();
        for ((idx, &ok), &w) in mask.valid().indexed_iter().zip(analysis.corrected.waves.iter()) {
            if !ok {
                assert!(w.is_nan(), "pixel {idx:?} outside the mask is {w}");
            }
        }
    }

    #[test]
    fn test_wedge_factor_scales_surface() {
        let (frames, mask) = acquisition(64);
        let policy = MaskPolicy::Single(mask);
        let single = AnalysisConfig {
            max_order: 4,
            psf_size: 64,
            aberrations: vec![Aberration::Piston],
            ..Default::default()
        };
        let double = AnalysisConfig {
            wedge_factor: 0.5,
            ..single.clone()
        };
        let a = analyze(&frames, &policy, &single, None).unwrap();
        let b = analyze(&frames, &policy, &double, None).unwrap();
        let ratio = b.surface_statistics.rms / a.surface_statistics.rms;
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cancellation_between_stages() {
        let (frames, mask) = acquisition(32);
        let cancel = AtomicBool::new(true);
        let result = analyze(
            &frames,
            &MaskPolicy::Single(mask),
            &AnalysisConfig::default(),
            Some(&cancel),
        );
        assert!(matches!(result, Err(MetrologyError::Cancelled("mask"))));
    }

    #[test]
    fn test_invalid_config_rejected_first() {
        let (frames, _) = acquisition(32);
        let config = AnalysisConfig {
            wavelength_nm: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            analyze(&frames, &MaskPolicy::AllValid, &config, None),
            Err(MetrologyError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_products_written_to_archive() {
        let (frames, mask) = acquisition(48);
        let config = AnalysisConfig {
            max_order: 6,
            psf_size: 64,
            ..Default::default()
        };
        let analysis = analyze(&frames, &MaskPolicy::Single(mask), &config, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.npz");
        analysis.save_npz(&path).unwrap();

        let mut archive = npyz::npz::NpzArchive::open(&path).unwrap();
        {
            let coefficients = archive.by_name("coefficients").unwrap().unwrap();
            assert_eq!(coefficients.shape(), &[6]);
        }
        assert!(archive.by_name("circled_energy_reference").unwrap().is_some());
    }
}
