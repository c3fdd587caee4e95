//! Analysis configuration.
//!
//! Every tunable of the pipeline lives in [`AnalysisConfig`] and is passed
//! explicitly to the stages that need it. Configurations are stored as JSON.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

use crate::error::{MetrologyError, Result};
use crate::zernike::{Aberration, ZernikeIndexing};

/// Helium-neon laser wavelength in nanometres
pub const HENE_WAVELENGTH_NM: f64 = 632.8;

/// Parameters of one wavefront analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Illumination wavelength in nanometres
    pub wavelength_nm: f64,
    /// Phase period used by the unwrapper, radians
    pub period: f64,
    /// Number of Zernike terms fitted (piston included)
    pub max_order: usize,
    /// Ordering of Zernike terms in coefficient vectors
    pub indexing: ZernikeIndexing,
    /// Coefficients below this magnitude (waves) are zeroed after the fit
    pub coefficient_floor: Option<f64>,
    /// Aberration groups removed from the measured surface
    pub aberrations: Vec<Aberration>,
    /// PSF zoom exponent, the pupil spans `psf_size / 2^psf_zoom` samples
    pub psf_zoom: u32,
    /// Side of the zero-padded PSF grid
    pub psf_size: usize,
    /// Working f-number used to scale circled-energy radii
    pub f_number: f64,
    /// Scale applied to the unwrapped surface (0.5 for a double-pass test)
    pub wedge_factor: f64,
    /// Interpolate holes left by the unwrapper inside the valid region
    pub fill_holes: bool,
    /// Crop frames and mask to the mask bounding box before analysis
    pub crop_to_mask: bool,
    /// Gaussian smoothing of the frames before demodulation, pixels
    pub smoothing_sigma: Option<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            wavelength_nm: HENE_WAVELENGTH_NM,
            period: 2.0 * PI,
            max_order: 37,
            indexing: ZernikeIndexing::Fringe,
            coefficient_floor: Some(1e-3),
            aberrations: vec![Aberration::Piston, Aberration::Tilt, Aberration::Defocus],
            psf_zoom: 2,
            psf_size: 256,
            f_number: 10.0,
            wedge_factor: 1.0,
            fill_holes: true,
            crop_to_mask: true,
            smoothing_sigma: None,
        }
    }
}

impl AnalysisConfig {
    /// Check parameter ranges before any stage runs.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MetrologyError::InvalidParameter(msg));
        if !(self.wavelength_nm.is_finite() && self.wavelength_nm > 0.0) {
            return invalid(format!("wavelength_nm must be positive, got {}", self.wavelength_nm));
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            return invalid(format!("period must be positive, got {}", self.period));
        }
        if self.max_order == 0 {
            return invalid("max_order must be at least 1".to_string());
        }
        if let Some(limit) = self.indexing.max_terms() {
            if self.max_order > limit {
                return invalid(format!(
                    "{:?} indexing defines {limit} terms, max_order is {}",
                    self.indexing, self.max_order
                ));
            }
        }
        if self.psf_size.checked_shr(self.psf_zoom).unwrap_or(0) == 0 {
            return invalid(format!(
                "psf_size {} too small for zoom {}",
                self.psf_size, self.psf_zoom
            ));
        }
        if !(self.f_number.is_finite() && self.f_number > 0.0) {
            return invalid(format!("f_number must be positive, got {}", self.f_number));
        }
        if !self.wedge_factor.is_finite() || self.wedge_factor == 0.0 {
            return invalid(format!("wedge_factor must be non-zero, got {}", self.wedge_factor));
        }
        if let Some(sigma) = self.smoothing_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return invalid(format!("smoothing_sigma must be positive, got {sigma}"));
            }
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MetrologyError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| MetrologyError::Config(format!("{}: {e}", path.display())))
    }

    /// Load from JSON file, missing fields take their default value
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| MetrologyError::Config(format!("{}: {e}", path.display())))?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| MetrologyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
