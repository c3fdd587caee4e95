//! Phase-shifting interferometry wavefront analysis.
//!
//! This crate turns five phase-shifted interferograms into a measured
//! wavefront and its focal-plane figures of merit. Every stage is a pure
//! function of its inputs and can be used on its own.
//!
//! # Key Features
//! - **Demodulation**: Hariharan five-frame algorithm
//! - **Unwrapping**: row/column unwrap with cross-checked reconciliation and
//!   explicit reliability flags
//! - **Zernike analysis**: least-squares decomposition, aberration removal
//!   and Seidel view
//! - **Optics**: PSF, MTF and circled energy of the corrected wavefront
//! - **Datasets**: NPZ archives of interferogram sets and masks
//!
//! # Example
//! ```no_run
//! use interferometry::{analyze, AnalysisConfig, InterferogramDataset, MaskPolicy};
//! use std::path::Path;
//!
//! let dataset = InterferogramDataset::load_npz(Path::new("acquisition.npz"))?;
//! let policy = MaskPolicy::Union(dataset.masks.clone());
//! let analysis = analyze(&dataset.sets[0], &policy, &AnalysisConfig::default(), None)?;
//! println!("{}", analysis.seidel);
//! # Ok::<(), interferometry::MetrologyError>(())
//! ```

pub mod config;
pub mod dataset;
pub mod demodulation;
pub mod error;
pub mod grid;
pub mod interp;
pub mod mask;
pub mod optics;
pub mod pipeline;
pub mod preprocess;
pub mod stats;
pub mod unwrap;
pub mod zernike;

pub use config::{AnalysisConfig, HENE_WAVELENGTH_NM};
pub use dataset::{DatasetError, InterferogramDataset};
pub use demodulation::{demodulate, wrap_phase, InterferogramSet, WrappedPhaseMap};
pub use error::{MetrologyError, Result};
pub use grid::ImageSize;
pub use mask::{BoundingBox, Mask, MaskKind, MaskPolicy, MaskSet};
pub use optics::{circled_energy, mtf, psf, CircledEnergy, Mtf, Psf};
pub use pipeline::{analyze, WavefrontAnalysis};
pub use stats::SurfaceStatistics;
pub use unwrap::{unwrap, UnwrapOutcome, UnwrappedPhaseMap};
pub use zernike::{
    fit_zernike, remove_aberrations, Aberration, AberrationSelection, CorrectedWavefront,
    SeidelAberrations, ZernikeCoefficients, ZernikeIndexing,
};
