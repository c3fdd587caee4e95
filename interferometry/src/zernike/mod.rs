//! Zernike decomposition of unwrapped surfaces.
//!
//! # Key Features
//! - **Orderings**: Fringe (default), Noll and ANSI single-index layouts
//! - **Basis**: RMS-normalised polynomials evaluated over the frame grid
//! - **Fit**: least squares over the valid pixels with a rank check
//! - **Removal**: subtraction of named aberration groups
//! - **Seidel view**: primary aberration magnitudes and orientations

pub mod aberrations;
pub mod basis;
pub mod fit;
pub mod indexing;
pub mod seidel;

pub use aberrations::{
    remove_aberrations, remove_with_basis, Aberration, AberrationSelection, CorrectedWavefront,
};
pub use basis::ZernikeBasis;
pub use fit::{fit_with_basis, fit_zernike, ZernikeCoefficients};
pub use indexing::{ZernikeIndexing, ZernikeMode, FRINGE_TERMS};
pub use seidel::{OrientedTerm, SeidelAberrations};
