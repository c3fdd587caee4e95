//! Focal-plane analysis of a measured wavefront.
//!
//! # Key Features
//! - **PSF**: pupil `A·exp(i·2π·W)` propagated with a zero-padded centred FFT,
//!   normalised by the diffraction-limited PSF of the same aperture
//! - **MTF**: modulus of the transform of the PSF
//! - **Circled energy**: cumulative energy around the PSF centroid
//!
//! Degenerate normalisations (zero peak or zero energy) are skipped and
//! reported through the `normalized` flags instead of dividing by zero.

pub mod circled_energy;
pub mod fft;
pub mod mtf;
pub mod psf;
pub mod resample;

pub use circled_energy::{centroid, circled_energy, CircledEnergy};
pub use mtf::{mtf, mtf_of, Mtf};
pub use psf::{psf, psf_with_reference, reference_psf, Psf, DEFAULT_DB_FLOOR};
pub use resample::{resample_aperture, resize_bilinear};
