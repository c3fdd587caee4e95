//! Error types shared by every stage of the wavefront pipeline.
//!
//! Shape and convergence failures are the only hard errors raised by the
//! numerical stages. An unreliable unwrap is reported through
//! [`crate::unwrap::UnwrapOutcome`] and a degenerate normalisation is skipped
//! with a warning, neither aborts the pipeline.

use thiserror::Error;

use crate::dataset::DatasetError;

/// Errors raised by the interferometry pipeline.
#[derive(Error, Debug)]
pub enum MetrologyError {
    /// Two arrays that must share a shape do not.
    ///
    /// Shapes are reported as `(rows, columns)`.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// The Zernike least-squares system could not be solved.
    ///
    /// Callers may retry with a lower `max_order`.
    #[error(
        "Zernike fit did not converge for max_order {max_order} ({valid_pixels} valid pixels)"
    )]
    NumericalNonConvergence {
        max_order: usize,
        valid_pixels: usize,
    },

    #[error("mask has no valid pixels")]
    EmptyMask,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("analysis cancelled before stage '{0}'")]
    Cancelled(&'static str),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MetrologyError>;

/// Check that `found` matches `expected`, reporting both on failure.
pub(crate) fn ensure_shape(
    context: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected != found {
        return Err(MetrologyError::ShapeMismatch {
            context,
            expected,
            found,
        });
    }
    Ok(())
}
