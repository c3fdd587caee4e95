//! Seidel view of low-order Zernike coefficients.
//!
//! Coefficients are first brought back to un-normalised Zernike amplitudes,
//! then combined into magnitudes and orientations of the primary aberrations.
//! This is a presentation transform only.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::fit::ZernikeCoefficients;
use super::indexing::ZernikeMode;

/// Magnitude (waves) and orientation (degrees) of an oriented aberration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedTerm {
    pub magnitude: f64,
    pub angle_deg: f64,
}

/// Primary (Seidel) aberrations derived from Zernike coefficients, in waves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeidelAberrations {
    pub tilt: OrientedTerm,
    pub defocus: f64,
    pub astigmatism: OrientedTerm,
    pub coma: OrientedTerm,
    pub spherical: f64,
}

impl SeidelAberrations {
    pub fn from_coefficients(coefficients: &ZernikeCoefficients) -> Self {
        // Un-normalised amplitude of a mode
        let amp = |n: u32, m: i32| {
            let mode = ZernikeMode::new(n, m);
            coefficients.of_mode(mode) * mode.normalization()
        };

        let (tx, ty) = (amp(1, 1), amp(1, -1));
        let (ax, ay) = (amp(2, 2), amp(2, -2));
        let (cx, cy) = (amp(3, 1), amp(3, -1));

        Self {
            tilt: OrientedTerm {
                magnitude: tx.hypot(ty),
                angle_deg: ty.atan2(tx).to_degrees(),
            },
            defocus: 2.0 * amp(2, 0),
            astigmatism: OrientedTerm {
                magnitude: 2.0 * ax.hypot(ay),
                angle_deg: 0.5 * ay.atan2(ax).to_degrees(),
            },
            coma: OrientedTerm {
                magnitude: 3.0 * cx.hypot(cy),
                angle_deg: cy.atan2(cx).to_degrees(),
            },
            spherical: 6.0 * amp(4, 0),
        }
    }

    /// Copy rounded to `decimals` places for display.
    pub fn rounded(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        let r = |v: f64| (v * scale).round() / scale;
        let ro = |t: OrientedTerm| OrientedTerm {
            magnitude: r(t.magnitude),
            angle_deg: r(t.angle_deg),
        };
        Self {
            tilt: ro(self.tilt),
            defocus: r(self.defocus),
            astigmatism: ro(self.astigmatism),
            coma: ro(self.coma),
            spherical: r(self.spherical),
        }
    }
}

impl fmt::Display for SeidelAberrations {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "tilt         {:>9.4} λ @ {:>7.2}°",
            self.tilt.magnitude, self.tilt.angle_deg
        )?;
        writeln!(f, "defocus      {:>9.4} λ", self.defocus)?;
        writeln!(
            f,
            "astigmatism  {:>9.4} λ @ {:>7.2}°",
            self.astigmatism.magnitude, self.astigmatism.angle_deg
        )?;
        writeln!(
            f,
            "coma         {:>9.4} λ @ {:>7.2}°",
            self.coma.magnitude, self.coma.angle_deg
        )?;
        write!(f, "spherical    {:>9.4} λ", self.spherical)
    }
}
