//! Image-quality evaluators.
//!
//! Each evaluator is a pure function from a surface table (plus a resolver
//! and a ray bundle) to an owned result record. Per-ray trace failures are
//! translated into flags and counts so a partially vignetted bundle still
//! produces a score.
//!
//! - [`spot`] — Transverse spot diagrams (RMS / GEO diameters).
//! - [`longitudinal`] — Longitudinal spherical aberration with chromatic shift.
//! - [`opd`] — Wavefront optical path difference against the chief ray.
//! - [`zernike`] — OSA/ANSI Zernike decomposition by weighted least squares.

pub mod longitudinal;
pub mod opd;
pub mod spot;
pub mod zernike;

use thiserror::Error;

use crate::bundle::AimError;
use fovea_materials::MaterialError;

/// Errors from the evaluator layer.
///
/// Numerical conditions (a non-positive-definite normal matrix, a singular
/// focus fit) surface here as variants so the merit layer can score the
/// requirement `NG` instead of aborting a batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Ray aiming failed: {0}")]
    Aim(#[from] AimError),

    #[error("Material resolution failed: {0}")]
    Material(#[from] MaterialError),

    #[error("Normal matrix is not positive definite; cannot fit Zernike coefficients")]
    NotPositiveDefinite,

    #[error("Singular linear fit: all samples at the same abscissa")]
    SingularFit,

    #[error("No usable samples after weighting and vignetting")]
    NoSamples,
}
