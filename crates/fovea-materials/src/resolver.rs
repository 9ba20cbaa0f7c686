//! Refractive-index resolver trait.
//!
//! The ray tracer and evaluators consume materials only through
//! [`IndexResolver`], so tests can substitute a fixed-index resolver and the
//! catalog implementation stays swappable.

use thiserror::Error;

use crate::glass::Material;

/// Errors from material resolution.
///
/// Comparable by value: the tracer and evaluator error enums embed this
/// type and derive `PartialEq` themselves.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaterialError {
    #[error("Unknown glass: {0}")]
    UnknownGlass(String),

    #[error("Glass '{name}' has no dispersion coefficients for formula {formula}")]
    MissingCoefficients { name: String, formula: String },

    #[error("MIRROR has no refractive index; reflection is handled by the tracer")]
    MirrorHasNoIndex,

    #[error("Non-finite index for glass '{name}' at {wavelength_um} µm")]
    NonFiniteIndex { name: String, wavelength_um: f64 },
}

/// Resolves a [`Material`] to a real refractive index at a wavelength.
///
/// Contract (matching the tracer's expectations):
/// - `Air` and `Vacuum` resolve to exactly 1.0.
/// - `ConstantIndex(n)` resolves to `n` at every wavelength.
/// - `Mirror` is an error here; the tracer routes it to reflection before
///   ever asking for an index.
pub trait IndexResolver {
    /// Refractive index at `wavelength_um` (micrometres).
    fn refractive_index(
        &self,
        material: &Material,
        wavelength_um: f64,
    ) -> Result<f64, MaterialError>;

    /// d-line index and Abbe number for a named glass, if known.
    ///
    /// Used by the expander to cache `nd`/`vd` on surface rows and by the
    /// legacy importer's nearest-glass matching.
    fn nd_vd(&self, name: &str) -> Option<(f64, f64)>;
}

/// A resolver with a single fixed index for every glass name.
///
/// Test helper: lets tracer tests pin `n` without building a catalog.
#[derive(Debug, Clone, Copy)]
pub struct FixedIndex(pub f64);

impl IndexResolver for FixedIndex {
    fn refractive_index(
        &self,
        material: &Material,
        _wavelength_um: f64,
    ) -> Result<f64, MaterialError> {
        match material {
            Material::Air | Material::Vacuum => Ok(1.0),
            Material::ConstantIndex(n) => Ok(*n),
            Material::Mirror => Err(MaterialError::MirrorHasNoIndex),
            Material::Glass(_) => Ok(self.0),
        }
    }

    fn nd_vd(&self, _name: &str) -> Option<(f64, f64)> {
        Some((self.0, 60.0))
    }
}
