//! Glass records and dispersion formulas.
//!
//! A [`GlassRecord`] carries the d-line index, Abbe number, and the
//! coefficients of one of three dispersion models. Wavelengths are in
//! micrometres throughout, matching the catalog data.

use serde::{Deserialize, Serialize};

use crate::resolver::MaterialError;

/// Dispersion model of a glass record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispersionFormula {
    /// Three-term Sellmeier: $n^2 - 1 = \sum_i B_i \lambda^2 / (\lambda^2 - C_i)$.
    ///
    /// Coefficients are laid out `[B1, B2, B3, C1, C2, C3]`.
    Sellmeier,
    /// Schott polynomial:
    /// $n^2 = a_0 + a_1\lambda^2 + a_2\lambda^{-2} + a_3\lambda^{-4} + a_4\lambda^{-6} + a_5\lambda^{-8}$.
    Schott,
    /// Sumita vendor polynomial. The catalog databases provide Sumita
    /// coefficients already shifted into the Schott layout, so evaluation
    /// is shared with [`DispersionFormula::Schott`].
    Sumita,
}

impl std::fmt::Display for DispersionFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispersionFormula::Sellmeier => write!(f, "sellmeier"),
            DispersionFormula::Schott => write!(f, "schott"),
            DispersionFormula::Sumita => write!(f, "sumita"),
        }
    }
}

/// A single glass in a catalog database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlassRecord {
    /// Catalog name, e.g. "N-BK7".
    pub name: String,
    /// Refractive index at the d line (587.6 nm).
    pub nd: f64,
    /// Abbe number $v_d = (n_d - 1) / (n_F - n_C)$.
    pub vd: f64,
    /// Dispersion model for `coeffs`.
    pub formula: DispersionFormula,
    /// Model coefficients; 6 for Sellmeier and Schott/Sumita.
    pub coeffs: Vec<f64>,
}

impl GlassRecord {
    /// Refractive index at `wavelength_um` via this record's dispersion model.
    ///
    /// Falls back to `nd` with a warning-level error when coefficients are
    /// missing; callers decide whether that is acceptable.
    pub fn index_at(&self, wavelength_um: f64) -> Result<f64, MaterialError> {
        if self.coeffs.len() < 6 {
            return Err(MaterialError::MissingCoefficients {
                name: self.name.clone(),
                formula: self.formula.to_string(),
            });
        }
        let n = match self.formula {
            DispersionFormula::Sellmeier => sellmeier(&self.coeffs, wavelength_um),
            DispersionFormula::Schott | DispersionFormula::Sumita => {
                schott(&self.coeffs, wavelength_um)
            }
        };
        if n.is_finite() && n > 0.0 {
            Ok(n)
        } else {
            Err(MaterialError::NonFiniteIndex {
                name: self.name.clone(),
                wavelength_um,
            })
        }
    }
}

/// Three-term Sellmeier equation. `c = [B1, B2, B3, C1, C2, C3]`.
fn sellmeier(c: &[f64], wavelength_um: f64) -> f64 {
    let l2 = wavelength_um * wavelength_um;
    let n2 = 1.0
        + c[0] * l2 / (l2 - c[3])
        + c[1] * l2 / (l2 - c[4])
        + c[2] * l2 / (l2 - c[5]);
    n2.sqrt()
}

/// Schott polynomial. `c = [a0, a1, a2, a3, a4, a5]`.
fn schott(c: &[f64], wavelength_um: f64) -> f64 {
    let l2 = wavelength_um * wavelength_um;
    let inv = 1.0 / l2;
    // Horner in 1/λ² for the negative-power tail.
    let tail = ((c[5] * inv + c[4]) * inv + c[3]) * inv + c[2];
    let n2 = c[0] + c[1] * l2 + tail * inv;
    n2.sqrt()
}

/// The medium attached to a surface, parsed once at the JSON boundary.
///
/// Strings never reach the numeric core: the expander lowers `"AIR"`,
/// `"MIRROR"`, glass names, and numeric tokens into these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Material {
    /// Air (n = 1). Also the meaning of an empty material cell.
    Air,
    /// Vacuum, treated as air for index purposes.
    Vacuum,
    /// Reflective surface. Routed to reflection by the tracer; asking a
    /// resolver for its index is an error.
    Mirror,
    /// A named catalog glass.
    Glass(String),
    /// Synthetic glass with the same index at every wavelength.
    ///
    /// Produced from legacy "refractive-index-as-name" tokens in `(0, 4)`.
    /// Off-design wavelengths see the same index; there is no dispersion.
    ConstantIndex(f64),
}

impl Material {
    /// Parse a material cell the way legacy tables spell it.
    ///
    /// Empty and `"AIR"` are air; `"MIRROR"` reflects; a token parsing as a
    /// number in `(0, 4)` is a constant-index glass; anything else is a
    /// named glass (canonicalized to upper case).
    pub fn parse(token: &str) -> Material {
        let t = token.trim();
        if t.is_empty() {
            return Material::Air;
        }
        let upper = t.to_ascii_uppercase();
        match upper.as_str() {
            "AIR" => return Material::Air,
            "VACUUM" => return Material::Vacuum,
            "MIRROR" => return Material::Mirror,
            _ => {}
        }
        if let Ok(n) = t.parse::<f64>() {
            if n > 0.0 && n < 4.0 {
                return Material::ConstantIndex(n);
            }
        }
        Material::Glass(upper)
    }

    /// True for air and vacuum.
    pub fn is_air(&self) -> bool {
        matches!(self, Material::Air | Material::Vacuum)
    }

    /// True for the mirror sentinel.
    pub fn is_mirror(&self) -> bool {
        matches!(self, Material::Mirror)
    }

    /// Legacy table spelling of this material.
    pub fn to_token(&self) -> String {
        match self {
            Material::Air => "AIR".into(),
            Material::Vacuum => "VACUUM".into(),
            Material::Mirror => "MIRROR".into(),
            Material::Glass(name) => name.clone(),
            Material::ConstantIndex(n) => format!("{n}"),
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::Air
    }
}
