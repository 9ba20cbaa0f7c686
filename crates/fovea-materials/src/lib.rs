//! # Fovea Materials
//!
//! Glass records and wavelength-dependent refractive-index resolution for
//! the Fovea lens-design core. All lookups go through the
//! [`resolver::IndexResolver`] trait, which returns real refractive indices
//! at a given wavelength.
//!
//! ## Dispersion models
//!
//! | Formula | Module | Form |
//! |---------|--------|------|
//! | Sellmeier (3-term) | [`glass`] | $n^2 - 1 = \sum_i B_i \lambda^2 / (\lambda^2 - C_i)$ |
//! | Schott polynomial | [`glass`] | $n^2 = a_0 + a_1\lambda^2 + a_2\lambda^{-2} + \dots + a_5\lambda^{-8}$ |
//! | Sumita polynomial | [`glass`] | Schott layout with vendor coefficient tables |
//!
//! ## Catalogs
//!
//! [`catalog::GlassCatalog`] composes named databases and tries them in
//! order; [`builtin::schott_subset`] embeds a curated catalog at compile
//! time. A material name that parses as a number in `(0, 4)` is treated as
//! a constant-index synthetic glass.

pub mod builtin;
pub mod catalog;
pub mod glass;
pub mod resolver;

pub use catalog::GlassCatalog;
pub use glass::{DispersionFormula, GlassRecord, Material};
pub use resolver::{IndexResolver, MaterialError};
