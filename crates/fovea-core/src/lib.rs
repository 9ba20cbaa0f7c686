//! # Fovea Core
//!
//! The numerical backbone of the Fovea lens-design workbench. This crate
//! implements real ray tracing through an expanded surface table, stop-aimed
//! ray-bundle generation, and the image-quality evaluators that score a
//! design against its requirements.
//!
//! ## Architecture
//!
//! The flat [`surface::Surface`] table is the contract with the block
//! expander (the `fovea-schema` crate): every downstream computation borrows
//! an immutable `&[Surface]`. Refractive indices come from a
//! [`fovea_materials::IndexResolver`], so the whole crate is independent of
//! where glass data lives.
//!
//! ## Modules
//!
//! - [`surface`] — The expanded surface table (rows, shapes, roles).
//! - [`ray`] — Rays and traced ray paths.
//! - [`trace`] — Sequential real-ray tracer (frames, intersection, Snell).
//! - [`bundle`] — Stop-aimed ray bundles (cross, annular, grid patterns).
//! - [`paraxial`] — y-nu paraxial trace (EFL, BFL, track length).
//! - [`eval`] — Spot diagrams, longitudinal aberration, OPD, Zernike fit.
//! - [`merit`] — Requirements, operands, and the aggregate merit function.
//! - [`progress`] — Progress reporting and cooperative cancellation.
//!
//! Everything here is a pure function of its inputs: no I/O, no clocks, no
//! global mutable state. Callers may evaluate independent rays, fields, or
//! candidate designs in parallel.

pub mod bundle;
pub mod eval;
pub mod merit;
pub mod paraxial;
pub mod progress;
pub mod ray;
pub mod surface;
pub mod trace;
