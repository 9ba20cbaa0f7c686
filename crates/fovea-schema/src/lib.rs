//! # Fovea Schema
//!
//! The Design-Intent layer of the Fovea lens-design workbench: declarative
//! *blocks* (lenses, gaps, stops, mirrors, coordinate transforms), their
//! JSON document format, validation, and the deterministic expansion into
//! the flat [`fovea_core::surface::Surface`] table that the tracer and
//! evaluators consume.
//!
//! The inverse direction is covered too: [`derive::derive_from_flat`]
//! reconstructs blocks from a legacy flat surface table on a best-effort
//! basis, reporting everything lossy as [`issue::Issue`] records.
//!
//! Strings live only at this boundary. `parameters` and `variables` stay
//! heterogeneous maps on the block records; expansion lowers them into the
//! typed surface fields, and nothing string-typed reaches the numerical
//! core.

pub mod derive;
pub mod expand;
pub mod intent;
pub mod issue;

pub use expand::{expand, expand_configuration, validate};
pub use intent::{Block, BlockType, Configuration, BLOCK_SCHEMA_VERSION};
pub use issue::{has_fatal, Issue, Phase, Severity};
