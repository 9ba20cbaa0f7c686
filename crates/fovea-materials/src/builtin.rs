//! Curated built-in glass database.
//!
//! A small subset of the Schott catalog (plus one legacy Schott-polynomial
//! and one Sumita-layout record for formula coverage), embedded at compile
//! time. Sellmeier coefficients are laid out `[B1, B2, B3, C1, C2, C3]`
//! with wavelengths in micrometres.
//!
//! The workbench injects vendor databases at runtime; this subset exists so
//! the core is usable, and testable, without any external data.

use crate::glass::{DispersionFormula, GlassRecord};

struct Row(&'static str, f64, f64, DispersionFormula, [f64; 6]);

const SCHOTT_SUBSET: &[Row] = &[
    Row(
        "N-BK7",
        1.5168,
        64.17,
        DispersionFormula::Sellmeier,
        [1.03961212, 0.231792344, 1.01046945, 0.00600069867, 0.0200179144, 103.560653],
    ),
    Row(
        "N-SF2",
        1.64769,
        33.82,
        DispersionFormula::Sellmeier,
        [1.47343127, 0.163681849, 1.36920899, 0.0109019098, 0.0585683687, 107.4945666],
    ),
    Row(
        "N-SF5",
        1.67271,
        32.25,
        DispersionFormula::Sellmeier,
        [1.52481889, 0.187085527, 1.42729015, 0.011254756, 0.0588995392, 129.141675],
    ),
    Row(
        "N-SF11",
        1.78472,
        25.68,
        DispersionFormula::Sellmeier,
        [1.73759695, 0.313747346, 1.89878101, 0.013188707, 0.0623068142, 155.23629],
    ),
    Row(
        "N-SK16",
        1.62041,
        60.32,
        DispersionFormula::Sellmeier,
        [1.34317774, 0.241144399, 0.994317969, 0.00704687339, 0.0229005, 92.7508526],
    ),
    Row(
        "F2",
        1.62004,
        36.37,
        DispersionFormula::Sellmeier,
        [1.34533359, 0.209073176, 0.937357162, 0.00997743871, 0.0470450767, 111.886764],
    ),
    Row(
        "N-BAF10",
        1.67003,
        47.11,
        DispersionFormula::Sellmeier,
        [1.5851495, 0.143559385, 1.08521269, 0.00926681282, 0.0424489805, 105.613573],
    ),
    Row(
        "N-FK51A",
        1.48656,
        84.47,
        DispersionFormula::Sellmeier,
        [0.971247817, 0.216901417, 0.904651666, 0.00472301995, 0.0153575612, 168.68133],
    ),
    Row(
        "SF10",
        1.72828,
        28.41,
        DispersionFormula::Sellmeier,
        [1.62153902, 0.256287842, 1.64447552, 0.0122241457, 0.0595736775, 147.468793],
    ),
    // Legacy Schott-polynomial spelling of BK7; kept for formula coverage
    // and for importing old tables that reference it by this name.
    Row(
        "BK7",
        1.5168,
        64.17,
        DispersionFormula::Schott,
        [2.2718929, -1.0108077e-3, 1.0592509e-2, 2.0816965e-4, -7.6472538e-7, 4.9240991e-8],
    ),
    // Sumita record in the shared Schott coefficient layout.
    Row(
        "K-BK7",
        1.5168,
        64.2,
        DispersionFormula::Sumita,
        [2.2718929, -1.0108077e-3, 1.0592509e-2, 2.0816965e-4, -7.6472538e-7, 4.9240991e-8],
    ),
];

/// The embedded curated database, named `"schott-subset"` in catalogs.
pub fn schott_subset() -> Vec<GlassRecord> {
    SCHOTT_SUBSET
        .iter()
        .map(|Row(name, nd, vd, formula, coeffs)| GlassRecord {
            name: (*name).into(),
            nd: *nd,
            vd: *vd,
            formula: *formula,
            coeffs: coeffs.to_vec(),
        })
        .collect()
}
